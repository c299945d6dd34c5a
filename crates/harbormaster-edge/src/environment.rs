//! Environment records and the environment store
//!
//! An environment is one managed Docker host. Persisted fields are owned by
//! the store and mutated only by admin operations; the live overlay fields
//! are computed per read by the reconciler and never written back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::tunnel::TransportKind;

/// Environment ID reserved for the local Docker socket; never an edge host
pub const LOCAL_ENVIRONMENT_ID: &str = "0";

/// Persisted connectivity status of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatus {
    Online,
    Offline,
    /// Edge environment created but its agent has never completed a handshake
    Pending,
    Disabled,
}

/// One managed Docker host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Unique identifier; "0" is the local Docker socket
    pub id: String,
    /// Display name
    pub name: String,
    /// Persisted status
    pub status: EnvironmentStatus,
    /// Whether this host dials out through an edge tunnel
    pub is_edge: bool,
    /// Whether the environment is administratively enabled
    pub enabled: bool,

    /// Live overlay: whether a tunnel is currently registered (edge only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    /// Live overlay: transport of the current tunnel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_transport: Option<TransportKind>,
    /// Live overlay: when the current tunnel was established
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    /// Live overlay: most recent heartbeat over the current tunnel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Environment {
    /// Create the record for the local Docker socket
    pub fn local(name: &str) -> Self {
        Self {
            id: LOCAL_ENVIRONMENT_ID.to_string(),
            name: name.to_string(),
            status: EnvironmentStatus::Online,
            is_edge: false,
            enabled: true,
            connected: None,
            edge_transport: None,
            connected_at: None,
            last_heartbeat: None,
        }
    }

    /// Create a new edge environment awaiting its first handshake
    pub fn edge(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: EnvironmentStatus::Pending,
            is_edge: true,
            enabled: true,
            connected: None,
            edge_transport: None,
            connected_at: None,
            last_heartbeat: None,
        }
    }
}

/// Read interface consumed by the reconciler and the HTTP layer
///
/// This subsystem only reads environments; admin CRUD goes through `upsert`
/// and `delete`, which are out of band from reconciliation.
pub trait EnvironmentStore: Send + Sync {
    fn get(&self, id: &str) -> Option<Environment>;

    fn list(&self) -> Vec<Environment>;

    fn upsert(&self, environment: Environment);

    fn delete(&self, id: &str) -> Option<Environment>;
}

/// In-memory environment store
///
/// Durable persistence is out of scope; this store backs the API and tests.
#[derive(Debug, Default)]
pub struct MemoryEnvironmentStore {
    environments: RwLock<HashMap<String, Environment>>,
}

impl MemoryEnvironmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EnvironmentStore for MemoryEnvironmentStore {
    fn get(&self, id: &str) -> Option<Environment> {
        let environments = self.environments.read().unwrap();
        environments.get(id).cloned()
    }

    fn list(&self) -> Vec<Environment> {
        let environments = self.environments.read().unwrap();
        let mut all: Vec<Environment> = environments.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    fn upsert(&self, environment: Environment) {
        let mut environments = self.environments.write().unwrap();
        environments.insert(environment.id.clone(), environment);
    }

    fn delete(&self, id: &str) -> Option<Environment> {
        let mut environments = self.environments.write().unwrap();
        environments.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_environment_defaults() {
        let env = Environment::local("local");
        assert_eq!(env.id, LOCAL_ENVIRONMENT_ID);
        assert!(!env.is_edge);
        assert_eq!(env.status, EnvironmentStatus::Online);
    }

    #[test]
    fn test_edge_environment_starts_pending() {
        let env = Environment::edge("env-1", "factory-floor");
        assert!(env.is_edge);
        assert_eq!(env.status, EnvironmentStatus::Pending);
        assert!(env.connected.is_none());
    }

    #[test]
    fn test_store_upsert_get_delete() {
        let store = MemoryEnvironmentStore::new();
        store.upsert(Environment::edge("env-1", "one"));

        let fetched = store.get("env-1").unwrap();
        assert_eq!(fetched.name, "one");

        // Upsert replaces
        let mut updated = fetched.clone();
        updated.name = "renamed".to_string();
        store.upsert(updated);
        assert_eq!(store.get("env-1").unwrap().name, "renamed");

        assert!(store.delete("env-1").is_some());
        assert!(store.get("env-1").is_none());
        assert!(store.delete("env-1").is_none());
    }

    #[test]
    fn test_store_list_sorted_by_id() {
        let store = MemoryEnvironmentStore::new();
        store.upsert(Environment::edge("env-b", "b"));
        store.upsert(Environment::edge("env-a", "a"));
        store.upsert(Environment::local("local"));

        let ids: Vec<String> = store.list().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["0", "env-a", "env-b"]);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&EnvironmentStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
