//! Tunnel registry for tracking live edge sessions
//!
//! Maps environment IDs to their current tunnel. Safe to call from HTTP
//! handlers, the connection-accept path, and heartbeat loops concurrently;
//! the critical section covers map access only and never performs I/O.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::environment::LOCAL_ENVIRONMENT_ID;
use crate::tunnel::EdgeTunnel;

/// Errors from registry mutation
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Environment ID \"{LOCAL_ENVIRONMENT_ID}\" is reserved for the local Docker socket")]
    ReservedEnvironmentId,
}

/// Registry of live tunnels, one per environment
///
/// Cheap to clone; clones share the same underlying map. Constructed
/// explicitly and injected into the HTTP layer and the accept path so tests
/// can use isolated instances. Not persisted: on restart all agents
/// reconnect and repopulate it.
#[derive(Debug, Clone, Default)]
pub struct TunnelRegistry {
    tunnels: Arc<RwLock<HashMap<String, Arc<dyn EdgeTunnel>>>>,
}

impl TunnelRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        tracing::debug!("Creating new tunnel registry");
        Self::default()
    }

    /// Register a tunnel, replacing any existing entry for its environment
    ///
    /// Last writer wins. Returns the superseded tunnel when there was one;
    /// the caller is responsible for closing it so the underlying connection
    /// does not leak.
    ///
    /// # Errors
    ///
    /// Rejects the reserved local environment ID, which never tunnels.
    pub fn register(
        &self,
        tunnel: Arc<dyn EdgeTunnel>,
    ) -> Result<Option<Arc<dyn EdgeTunnel>>, RegistryError> {
        let environment_id = tunnel.environment_id().to_string();

        if environment_id == LOCAL_ENVIRONMENT_ID {
            tracing::warn!("Rejected tunnel registration for reserved local environment ID");
            return Err(RegistryError::ReservedEnvironmentId);
        }

        let replaced = {
            let mut tunnels = self.tunnels.write().unwrap();
            tunnels.insert(environment_id.clone(), tunnel)
        };

        if replaced.is_some() {
            tracing::info!(
                environment_id = %environment_id,
                "Re-registered edge tunnel (superseding previous session)"
            );
        } else {
            tracing::info!(environment_id = %environment_id, "Registered edge tunnel");
        }

        Ok(replaced)
    }

    /// Remove the tunnel for an environment, if present
    ///
    /// Idempotent: unregistering an absent or already-removed ID is a no-op,
    /// never an error. Both the normal disconnect path and defensive cleanup
    /// may race to unregister the same ID.
    pub fn unregister(&self, environment_id: &str) -> Option<Arc<dyn EdgeTunnel>> {
        let removed = {
            let mut tunnels = self.tunnels.write().unwrap();
            tunnels.remove(environment_id)
        };

        if removed.is_some() {
            tracing::info!(environment_id = %environment_id, "Unregistered edge tunnel");
        } else {
            tracing::debug!(
                environment_id = %environment_id,
                "Unregister for absent environment (no-op)"
            );
        }

        removed
    }

    /// Remove the entry for an environment only if it still holds `tunnel`
    ///
    /// Used by a session's own cleanup so a superseded session cannot evict
    /// its replacement. Returns whether an entry was removed.
    pub fn unregister_if_current(
        &self,
        environment_id: &str,
        tunnel: &Arc<dyn EdgeTunnel>,
    ) -> bool {
        let mut tunnels = self.tunnels.write().unwrap();
        match tunnels.get(environment_id) {
            Some(current) if Arc::ptr_eq(current, tunnel) => {
                tunnels.remove(environment_id);
                drop(tunnels);
                tracing::info!(environment_id = %environment_id, "Unregistered edge tunnel");
                true
            }
            _ => false,
        }
    }

    /// Look up the current tunnel for an environment
    ///
    /// Absence is a normal, expected outcome, not a failure.
    pub fn get(&self, environment_id: &str) -> Option<Arc<dyn EdgeTunnel>> {
        let tunnels = self.tunnels.read().unwrap();
        tunnels.get(environment_id).cloned()
    }

    /// Snapshot of all registered tunnels
    pub fn list(&self) -> Vec<Arc<dyn EdgeTunnel>> {
        let tunnels = self.tunnels.read().unwrap();
        tunnels.values().cloned().collect()
    }

    /// Number of registered tunnels
    pub fn count(&self) -> usize {
        let tunnels = self.tunnels.read().unwrap();
        tunnels.len()
    }
}
