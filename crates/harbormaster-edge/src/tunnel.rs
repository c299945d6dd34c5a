//! Tunnel abstraction
//!
//! One live connection session to a specific edge agent. Each transport
//! supplies a concrete implementation via an explicit constructor so no
//! caller can assemble a tunnel from partial state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport a tunnel runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// gRPC-style HTTP/2 bidirectional stream
    Grpc,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Grpc => write!(f, "grpc"),
        }
    }
}

/// A live tunnel session for one edge environment
///
/// Ephemeral and in-memory only: created when an agent's handshake completes,
/// destroyed on stream error, EOF, explicit disconnect, or replacement by a
/// newer tunnel for the same environment.
pub trait EdgeTunnel: Send + Sync + fmt::Debug {
    /// Environment this tunnel belongs to
    fn environment_id(&self) -> &str;

    /// Transport the session runs over
    fn transport(&self) -> TransportKind;

    /// Whether the underlying connection is still up
    fn is_connected(&self) -> bool;

    /// When the session was established
    fn connected_at(&self) -> DateTime<Utc>;

    /// Most recent liveness signal
    fn last_heartbeat(&self) -> DateTime<Utc>;

    /// Record a liveness signal; must be an atomic replacement so concurrent
    /// readers never observe a partial update
    fn mark_heartbeat(&self);

    /// Tear down the underlying transport connection
    fn close(&self);
}
