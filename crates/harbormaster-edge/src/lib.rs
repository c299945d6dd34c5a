//! Edge connectivity core
//!
//! Tracks live tunnels from edge environments and reconciles their presence
//! with persisted environment records to produce the displayed runtime state.
//! The registry is the only shared mutable state in this subsystem; everything
//! else is either per-session (heartbeat loops) or a pure read-side overlay
//! (the reconciler).

pub mod environment;
pub mod heartbeat;
pub mod reconcile;
pub mod registry;
pub mod sweep;
pub mod tunnel;

pub use environment::{
    Environment, EnvironmentStatus, EnvironmentStore, MemoryEnvironmentStore, LOCAL_ENVIRONMENT_ID,
};
pub use heartbeat::{run_heartbeat, HeartbeatConfig};
pub use reconcile::reconcile_environment;
pub use registry::{RegistryError, TunnelRegistry};
pub use sweep::{spawn_stale_tunnel_sweep, sweep_stale_tunnels};
pub use tunnel::{EdgeTunnel, TransportKind};

#[cfg(test)]
pub(crate) mod test_support;
