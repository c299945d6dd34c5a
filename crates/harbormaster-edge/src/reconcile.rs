//! Runtime-state reconciliation
//!
//! Overlays live tunnel presence onto a persisted environment record for
//! display. Read-only with respect to storage: the displayed status is
//! derived from current liveness plus the previously persisted status, never
//! by trusting a stale "online" flag, and never by writing back.

use crate::environment::{Environment, EnvironmentStatus};
use crate::registry::TunnelRegistry;

/// Overlay connectivity fields onto an environment view in place
///
/// Called once per environment per API read. Non-edge environments are left
/// untouched. For edge environments the displayed status is:
/// - live tunnel registered: `Online`, with transport and timestamps from
///   the tunnel;
/// - no tunnel and persisted status `Pending`: stays `Pending` (awaiting its
///   first handshake, never shown as offline);
/// - no tunnel otherwise: forced `Offline`, stale transport/timestamp values
///   discarded rather than shown.
pub fn reconcile_environment(environment: &mut Environment, registry: &TunnelRegistry) {
    if !environment.is_edge {
        return;
    }

    match registry.get(&environment.id) {
        Some(tunnel) => {
            environment.status = EnvironmentStatus::Online;
            environment.connected = Some(true);
            environment.edge_transport = Some(tunnel.transport());
            environment.connected_at = Some(tunnel.connected_at());
            environment.last_heartbeat = Some(tunnel.last_heartbeat());
        }
        None => {
            if environment.status != EnvironmentStatus::Pending {
                environment.status = EnvironmentStatus::Offline;
            }
            environment.connected = Some(false);
            environment.edge_transport = None;
            environment.connected_at = None;
            environment.last_heartbeat = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::EnvironmentStatus;
    use crate::test_support::StubTunnel;
    use crate::tunnel::TransportKind;

    #[test]
    fn test_non_edge_left_untouched() {
        let registry = TunnelRegistry::new();
        let mut env = Environment::local("local");
        env.status = EnvironmentStatus::Online;

        let before = env.clone();
        reconcile_environment(&mut env, &registry);
        assert_eq!(env, before);
    }

    #[test]
    fn test_pending_never_connected_stays_pending() {
        let registry = TunnelRegistry::new();
        let mut env = Environment::edge("env-edge-pending", "pending");

        reconcile_environment(&mut env, &registry);

        assert_eq!(env.status, EnvironmentStatus::Pending);
        assert_eq!(env.connected, Some(false));
        assert!(env.edge_transport.is_none());
        assert!(env.connected_at.is_none());
        assert!(env.last_heartbeat.is_none());
    }

    #[test]
    fn test_stale_online_forced_offline() {
        let registry = TunnelRegistry::new();
        let mut env = Environment::edge("env-edge-offline", "stale");
        env.status = EnvironmentStatus::Online;

        reconcile_environment(&mut env, &registry);

        assert_eq!(env.status, EnvironmentStatus::Offline);
        assert_eq!(env.connected, Some(false));
        assert!(env.edge_transport.is_none());
    }

    #[test]
    fn test_disabled_without_tunnel_shows_offline() {
        let registry = TunnelRegistry::new();
        let mut env = Environment::edge("env-edge-disabled", "disabled");
        env.status = EnvironmentStatus::Disabled;
        env.enabled = false;

        reconcile_environment(&mut env, &registry);

        assert_eq!(env.status, EnvironmentStatus::Offline);
        assert_eq!(env.connected, Some(false));
    }

    #[test]
    fn test_live_tunnel_shows_online() {
        let registry = TunnelRegistry::new();
        registry.register(StubTunnel::new("env-edge-live")).unwrap();

        let mut env = Environment::edge("env-edge-live", "live");
        env.status = EnvironmentStatus::Offline;

        reconcile_environment(&mut env, &registry);

        assert_eq!(env.status, EnvironmentStatus::Online);
        assert_eq!(env.connected, Some(true));
        assert_eq!(env.edge_transport, Some(TransportKind::Grpc));
        assert!(env.connected_at.is_some());
        assert!(env.last_heartbeat.is_some());
    }

    #[test]
    fn test_reconcile_does_not_touch_registry() {
        let registry = TunnelRegistry::new();
        registry.register(StubTunnel::new("env-1")).unwrap();

        let mut env = Environment::edge("env-1", "one");
        reconcile_environment(&mut env, &registry);
        reconcile_environment(&mut env, &registry);

        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_dropped_tunnel_reflected_immediately() {
        let registry = TunnelRegistry::new();
        registry.register(StubTunnel::new("env-1")).unwrap();

        let mut env = Environment::edge("env-1", "one");
        reconcile_environment(&mut env, &registry);
        assert_eq!(env.status, EnvironmentStatus::Online);

        registry.unregister("env-1");

        reconcile_environment(&mut env, &registry);
        assert_eq!(env.status, EnvironmentStatus::Offline);
        assert_eq!(env.connected, Some(false));
        assert!(env.last_heartbeat.is_none());
    }
}
