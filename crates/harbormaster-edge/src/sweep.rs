//! Staleness sweep for silently partitioned tunnels
//!
//! Explicit unregistration on stream failure covers clean breaks, but a
//! silent network partition can leave a stream open with no traffic and no
//! error. The sweep compares each tunnel's last heartbeat against a
//! threshold and evicts the ones that have gone quiet.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::registry::TunnelRegistry;

/// Evict tunnels whose last heartbeat is older than `threshold`
///
/// Returns the number of tunnels evicted. Eviction is guarded the same way
/// session cleanup is, so a tunnel replaced between the snapshot and the
/// removal is left alone.
pub fn sweep_stale_tunnels(registry: &TunnelRegistry, threshold: Duration) -> usize {
    let now = chrono::Utc::now();
    let mut evicted = 0;

    for tunnel in registry.list() {
        let age = now
            .signed_duration_since(tunnel.last_heartbeat())
            .to_std()
            .unwrap_or_default();

        if age > threshold {
            let environment_id = tunnel.environment_id().to_string();
            if registry.unregister_if_current(&environment_id, &tunnel) {
                warn!(
                    environment_id = %environment_id,
                    age_secs = age.as_secs(),
                    "Evicting stale tunnel (no heartbeat within threshold)"
                );
                tunnel.close();
                evicted += 1;
            }
        }
    }

    evicted
}

/// Run the staleness sweep on an interval until aborted
pub fn spawn_stale_tunnel_sweep(
    registry: TunnelRegistry,
    threshold: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let evicted = sweep_stale_tunnels(&registry, threshold);
            if evicted > 0 {
                debug!(evicted, "Stale tunnel sweep complete");
            }
        }
    })
}
