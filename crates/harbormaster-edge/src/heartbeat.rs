//! Heartbeat session driver
//!
//! Owns the liveness of one tunnel. The server actively pings on an interval
//! and expects a pong within a deadline; every pong atomically refreshes the
//! tunnel's last-heartbeat timestamp. Any transport failure ends the session,
//! which unregisters the tunnel before the underlying connection is released
//! so no reader can observe an entry whose transport is already gone.

use harbormaster_proto::EdgeMessage;
use harbormaster_transport::TransportStream;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::registry::TunnelRegistry;
use crate::tunnel::EdgeTunnel;

/// Ping/pong tuning for a heartbeat session
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// How often the server sends a ping
    pub ping_interval: Duration,
    /// How long to wait for the matching pong before assuming disconnection
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            pong_timeout: Duration::from_secs(5),
        }
    }
}

/// Drive one tunnel's control stream until it fails or disconnects
///
/// Runs until stream error, EOF, pong timeout, or an orderly `Disconnect`.
/// Cleanup is guarded: the registry entry is removed only if it still refers
/// to this session's tunnel, so a superseded session cannot evict its
/// replacement. Transport failures are absorbed here; they never propagate
/// to the registry or the reconciler.
pub async fn run_heartbeat<S: TransportStream>(
    tunnel: Arc<dyn EdgeTunnel>,
    registry: TunnelRegistry,
    mut control_stream: S,
    config: HeartbeatConfig,
) {
    let environment_id = tunnel.environment_id().to_string();

    let mut interval = tokio::time::interval(config.ping_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut waiting_for_pong = false;
    let mut pong_deadline = tokio::time::Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick(), if !waiting_for_pong => {
                // A superseded or externally closed tunnel must not keep its
                // session alive just because the agent still answers pings
                if !tunnel.is_connected() {
                    info!(environment_id = %environment_id, "Tunnel closed, ending session");
                    break;
                }

                let timestamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();

                debug!(environment_id = %environment_id, "Sending ping");
                if let Err(e) = control_stream.send_message(&EdgeMessage::Ping { timestamp }).await {
                    error!(environment_id = %environment_id, "Failed to send ping: {}", e);
                    break;
                }

                waiting_for_pong = true;
                pong_deadline = tokio::time::Instant::now() + config.pong_timeout;
            }

            _ = tokio::time::sleep_until(pong_deadline), if waiting_for_pong => {
                warn!(
                    environment_id = %environment_id,
                    "Pong timeout, assuming agent disconnected"
                );
                break;
            }

            result = control_stream.recv_message() => {
                match result {
                    Ok(Some(EdgeMessage::Pong { .. })) => {
                        debug!(environment_id = %environment_id, "Received pong");
                        tunnel.mark_heartbeat();
                        waiting_for_pong = false;
                    }
                    Ok(Some(EdgeMessage::Disconnect { reason })) => {
                        info!(environment_id = %environment_id, "Agent disconnected: {}", reason);

                        if let Err(e) = control_stream.send_message(&EdgeMessage::DisconnectAck {
                            environment_id: environment_id.clone(),
                        }).await {
                            warn!(environment_id = %environment_id, "Failed to send disconnect ack: {}", e);
                        }

                        break;
                    }
                    Ok(None) => {
                        info!(environment_id = %environment_id, "Control stream closed");
                        break;
                    }
                    Err(e) => {
                        error!(environment_id = %environment_id, "Control stream error: {}", e);
                        break;
                    }
                    Ok(Some(msg)) => {
                        warn!(
                            environment_id = %environment_id,
                            "Unexpected message on control stream: {:?}", msg
                        );
                    }
                }
            }
        }
    }

    // Unregister before the transport resource is released; guarded so a
    // superseded session never evicts its replacement.
    registry.unregister_if_current(&environment_id, &tunnel);
    tunnel.close();

    debug!(environment_id = %environment_id, "Heartbeat session ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubTunnel;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::DateTime;
    use harbormaster_transport::{TransportError, TransportResult};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    type Incoming = Result<Option<EdgeMessage>, TransportError>;

    /// Control-stream double fed from a channel
    #[derive(Debug)]
    struct ChannelStream {
        incoming: mpsc::UnboundedReceiver<Incoming>,
        sent: Arc<Mutex<Vec<EdgeMessage>>>,
    }

    impl ChannelStream {
        fn new() -> (mpsc::UnboundedSender<Incoming>, Arc<Mutex<Vec<EdgeMessage>>>, Self) {
            let (tx, rx) = mpsc::unbounded_channel();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let stream = Self {
                incoming: rx,
                sent: sent.clone(),
            };
            (tx, sent, stream)
        }
    }

    #[async_trait]
    impl TransportStream for ChannelStream {
        async fn send_message(&mut self, message: &EdgeMessage) -> TransportResult<()> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }

        async fn recv_message(&mut self) -> TransportResult<Option<EdgeMessage>> {
            match self.incoming.recv().await {
                Some(item) => item,
                None => Ok(None),
            }
        }

        async fn send_bytes(&mut self, _data: &[u8]) -> TransportResult<()> {
            Ok(())
        }

        async fn recv_bytes(&mut self, _max_size: usize) -> TransportResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn finish(&mut self) -> TransportResult<()> {
            Ok(())
        }

        fn stream_id(&self) -> u64 {
            0
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    /// Control-stream double that answers every ping with a matching pong
    #[derive(Debug)]
    struct EchoPongStream {
        loopback: mpsc::UnboundedSender<Incoming>,
        incoming: mpsc::UnboundedReceiver<Incoming>,
        sent: Arc<Mutex<Vec<EdgeMessage>>>,
    }

    impl EchoPongStream {
        fn new() -> (Arc<Mutex<Vec<EdgeMessage>>>, Self) {
            let (tx, rx) = mpsc::unbounded_channel();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let stream = Self {
                loopback: tx,
                incoming: rx,
                sent: sent.clone(),
            };
            (sent, stream)
        }
    }

    #[async_trait]
    impl TransportStream for EchoPongStream {
        async fn send_message(&mut self, message: &EdgeMessage) -> TransportResult<()> {
            self.sent.lock().unwrap().push(message.clone());
            if let EdgeMessage::Ping { timestamp } = message {
                let _ = self.loopback.send(Ok(Some(EdgeMessage::Pong {
                    timestamp: *timestamp,
                })));
            }
            Ok(())
        }

        async fn recv_message(&mut self) -> TransportResult<Option<EdgeMessage>> {
            match self.incoming.recv().await {
                Some(item) => item,
                None => Ok(None),
            }
        }

        async fn send_bytes(&mut self, _data: &[u8]) -> TransportResult<()> {
            Ok(())
        }

        async fn recv_bytes(&mut self, _max_size: usize) -> TransportResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn finish(&mut self) -> TransportResult<()> {
            Ok(())
        }

        fn stream_id(&self) -> u64 {
            0
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_refreshes_heartbeat() {
        let registry = TunnelRegistry::new();
        let stub = StubTunnel::new("env-1");
        stub.set_last_heartbeat(DateTime::from_timestamp(0, 0).unwrap());
        registry.register(stub.clone()).unwrap();

        let (tx, _sent, stream) = ChannelStream::new();
        tx.send(Ok(Some(EdgeMessage::Pong { timestamp: 1 }))).unwrap();
        drop(tx); // EOF after the pong ends the session

        run_heartbeat(
            stub.clone(),
            registry.clone(),
            stream,
            HeartbeatConfig::default(),
        )
        .await;

        assert!(stub.last_heartbeat().timestamp() > 0);
        assert!(registry.get("env-1").is_none());
        assert!(stub.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_timeout_unregisters() {
        let registry = TunnelRegistry::new();
        let stub = StubTunnel::new("env-1");
        registry.register(stub.clone()).unwrap();

        // Sender stays alive so recv pends; only the deadline can fire
        let (_tx, sent, stream) = ChannelStream::new();

        run_heartbeat(
            stub.clone(),
            registry.clone(),
            stream,
            HeartbeatConfig::default(),
        )
        .await;

        assert!(registry.get("env-1").is_none());
        assert!(stub.is_closed());
        assert_eq!(
            sent.lock()
                .unwrap()
                .iter()
                .filter(|m| matches!(m, EdgeMessage::Ping { .. }))
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_error_unregisters() {
        let registry = TunnelRegistry::new();
        let stub = StubTunnel::new("env-1");
        registry.register(stub.clone()).unwrap();

        let (tx, _sent, stream) = ChannelStream::new();
        tx.send(Err(TransportError::ConnectionError("broken".to_string())))
            .unwrap();

        run_heartbeat(
            stub.clone(),
            registry.clone(),
            stream,
            HeartbeatConfig::default(),
        )
        .await;

        assert!(registry.get("env-1").is_none());
        assert!(stub.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_acknowledged() {
        let registry = TunnelRegistry::new();
        let stub = StubTunnel::new("env-1");
        registry.register(stub.clone()).unwrap();

        let (tx, sent, stream) = ChannelStream::new();
        tx.send(Ok(Some(EdgeMessage::Disconnect {
            reason: "shutting down".to_string(),
        })))
        .unwrap();

        run_heartbeat(
            stub.clone(),
            registry.clone(),
            stream,
            HeartbeatConfig::default(),
        )
        .await;

        assert!(registry.get("env-1").is_none());
        assert!(sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, EdgeMessage::DisconnectAck { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_session_keeps_replacement_registered() {
        let registry = TunnelRegistry::new();
        let old = StubTunnel::new("env-1");
        let new = StubTunnel::new("env-1");

        registry.register(old.clone()).unwrap();
        registry.register(new.clone()).unwrap();

        // The superseded session ends (EOF) and runs its cleanup
        let (tx, _sent, stream) = ChannelStream::new();
        drop(tx);

        run_heartbeat(
            old.clone(),
            registry.clone(),
            stream,
            HeartbeatConfig::default(),
        )
        .await;

        // The replacement is still registered
        let current = registry.get("env-1").expect("replacement evicted");
        assert!(Arc::ptr_eq(
            &current,
            &(new as Arc<dyn EdgeTunnel>)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_tunnel_ends_session_despite_pongs() {
        let registry = TunnelRegistry::new();
        let old = StubTunnel::new("env-1");
        let new = StubTunnel::new("env-1");
        registry.register(old.clone()).unwrap();

        let (sent, stream) = EchoPongStream::new();
        let session = tokio::spawn(run_heartbeat(
            old.clone(),
            registry.clone(),
            stream,
            HeartbeatConfig::default(),
        ));

        // Let at least one ping/pong round trip complete; the agent side
        // is perfectly healthy
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, EdgeMessage::Ping { .. })));

        // A new session supersedes the tunnel and the old one is closed
        registry.register(new.clone()).unwrap();
        old.close();

        // The old session must end even though pongs keep arriving
        tokio::time::timeout(Duration::from_secs(60), session)
            .await
            .expect("session kept running after tunnel close")
            .unwrap();

        // Its guarded cleanup left the replacement in place
        let current = registry.get("env-1").expect("replacement evicted");
        assert!(Arc::ptr_eq(&current, &(new as Arc<dyn EdgeTunnel>)));
    }
}
