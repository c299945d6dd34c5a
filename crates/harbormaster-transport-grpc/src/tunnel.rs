//! Tunnel adapter binding a server-side connection to an environment

use chrono::{DateTime, Utc};
use harbormaster_edge::{EdgeTunnel, TransportKind};
use harbormaster_transport::TransportConnection;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::connection::GrpcConnection;

/// Live session for one edge environment over an HTTP/2 connection
pub struct GrpcTunnel {
    environment_id: String,
    connected_at: DateTime<Utc>,
    /// Epoch millis of the most recent pong, stored atomically so readers
    /// never see a torn timestamp
    last_heartbeat: AtomicI64,
    conn: Arc<GrpcConnection>,
}

impl std::fmt::Debug for GrpcTunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTunnel")
            .field("environment_id", &self.environment_id)
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

impl GrpcTunnel {
    pub fn with_conn(environment_id: &str, conn: Arc<GrpcConnection>) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            environment_id: environment_id.to_string(),
            connected_at: now,
            last_heartbeat: AtomicI64::new(now.timestamp_millis()),
            conn,
        })
    }
}

impl EdgeTunnel for GrpcTunnel {
    fn environment_id(&self) -> &str {
        &self.environment_id
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn is_connected(&self) -> bool {
        !self.conn.is_closed()
    }

    fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    fn last_heartbeat(&self) -> DateTime<Utc> {
        let millis = self.last_heartbeat.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or(self.connected_at)
    }

    fn mark_heartbeat(&self) {
        self.last_heartbeat
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    fn close(&self) {
        self.conn.shutdown();
    }
}
