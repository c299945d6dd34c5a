//! Shared test doubles for the edge core

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use crate::tunnel::{EdgeTunnel, TransportKind};

/// In-memory tunnel double with controllable heartbeat state
#[derive(Debug)]
pub(crate) struct StubTunnel {
    environment_id: String,
    connected_at: DateTime<Utc>,
    last_heartbeat: AtomicI64,
    closed: AtomicBool,
}

impl StubTunnel {
    pub(crate) fn new(environment_id: &str) -> Arc<Self> {
        let now = Utc::now();
        Arc::new(Self {
            environment_id: environment_id.to_string(),
            connected_at: now,
            last_heartbeat: AtomicI64::new(now.timestamp_millis()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn set_last_heartbeat(&self, at: DateTime<Utc>) {
        self.last_heartbeat
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EdgeTunnel for StubTunnel {
    fn environment_id(&self) -> &str {
        &self.environment_id
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Grpc
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
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
        self.closed.store(true, Ordering::SeqCst);
    }
}
