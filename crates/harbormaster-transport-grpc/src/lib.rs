//! gRPC-style edge transport over HTTP/2
//!
//! Edge agents dial out over TLS and speak framed control messages on an
//! HTTP/2 bidirectional stream, the same shape a gRPC channel has on the
//! wire. HTTP/2 gives us multiplexing and passes through firewalls that
//! block UDP.
//!
//! # Stream Mapping
//!
//! - Each logical stream = one HTTP/2 bidirectional stream
//! - Messages are length-prefixed bincode frames carried in DATA frames
//! - Stream close = END_STREAM flag

pub mod config;
pub mod connection;
pub mod listener;
pub mod stream;
pub mod tunnel;

pub use config::GrpcConfig;
pub use connection::GrpcConnection;
pub use listener::{GrpcConnector, GrpcListener};
pub use stream::GrpcStream;
pub use tunnel::GrpcTunnel;

use async_trait::async_trait;
use harbormaster_transport::{TransportFactory, TransportResult};
use std::net::SocketAddr;
use std::sync::Arc;

/// gRPC transport factory
#[derive(Debug, Default)]
pub struct GrpcTransportFactory;

impl GrpcTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for GrpcTransportFactory {
    type Listener = GrpcListener;
    type Connector = GrpcConnector;
    type Config = GrpcConfig;

    fn create_listener(
        &self,
        bind_addr: SocketAddr,
        config: Arc<Self::Config>,
    ) -> TransportResult<Self::Listener> {
        GrpcListener::new(bind_addr, config)
    }

    fn create_connector(&self, config: Arc<Self::Config>) -> TransportResult<Self::Connector> {
        GrpcConnector::new(config)
    }

    fn name(&self) -> &str {
        "gRPC"
    }

    fn is_encrypted(&self) -> bool {
        true
    }
}
