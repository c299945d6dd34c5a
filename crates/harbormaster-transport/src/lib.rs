//! Transport abstraction layer
//!
//! Defines the seams between the edge core and concrete transports. A
//! transport supplies connections; a connection multiplexes message streams.
//! New transports implement these traits without touching the registry or
//! the reconciler.

use async_trait::async_trait;
use bytes::Bytes;
use harbormaster_proto::EdgeMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;


/// Errors produced by transport implementations
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Stream closed")]
    StreamClosed,

    #[error("Timeout")]
    Timeout,

    #[error("TLS error: {0}")]
    TlsError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Failed to bind {address}:{port}: {reason}")]
    BindError {
        address: String,
        port: u16,
        reason: String,
    },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Client certificate for mutual TLS
#[derive(Debug, Clone)]
pub struct ClientCertificate {
    pub cert_chain: Vec<u8>,
    pub private_key: Vec<u8>,
}

/// Security configuration shared by all transports
#[derive(Debug, Clone)]
pub struct TransportSecurityConfig {
    /// Verify the server certificate (disable only for self-signed dev setups)
    pub verify_server_cert: bool,
    /// Optional client certificate for mutual TLS
    pub client_cert: Option<ClientCertificate>,
    /// ALPN protocols to negotiate
    pub alpn_protocols: Vec<String>,
    /// Additional root certificates (DER); system roots are used when empty
    pub root_certs: Vec<Vec<u8>>,
}

impl Default for TransportSecurityConfig {
    fn default() -> Self {
        Self {
            verify_server_cert: true,
            client_cert: None,
            alpn_protocols: vec!["h2".to_string()],
            root_certs: Vec::new(),
        }
    }
}

/// Transport-specific configuration
pub trait TransportConfig: Send + Sync {
    fn security_config(&self) -> &TransportSecurityConfig;

    fn validate(&self) -> TransportResult<()>;
}

/// Connection statistics for observability
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub active_streams: usize,
    pub rtt_ms: Option<u64>,
    pub uptime_secs: u64,
}

/// A bidirectional message stream over a connection
#[async_trait]
pub trait TransportStream: Send + std::fmt::Debug {
    /// Send a framed protocol message
    async fn send_message(&mut self, message: &EdgeMessage) -> TransportResult<()>;

    /// Receive the next protocol message; `None` means the stream ended cleanly
    async fn recv_message(&mut self) -> TransportResult<Option<EdgeMessage>>;

    /// Send raw bytes without protocol framing
    async fn send_bytes(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Receive up to `max_size` raw bytes; empty means the stream ended
    async fn recv_bytes(&mut self, max_size: usize) -> TransportResult<Bytes>;

    /// Close the sending side of the stream
    async fn finish(&mut self) -> TransportResult<()>;

    fn stream_id(&self) -> u64;

    fn is_closed(&self) -> bool;
}

/// A live connection multiplexing one or more streams
#[async_trait]
pub trait TransportConnection: Send + Sync + std::fmt::Debug {
    type Stream: TransportStream;

    /// Open a new outgoing stream
    async fn open_stream(&self) -> TransportResult<Self::Stream>;

    /// Accept the next incoming stream; `None` means the connection is gone
    async fn accept_stream(&self) -> TransportResult<Option<Self::Stream>>;

    /// Close the connection
    async fn close(&self, error_code: u32, reason: &str);

    fn is_closed(&self) -> bool;

    fn remote_address(&self) -> SocketAddr;

    fn stats(&self) -> ConnectionStats;

    fn connection_id(&self) -> String;
}

/// Server side of a transport: accepts incoming connections
#[async_trait]
pub trait TransportListener: Send + Sync {
    type Connection: TransportConnection;

    async fn accept(&self) -> TransportResult<(Self::Connection, SocketAddr)>;

    fn local_addr(&self) -> TransportResult<SocketAddr>;

    async fn close(&self);
}

/// Client side of a transport: establishes outgoing connections
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Connection: TransportConnection;

    async fn connect(
        &self,
        addr: SocketAddr,
        server_name: &str,
    ) -> TransportResult<Self::Connection>;
}

/// Factory tying a transport's listener, connector and config together
#[async_trait]
pub trait TransportFactory: Send + Sync {
    type Listener: TransportListener;
    type Connector: TransportConnector;
    type Config: TransportConfig;

    fn create_listener(
        &self,
        bind_addr: SocketAddr,
        config: Arc<Self::Config>,
    ) -> TransportResult<Self::Listener>;

    fn create_connector(&self, config: Arc<Self::Config>) -> TransportResult<Self::Connector>;

    fn name(&self) -> &str;

    fn is_encrypted(&self) -> bool;
}
