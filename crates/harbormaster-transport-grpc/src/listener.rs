//! TLS listener and connector for the edge transport

use async_trait::async_trait;
use harbormaster_transport::{
    TransportConfig, TransportConnector, TransportError, TransportListener, TransportResult,
};
use rustls::pki_types::ServerName;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::config::GrpcConfig;
use crate::connection::GrpcConnection;

/// Accepts inbound agent connections and upgrades them to TLS+HTTP/2
pub struct GrpcListener {
    tcp: TcpListener,
    tls: tokio_rustls::TlsAcceptor,
}

impl GrpcListener {
    /// Bind the listener; uses a std socket so callers outside a runtime
    /// can construct it
    pub fn new(bind_addr: SocketAddr, config: Arc<GrpcConfig>) -> TransportResult<Self> {
        TransportConfig::validate(&*config)?;
        let tls = config.build_tls_acceptor()?;

        let socket = std::net::TcpListener::bind(bind_addr).map_err(|e| {
            TransportError::BindError {
                address: bind_addr.ip().to_string(),
                port: bind_addr.port(),
                reason: e.to_string(),
            }
        })?;
        socket.set_nonblocking(true).map_err(|e| {
            TransportError::ConfigurationError(format!("Failed to set nonblocking: {}", e))
        })?;
        let tcp = TcpListener::from_std(socket).map_err(TransportError::IoError)?;

        info!(
            "Edge transport listening on {}",
            tcp.local_addr().map_err(TransportError::IoError)?
        );
        Ok(Self { tcp, tls })
    }

    async fn establish(
        &self,
        socket: TcpStream,
        peer: SocketAddr,
    ) -> TransportResult<GrpcConnection> {
        let tls_stream = self
            .tls
            .accept(socket)
            .await
            .map_err(|e| TransportError::TlsError(format!("TLS accept failed: {}", e)))?;
        GrpcConnection::inbound(tls_stream, peer).await
    }
}

#[async_trait]
impl TransportListener for GrpcListener {
    type Connection = GrpcConnection;

    async fn accept(&self) -> TransportResult<(Self::Connection, SocketAddr)> {
        // A failed handshake only loses that one agent; keep accepting
        loop {
            let (socket, peer) = self.tcp.accept().await.map_err(TransportError::IoError)?;
            match self.establish(socket, peer).await {
                Ok(connection) => {
                    info!("Edge connection established from {}", peer);
                    return Ok((connection, peer));
                }
                Err(e) => warn!("Rejected connection from {}: {}", peer, e),
            }
        }
    }

    fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.tcp.local_addr().map_err(TransportError::IoError)
    }

    async fn close(&self) {
        info!("Edge transport listener closed");
    }
}

/// Dials the server from an edge agent
pub struct GrpcConnector {
    tls: tokio_rustls::TlsConnector,
}

impl GrpcConnector {
    pub fn new(config: Arc<GrpcConfig>) -> TransportResult<Self> {
        TransportConfig::validate(&*config)?;
        Ok(Self {
            tls: config.build_tls_connector()?,
        })
    }
}

#[async_trait]
impl TransportConnector for GrpcConnector {
    type Connection = GrpcConnection;

    async fn connect(
        &self,
        addr: SocketAddr,
        server_name: &str,
    ) -> TransportResult<Self::Connection> {
        debug!("Dialing edge server {} ({})", server_name, addr);

        let name = ServerName::try_from(server_name.to_string())
            .map_err(|e| TransportError::TlsError(format!("Invalid server name: {}", e)))?;
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionError(format!("TCP connect failed: {}", e)))?;
        let tls_stream = self
            .tls
            .connect(name, socket)
            .await
            .map_err(|e| TransportError::TlsError(format!("TLS handshake failed: {}", e)))?;

        let connection = GrpcConnection::outbound(tls_stream, addr).await?;
        info!("Edge connection established to {} ({})", server_name, addr);
        Ok(connection)
    }
}
