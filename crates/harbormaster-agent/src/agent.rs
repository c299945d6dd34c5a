//! Edge agent connection loop

use harbormaster_proto::{AgentMetadata, EdgeMessage};
use harbormaster_transport::{
    TransportConnection, TransportConnector, TransportError, TransportStream,
};
use harbormaster_transport_grpc::{GrpcConfig, GrpcConnector, GrpcStream};
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Initial reconnect delay after a dropped tunnel
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
/// Ceiling for the reconnect delay
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Errors that can occur in the agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Address resolution failed: {0}")]
    AddressResolution(String),
}

/// Configuration for the edge agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Environment this agent represents
    pub environment_id: String,

    /// Harbormaster server address (host:port)
    pub server_addr: String,

    /// Pre-shared key proving the agent may serve this environment
    pub edge_key: String,

    /// Whether to skip certificate verification (insecure, for development only)
    pub insecure: bool,
}

/// The edge agent - dials the server and keeps a tunnel registered
pub struct Agent {
    config: AgentConfig,

    /// Flag indicating if the agent should keep reconnecting
    running: Arc<AtomicBool>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        if config.environment_id.is_empty() {
            return Err(AgentError::InvalidConfig(
                "Environment ID cannot be empty".to_string(),
            ));
        }

        if !config.server_addr.contains(':') {
            return Err(AgentError::InvalidConfig(format!(
                "Invalid server address format '{}'. Expected 'host:port'",
                config.server_addr
            )));
        }

        Ok(Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Run the agent until stopped
    ///
    /// Connects, registers, and serves the control stream. On any tunnel
    /// failure the agent sleeps with exponential backoff and dials again;
    /// the delay resets after each successful registration. A rejected
    /// registration is fatal because retrying the same credentials cannot
    /// succeed.
    pub async fn run(&self) -> Result<(), AgentError> {
        self.running.store(true, Ordering::SeqCst);

        let mut backoff = BACKOFF_INITIAL;

        while self.running.load(Ordering::SeqCst) {
            match self.connect_and_serve(&mut backoff).await {
                Ok(()) => {
                    // Orderly disconnect, reconnect promptly
                    backoff = BACKOFF_INITIAL;
                }
                Err(AgentError::RegistrationFailed(reason)) => {
                    tracing::error!(
                        environment_id = %self.config.environment_id,
                        reason = %reason,
                        "Registration rejected, giving up"
                    );
                    self.running.store(false, Ordering::SeqCst);
                    return Err(AgentError::RegistrationFailed(reason));
                }
                Err(e) => {
                    tracing::warn!(
                        environment_id = %self.config.environment_id,
                        error = %e,
                        retry_in_secs = backoff.as_secs(),
                        "Tunnel lost, reconnecting"
                    );
                }
            }

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }

        tracing::info!(
            environment_id = %self.config.environment_id,
            "Agent stopped"
        );

        Ok(())
    }

    /// Stop the agent after the current session ends
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// One full session: dial, register, then serve the control stream
    async fn connect_and_serve(&self, backoff: &mut Duration) -> Result<(), AgentError> {
        tracing::info!(
            environment_id = %self.config.environment_id,
            server_addr = %self.config.server_addr,
            "Connecting to server"
        );

        let socket_addr = self
            .config
            .server_addr
            .to_socket_addrs()
            .map_err(|e| {
                AgentError::AddressResolution(format!(
                    "Failed to resolve {}: {}",
                    self.config.server_addr, e
                ))
            })?
            .next()
            .ok_or_else(|| {
                AgentError::AddressResolution(format!(
                    "No addresses found for {}",
                    self.config.server_addr
                ))
            })?;

        let server_name = tls_server_name(&self.config.server_addr);

        let grpc_config = if self.config.insecure {
            Arc::new(GrpcConfig::client_insecure())
        } else {
            Arc::new(GrpcConfig::client_default())
        };

        let connector = GrpcConnector::new(grpc_config)?;
        let connection = connector.connect(socket_addr, server_name).await?;

        let control_stream = self.register(&connection).await?;

        // A completed registration proves the credentials and network path
        // work, so later failures start the backoff ladder from the bottom
        *backoff = BACKOFF_INITIAL;

        tracing::info!(
            environment_id = %self.config.environment_id,
            "Tunnel established"
        );

        let result = self.serve_control_stream(control_stream).await;

        connection.close(0, "Session ended").await;

        result
    }

    /// Open the control stream and announce the environment
    async fn register(
        &self,
        connection: &impl TransportConnection<Stream = GrpcStream>,
    ) -> Result<GrpcStream, AgentError> {
        let mut stream = connection.open_stream().await?;

        let register_msg = EdgeMessage::Register {
            environment_id: self.config.environment_id.clone(),
            edge_key: self.config.edge_key.clone(),
            metadata: AgentMetadata {
                hostname: hostname(),
                ..AgentMetadata::default()
            },
        };

        stream.send_message(&register_msg).await?;

        match stream.recv_message().await? {
            Some(EdgeMessage::Registered { environment_id }) => {
                tracing::info!(
                    environment_id = %environment_id,
                    "Registration successful"
                );
                Ok(stream)
            }
            Some(EdgeMessage::Rejected { reason }) => {
                Err(AgentError::RegistrationFailed(reason))
            }
            Some(msg) => Err(AgentError::Transport(TransportError::ProtocolError(
                format!("Unexpected registration response: {:?}", msg),
            ))),
            None => Err(AgentError::Transport(TransportError::StreamClosed)),
        }
    }

    /// Answer heartbeats until the stream closes or a disconnect arrives
    async fn serve_control_stream(&self, mut stream: GrpcStream) -> Result<(), AgentError> {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                let disconnect = EdgeMessage::Disconnect {
                    reason: "Agent shutting down".to_string(),
                };
                // Best effort, the server also handles abrupt EOF
                let _ = stream.send_message(&disconnect).await;
                return Ok(());
            }

            match stream.recv_message().await {
                Ok(Some(EdgeMessage::Ping { timestamp })) => {
                    tracing::debug!(
                        environment_id = %self.config.environment_id,
                        timestamp = timestamp,
                        "Ping received, sending pong"
                    );
                    stream
                        .send_message(&EdgeMessage::Pong { timestamp })
                        .await?;
                }
                Ok(Some(EdgeMessage::Disconnect { reason })) => {
                    tracing::info!(
                        environment_id = %self.config.environment_id,
                        reason = %reason,
                        "Server requested disconnect"
                    );
                    let ack = EdgeMessage::DisconnectAck {
                        environment_id: self.config.environment_id.clone(),
                    };
                    let _ = stream.send_message(&ack).await;
                    return Ok(());
                }
                Ok(Some(msg)) => {
                    tracing::warn!(
                        environment_id = %self.config.environment_id,
                        message = ?msg,
                        "Unexpected message on control stream"
                    );
                }
                Ok(None) => {
                    return Err(AgentError::Transport(TransportError::StreamClosed));
                }
                Err(e) => {
                    return Err(AgentError::Transport(e));
                }
            }
        }
    }

    pub fn environment_id(&self) -> &str {
        &self.config.environment_id
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

/// Strip the port from a `host:port` address for use as the TLS server name
///
/// Splits on the last colon so IPv6 literals like `[::1]:8000` keep their
/// address intact; the surrounding brackets are removed as well.
fn tls_server_name(addr: &str) -> &str {
    let host = match addr.rsplit_once(':') {
        Some((host, _)) => host,
        None => addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}
