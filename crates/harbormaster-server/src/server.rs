//! Edge tunnel accept loop
//!
//! Accepts inbound agent connections, validates their registration against
//! the environment store, and hands live tunnels to the heartbeat driver.
//! Per-connection failures are absorbed here; they never take down the
//! accept loop or leak into the registry.

use harbormaster_edge::{
    run_heartbeat, EdgeTunnel, EnvironmentStore, HeartbeatConfig, TunnelRegistry,
    LOCAL_ENVIRONMENT_ID,
};
use harbormaster_proto::EdgeMessage;
use harbormaster_transport::{TransportConnection, TransportListener, TransportStream};
use harbormaster_transport_grpc::{GrpcConfig, GrpcConnection, GrpcListener, GrpcTunnel};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Edge server configuration
#[derive(Debug, Clone)]
pub struct EdgeServerConfig {
    /// Listen address for the edge transport
    pub listen_addr: SocketAddr,
    /// TLS certificate path (auto-generated if None)
    pub cert_path: Option<String>,
    /// TLS key path (auto-generated if None)
    pub key_path: Option<String>,
    /// Pre-shared edge key agents must present; None disables the check
    pub edge_key: Option<String>,
    /// Heartbeat tuning for accepted sessions
    pub heartbeat: HeartbeatConfig,
}

/// Edge tunnel server
pub struct EdgeServer {
    config: EdgeServerConfig,
    listener: GrpcListener,
    registry: TunnelRegistry,
    store: Arc<dyn EnvironmentStore>,
}

impl EdgeServer {
    pub fn new(
        config: EdgeServerConfig,
        registry: TunnelRegistry,
        store: Arc<dyn EnvironmentStore>,
    ) -> anyhow::Result<Self> {
        info!("Initializing edge server on {}", config.listen_addr);

        let grpc_config =
            if let (Some(cert_path), Some(key_path)) = (&config.cert_path, &config.key_path) {
                info!("Using provided TLS certificates");
                Arc::new(GrpcConfig::server_default(cert_path, key_path)?)
            } else {
                info!("No certificates provided, using self-signed certificate");
                Arc::new(GrpcConfig::server_self_signed()?)
            };

        let listener = GrpcListener::new(config.listen_addr, grpc_config)?;

        Ok(Self {
            config,
            listener,
            registry,
            store,
        })
    }

    /// Run the accept loop
    pub async fn run(self) -> anyhow::Result<()> {
        info!("Edge server listening on {}", self.config.listen_addr);

        loop {
            match self.listener.accept().await {
                Ok((connection, peer_addr)) => {
                    info!("New edge connection from {}", peer_addr);

                    let registry = self.registry.clone();
                    let store = self.store.clone();
                    let edge_key = self.config.edge_key.clone();
                    let heartbeat = self.config.heartbeat.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(
                            connection, peer_addr, registry, store, edge_key, heartbeat,
                        )
                        .await
                        {
                            error!("Connection error from {}: {}", peer_addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Drive one agent connection from handshake to session end
async fn handle_connection(
    connection: GrpcConnection,
    peer_addr: SocketAddr,
    registry: TunnelRegistry,
    store: Arc<dyn EnvironmentStore>,
    edge_key: Option<String>,
    heartbeat: HeartbeatConfig,
) -> anyhow::Result<()> {
    let conn = Arc::new(connection);

    // First stream from the agent is the control stream
    let mut control_stream = match conn.accept_stream().await? {
        Some(stream) => stream,
        None => {
            warn!("Connection from {} closed before control stream", peer_addr);
            return Ok(());
        }
    };

    // First message must be Register
    let first_message = match control_stream.recv_message().await? {
        Some(msg) => msg,
        None => {
            warn!("Connection from {} closed before registration", peer_addr);
            return Ok(());
        }
    };

    let EdgeMessage::Register {
        environment_id,
        edge_key: presented_key,
        metadata,
    } = first_message
    else {
        warn!(
            "Unexpected first message from {}: {:?}",
            peer_addr, first_message
        );
        control_stream
            .send_message(&EdgeMessage::Rejected {
                reason: "Expected Register as first message".to_string(),
            })
            .await?;
        return Ok(());
    };

    info!(
        environment_id = %environment_id,
        peer_addr = %peer_addr,
        hostname = %metadata.hostname,
        agent_version = %metadata.version,
        "Registration request"
    );

    if let Err(reason) = validate_registration(&environment_id, &presented_key, &*store, &edge_key)
    {
        warn!(
            environment_id = %environment_id,
            peer_addr = %peer_addr,
            reason = %reason,
            "Registration rejected"
        );
        control_stream
            .send_message(&EdgeMessage::Rejected { reason })
            .await?;
        return Ok(());
    }

    let tunnel: Arc<dyn EdgeTunnel> = GrpcTunnel::with_conn(&environment_id, conn);

    // Last writer wins; the superseded session's connection is closed here
    // and its own cleanup becomes a guarded no-op
    match registry.register(tunnel.clone()) {
        Ok(Some(replaced)) => replaced.close(),
        Ok(None) => {}
        Err(e) => {
            control_stream
                .send_message(&EdgeMessage::Rejected {
                    reason: e.to_string(),
                })
                .await?;
            return Ok(());
        }
    }

    control_stream
        .send_message(&EdgeMessage::Registered {
            environment_id: environment_id.clone(),
        })
        .await?;

    info!(environment_id = %environment_id, "Edge tunnel registered");

    // Runs until the session ends, then unregisters (guarded) and closes
    run_heartbeat(tunnel, registry, control_stream, heartbeat).await;

    Ok(())
}

/// Check a registration request against the environment store
fn validate_registration(
    environment_id: &str,
    presented_key: &str,
    store: &dyn EnvironmentStore,
    expected_key: &Option<String>,
) -> Result<(), String> {
    if environment_id == LOCAL_ENVIRONMENT_ID {
        return Err("Environment ID \"0\" is reserved for the local Docker socket".to_string());
    }

    let env = store
        .get(environment_id)
        .ok_or_else(|| format!("Unknown environment '{}'", environment_id))?;

    if !env.is_edge {
        return Err(format!(
            "Environment '{}' is not an edge environment",
            environment_id
        ));
    }

    if !env.enabled {
        return Err(format!("Environment '{}' is disabled", environment_id));
    }

    if let Some(expected) = expected_key {
        if presented_key != expected {
            return Err("Invalid edge key".to_string());
        }
    }

    Ok(())
}
