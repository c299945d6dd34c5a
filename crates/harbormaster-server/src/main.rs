//! Harbormaster Server CLI
//!
//! Runs the edge tunnel listener and the HTTP API in one process.

use clap::Parser;
use harbormaster_api::{ApiServer, ApiServerConfig};
use harbormaster_edge::{
    spawn_stale_tunnel_sweep, Environment, EnvironmentStore, HeartbeatConfig,
    MemoryEnvironmentStore, TunnelRegistry,
};
use harbormaster_server::{EdgeServer, EdgeServerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "harbormaster-server",
    about = "Harbormaster management server for edge Docker environments",
    version,
    long_about = "Accepts dial-out tunnels from edge agents running next to private\n\
                  Docker hosts and serves the reconciled environment state over HTTP.\n\n\
                  Examples:\n  \
                  # Self-signed certificate, no edge key\n  \
                  harbormaster-server --listen 0.0.0.0:8000 --api-listen 127.0.0.1:9000\n\n  \
                  # Custom certificates and a shared edge key\n  \
                  harbormaster-server \\\n    \
                  --listen 0.0.0.0:8000 \\\n    \
                  --cert server.crt --key server.key \\\n    \
                  --edge-key $EDGE_KEY"
)]
struct Cli {
    /// Listen address for the edge transport
    #[arg(
        short = 'l',
        long,
        default_value = "0.0.0.0:8000",
        env = "HARBORMASTER_LISTEN"
    )]
    listen: SocketAddr,

    /// Listen address for the HTTP API
    #[arg(long, default_value = "127.0.0.1:9000", env = "HARBORMASTER_API_LISTEN")]
    api_listen: SocketAddr,

    /// TLS certificate path (self-signed if omitted)
    #[arg(long, env = "HARBORMASTER_CERT")]
    cert: Option<String>,

    /// TLS key path (self-signed if omitted)
    #[arg(long, env = "HARBORMASTER_KEY")]
    key: Option<String>,

    /// Pre-shared edge key agents must present (optional)
    #[arg(long, env = "HARBORMASTER_EDGE_KEY")]
    edge_key: Option<String>,

    /// Seconds between heartbeat pings
    #[arg(long, default_value_t = 10, env = "HARBORMASTER_PING_INTERVAL")]
    ping_interval: u64,

    /// Seconds to wait for a pong before dropping the session
    #[arg(long, default_value_t = 5, env = "HARBORMASTER_PONG_TIMEOUT")]
    pong_timeout: u64,

    /// Seconds without a heartbeat before the sweep evicts a tunnel
    #[arg(long, default_value_t = 60, env = "HARBORMASTER_STALE_THRESHOLD")]
    stale_threshold: u64,

    /// Seconds between staleness sweeps
    #[arg(long, default_value_t = 15, env = "HARBORMASTER_SWEEP_INTERVAL")]
    sweep_interval: u64,

    /// Display name for the local environment
    #[arg(long, default_value = "local")]
    local_name: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "harbormaster_server=debug,harbormaster_edge=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "harbormaster_server=info,harbormaster_edge=info".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Harbormaster server");
    tracing::info!("Edge listen: {}", cli.listen);
    tracing::info!("API listen: {}", cli.api_listen);

    if cli.edge_key.is_some() {
        tracing::info!("Edge key check enabled");
    } else {
        tracing::warn!("No edge key configured - accepting any agent for known environments");
    }

    // Shared state: the registry holds live tunnels, the store holds the
    // persisted environment records, seeded with the local Docker socket
    let registry = TunnelRegistry::new();
    let store = Arc::new(MemoryEnvironmentStore::new());
    store.upsert(Environment::local(&cli.local_name));

    // Evicts tunnels that went quiet without a clean stream error
    let _sweep = spawn_stale_tunnel_sweep(
        registry.clone(),
        Duration::from_secs(cli.stale_threshold),
        Duration::from_secs(cli.sweep_interval),
    );

    let api_server = ApiServer::new(
        ApiServerConfig {
            bind_addr: cli.api_listen,
            enable_cors: true,
        },
        registry.clone(),
        store.clone(),
    );

    let edge_server = EdgeServer::new(
        EdgeServerConfig {
            listen_addr: cli.listen,
            cert_path: cli.cert,
            key_path: cli.key,
            edge_key: cli.edge_key,
            heartbeat: HeartbeatConfig {
                ping_interval: Duration::from_secs(cli.ping_interval),
                pong_timeout: Duration::from_secs(cli.pong_timeout),
            },
        },
        registry,
        store,
    )?;

    tokio::select! {
        result = edge_server.run() => {
            tracing::error!("Edge server exited: {:?}", result);
            result
        }
        result = api_server.start() => {
            tracing::error!("API server exited: {:?}", result);
            result
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    }
}
