//! Harbormaster Agent - edge agent CLI
//!
//! Runs on a Docker host inside a private network and maintains a dial-out
//! tunnel to the Harbormaster management server.

use anyhow::{Context, Result};
use clap::Parser;
use harbormaster_agent::{Agent, AgentConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Harbormaster edge agent - registers a private Docker host with the server
#[derive(Parser, Debug)]
#[command(name = "harbormaster-agent")]
#[command(about = "Harbormaster edge agent - registers a private Docker host with the server")]
#[command(version)]
#[command(long_about = r#"
The Harbormaster agent dials out to a management server and keeps a
persistent tunnel open, so the server can see the environment as online
without any inbound connectivity to this host.

EXAMPLES:
  # Start the agent
  harbormaster-agent --server server.example.com:8000 \
    --environment-id env-42 \
    --edge-key $EDGE_KEY

  # Local development against a self-signed server
  harbormaster-agent --server localhost:8000 \
    --environment-id env-42 --edge-key dev --insecure

ENVIRONMENT VARIABLES:
  HARBORMASTER_SERVER          Server address (host:port)
  HARBORMASTER_ENVIRONMENT_ID  Environment identifier
  HARBORMASTER_EDGE_KEY        Edge key for this environment
"#)]
struct Args {
    /// Server address (e.g., server.example.com:8000)
    #[arg(long, env = "HARBORMASTER_SERVER")]
    server: String,

    /// Environment ID this agent represents
    #[arg(long, env = "HARBORMASTER_ENVIRONMENT_ID")]
    environment_id: String,

    /// Edge key proving this agent may serve the environment
    #[arg(long, env = "HARBORMASTER_EDGE_KEY")]
    edge_key: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Skip certificate verification (insecure, for development only)
    #[arg(long)]
    insecure: bool,
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level)?;

    info!("Harbormaster agent starting...");

    let config = AgentConfig {
        environment_id: args.environment_id,
        server_addr: args.server,
        edge_key: args.edge_key,
        insecure: args.insecure,
    };

    info!("Environment ID: {}", config.environment_id);
    info!("Server: {}", config.server_addr);

    let agent = Agent::new(config).context("Failed to create agent")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let agent = std::sync::Arc::new(agent);
    let agent_clone = agent.clone();
    let agent_task = tokio::spawn(async move { agent_clone.run().await });

    tokio::select! {
        _ = &mut ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
            agent.stop();
        }
        result = agent_task => {
            match result {
                Ok(Ok(())) => {
                    info!("Agent stopped normally");
                }
                Ok(Err(e)) => {
                    error!("Agent error: {:#}", e);
                    return Err(e.into());
                }
                Err(e) => {
                    error!("Agent task panicked: {}", e);
                    return Err(e.into());
                }
            }
        }
    }

    info!("Agent stopped");
    Ok(())
}
