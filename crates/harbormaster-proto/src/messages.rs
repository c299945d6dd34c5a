//! Protocol message types

use serde::{Deserialize, Serialize};

/// Control messages exchanged between the management server and edge agents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EdgeMessage {
    // Liveness (Stream ID 0)
    Ping {
        timestamp: u64,
    },
    Pong {
        timestamp: u64,
    },

    /// Agent announces itself for a specific edge environment
    Register {
        environment_id: String,
        edge_key: String,
        metadata: AgentMetadata,
    },
    /// Server confirms registration; the tunnel is live from here on
    Registered {
        environment_id: String,
    },
    /// Registration rejected (unknown environment, bad edge key, etc.)
    Rejected {
        reason: String,
    },

    /// Orderly shutdown from either side
    Disconnect {
        reason: String,
    },
    DisconnectAck {
        environment_id: String,
    },
}

/// Metadata an agent reports at registration time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMetadata {
    /// Hostname of the Docker host the agent runs on
    pub hostname: String,
    /// Platform string, e.g. "linux/amd64"
    pub platform: String,
    /// Agent build version
    pub version: String,
}

impl Default for AgentMetadata {
    fn default() -> Self {
        Self {
            hostname: "unknown".to_string(),
            platform: std::env::consts::OS.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_round_trip() {
        let msg = EdgeMessage::Register {
            environment_id: "env-42".to_string(),
            edge_key: "secret".to_string(),
            metadata: AgentMetadata {
                hostname: "edge-host".to_string(),
                platform: "linux/arm64".to_string(),
                version: "0.1.0".to_string(),
            },
        };

        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: EdgeMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_ping_pong_timestamps() {
        let ping = EdgeMessage::Ping { timestamp: 12345 };
        if let EdgeMessage::Ping { timestamp } = ping {
            assert_eq!(timestamp, 12345);
        } else {
            panic!("Expected Ping");
        }
    }
}
