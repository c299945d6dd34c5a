use chrono::{DateTime, Utc};
use harbormaster_edge::{Environment, EnvironmentStatus};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Connectivity status of an environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentStatusView {
    /// Environment is reachable
    Online,
    /// Environment is unreachable
    Offline,
    /// Edge environment whose agent has never connected
    Pending,
    /// Environment is administratively disabled
    Disabled,
}

impl From<EnvironmentStatus> for EnvironmentStatusView {
    fn from(status: EnvironmentStatus) -> Self {
        match status {
            EnvironmentStatus::Online => EnvironmentStatusView::Online,
            EnvironmentStatus::Offline => EnvironmentStatusView::Offline,
            EnvironmentStatus::Pending => EnvironmentStatusView::Pending,
            EnvironmentStatus::Disabled => EnvironmentStatusView::Disabled,
        }
    }
}

/// Environment as served over the API, including the live tunnel overlay
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentView {
    /// Unique environment identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Connectivity status
    pub status: EnvironmentStatusView,
    /// Whether this host connects through an edge tunnel
    pub is_edge: bool,
    /// Whether the environment is administratively enabled
    pub enabled: bool,
    /// Whether a tunnel is currently registered (edge only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected: Option<bool>,
    /// Transport of the current tunnel, e.g. "grpc"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_transport: Option<String>,
    /// When the current tunnel was established
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    /// Most recent heartbeat over the current tunnel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl From<Environment> for EnvironmentView {
    fn from(env: Environment) -> Self {
        Self {
            id: env.id,
            name: env.name,
            status: env.status.into(),
            is_edge: env.is_edge,
            enabled: env.enabled,
            connected: env.connected,
            edge_transport: env.edge_transport.map(|t| t.to_string()),
            connected_at: env.connected_at,
            last_heartbeat: env.last_heartbeat,
        }
    }
}

/// List of environments
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnvironmentList {
    /// Environments, sorted by ID
    pub environments: Vec<EnvironmentView>,
    /// Total count
    pub total: usize,
}

/// Request to create a new edge environment
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateEnvironmentRequest {
    /// Environment ID (auto-generated if not specified)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display name
    pub name: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Server version
    pub version: String,
    /// Number of live edge tunnels
    pub active_tunnels: usize,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
