use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use harbormaster_edge::{reconcile_environment, Environment, LOCAL_ENVIRONMENT_ID};

use crate::models::*;
use crate::AppState;

/// List all environments with their live tunnel state
#[utoipa::path(
    get,
    path = "/api/environments",
    responses(
        (status = 200, description = "List of environments", body = EnvironmentList)
    ),
    tag = "environments"
)]
pub async fn list_environments(State(state): State<Arc<AppState>>) -> Json<EnvironmentList> {
    debug!("Listing environments");

    let environments: Vec<EnvironmentView> = state
        .store
        .list()
        .into_iter()
        .map(|mut env| {
            reconcile_environment(&mut env, &state.registry);
            env.into()
        })
        .collect();

    let total = environments.len();

    Json(EnvironmentList {
        environments,
        total,
    })
}

/// Get a specific environment by ID
#[utoipa::path(
    get,
    path = "/api/environments/{id}",
    params(
        ("id" = String, Path, description = "Environment ID")
    ),
    responses(
        (status = 200, description = "Environment information", body = EnvironmentView),
        (status = 404, description = "Environment not found", body = ErrorResponse)
    ),
    tag = "environments"
)]
pub async fn get_environment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<EnvironmentView>, (StatusCode, Json<ErrorResponse>)> {
    debug!("Getting environment: {}", id);

    let mut env = state.store.get(&id).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Environment '{}' not found", id),
                code: Some("ENVIRONMENT_NOT_FOUND".to_string()),
            }),
        )
    })?;

    reconcile_environment(&mut env, &state.registry);

    Ok(Json(env.into()))
}

/// Create a new edge environment
#[utoipa::path(
    post,
    path = "/api/environments",
    request_body = CreateEnvironmentRequest,
    responses(
        (status = 201, description = "Environment created", body = EnvironmentView),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Environment already exists", body = ErrorResponse)
    ),
    tag = "environments"
)]
pub async fn create_environment(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateEnvironmentRequest>,
) -> Result<(StatusCode, Json<EnvironmentView>), (StatusCode, Json<ErrorResponse>)> {
    let id = request
        .id
        .unwrap_or_else(|| format!("env-{}", uuid::Uuid::new_v4()));

    if id == LOCAL_ENVIRONMENT_ID {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Environment ID \"0\" is reserved for the local Docker socket"
                    .to_string(),
                code: Some("RESERVED_ENVIRONMENT_ID".to_string()),
            }),
        ));
    }

    if request.name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Environment name cannot be empty".to_string(),
                code: Some("INVALID_NAME".to_string()),
            }),
        ));
    }

    if state.store.get(&id).is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: format!("Environment '{}' already exists", id),
                code: Some("ENVIRONMENT_EXISTS".to_string()),
            }),
        ));
    }

    info!(environment_id = %id, name = %request.name, "Creating edge environment");

    let env = Environment::edge(&id, &request.name);
    state.store.upsert(env.clone());

    Ok((StatusCode::CREATED, Json(env.into())))
}

/// Delete an environment
#[utoipa::path(
    delete,
    path = "/api/environments/{id}",
    params(
        ("id" = String, Path, description = "Environment ID")
    ),
    responses(
        (status = 204, description = "Environment deleted"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Environment not found", body = ErrorResponse)
    ),
    tag = "environments"
)]
pub async fn delete_environment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    if id == LOCAL_ENVIRONMENT_ID {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "The local environment cannot be deleted".to_string(),
                code: Some("RESERVED_ENVIRONMENT_ID".to_string()),
            }),
        ));
    }

    if state.store.delete(&id).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Environment '{}' not found", id),
                code: Some("ENVIRONMENT_NOT_FOUND".to_string()),
            }),
        ));
    }

    info!(environment_id = %id, "Deleted environment");

    // Tear down any live tunnel for the deleted environment
    if let Some(tunnel) = state.registry.unregister(&id) {
        tunnel.close();
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Health check
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_tunnels: state.registry.count(),
    })
}
