//! HTTP API for environment views and minimal admin operations
//!
//! Every environment read passes through the reconciler, so clients always
//! see persisted state merged with the live tunnel overlay.

pub mod handlers;
pub mod models;

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use harbormaster_edge::{EnvironmentStore, TunnelRegistry};

/// Application state shared across handlers
pub struct AppState {
    pub registry: TunnelRegistry,
    pub store: Arc<dyn EnvironmentStore>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Harbormaster API",
        version = "0.1.0",
        description = "REST API for managing Docker environments and edge tunnels",
        contact(
            name = "Harbormaster Team",
            email = "team@harbormaster.dev"
        )
    ),
    paths(
        handlers::list_environments,
        handlers::get_environment,
        handlers::create_environment,
        handlers::delete_environment,
        handlers::health_check,
    ),
    components(
        schemas(
            models::EnvironmentStatusView,
            models::EnvironmentView,
            models::EnvironmentList,
            models::CreateEnvironmentRequest,
            models::HealthResponse,
            models::ErrorResponse,
        )
    ),
    tags(
        (name = "environments", description = "Environment management endpoints"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS (for development)
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(
        config: ApiServerConfig,
        registry: TunnelRegistry,
        store: Arc<dyn EnvironmentStore>,
    ) -> Self {
        let state = Arc::new(AppState { registry, store });
        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        build_router(self.state.clone(), self.config.enable_cors)
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );
        info!("Swagger UI: http://{}/swagger-ui", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}

/// Build the full router for the given state
pub fn build_router(state: Arc<AppState>, enable_cors: bool) -> Router {
    let api_doc = ApiDoc::openapi();

    let api_router = Router::new()
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/environments",
            get(handlers::list_environments).post(handlers::create_environment),
        )
        .route(
            "/api/environments/{id}",
            get(handlers::get_environment).delete(handlers::delete_environment),
        )
        .with_state(state);

    let router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", api_doc))
        .merge(api_router)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .allow_origin(tower_http::cors::Any);
        router.layer(cors)
    } else {
        router
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use harbormaster_edge::{Environment, MemoryEnvironmentStore};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(store: Arc<dyn EnvironmentStore>, registry: TunnelRegistry) -> Router {
        build_router(Arc::new(AppState { registry, store }), false)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_openapi_generation() {
        // Ensure OpenAPI spec can be generated without panics
        let _api_doc = ApiDoc::openapi();
    }

    #[tokio::test]
    async fn test_health_check() {
        let router = test_router(
            Arc::new(MemoryEnvironmentStore::new()),
            TunnelRegistry::new(),
        );

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["active_tunnels"], 0);
    }

    #[tokio::test]
    async fn test_list_environments_reconciles() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        store.upsert(Environment::local("local"));
        store.upsert(Environment::edge("env-1", "edge-host"));

        let router = test_router(store, TunnelRegistry::new());

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/environments")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total"], 2);

        // Pending edge environment stays pending, no overlay fields
        let envs = json["environments"].as_array().unwrap();
        let edge = envs.iter().find(|e| e["id"] == "env-1").unwrap();
        assert_eq!(edge["status"], "pending");
        assert!(edge.get("connected").is_none());
    }

    #[tokio::test]
    async fn test_get_environment_not_found() {
        let router = test_router(
            Arc::new(MemoryEnvironmentStore::new()),
            TunnelRegistry::new(),
        );

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/environments/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["code"], "ENVIRONMENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_create_environment() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        let router = test_router(store.clone(), TunnelRegistry::new());

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/environments")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"id":"env-9","name":"warehouse"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["id"], "env-9");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["isEdge"], true);

        assert!(store.get("env-9").is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_reserved_id() {
        let router = test_router(
            Arc::new(MemoryEnvironmentStore::new()),
            TunnelRegistry::new(),
        );

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/environments")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"id":"0","name":"bad"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_conflict_on_duplicate() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        store.upsert(Environment::edge("env-1", "existing"));

        let router = test_router(store, TunnelRegistry::new());

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/environments")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"id":"env-1","name":"dup"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_delete_environment() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        store.upsert(Environment::edge("env-1", "doomed"));

        let router = test_router(store.clone(), TunnelRegistry::new());

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/environments/env-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(store.get("env-1").is_none());
    }

    #[tokio::test]
    async fn test_delete_local_environment_rejected() {
        let store = Arc::new(MemoryEnvironmentStore::new());
        store.upsert(Environment::local("local"));

        let router = test_router(store.clone(), TunnelRegistry::new());

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/environments/0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(store.get("0").is_some());
    }
}
