use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::domain::{BatchRequest, BatchResponse};
use crate::infra::OllamaClient;
use crate::pipeline::coordinator::PipelineCoordinator;

/// Handles shared by every request
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PipelineCoordinator>,
    pub llm: Arc<OllamaClient>,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mdm_pipeline",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Reachability of the model server; 502 when it cannot be reached
async fn llm_ping(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match state.llm.ping().await {
        Ok(tags) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "ok": true,
                "models": tags.get("models").cloned().unwrap_or_default()
            })),
        ),
        Err(e) => {
            warn!("LLM ping failed: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

async fn process(
    Extension(state): Extension<AppState>,
    Json(request): Json<BatchRequest>,
) -> Json<BatchResponse> {
    Json(state.coordinator.process(request).await)
}

/// Create the HTTP router with all routes
pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/llm/ping", get(llm_ping))
        .route("/mdm/process", post(process))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Start the HTTP server on `addr`
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);

    info!("🚀 HTTP server running on http://{addr}");
    info!("💚 Health check: http://{addr}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
