//! HTTP surface: the application router and shared response types

pub mod response;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;

use crate::config::CorsConfig;
use crate::features::{self, FeatureState};
use crate::middleware;
use crate::store::RecordStore;

pub use response::{internal_error, ApiResponse, ErrorResponse};

/// Create the application router with all routes and middleware
pub fn create_router(state: FeatureState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .with_state(state.clone())
        .merge(features::router(state))
        // Outermost first. CORS needs a `Default` response body, so it sits innermost
        .layer(
            ServiceBuilder::new()
                .layer(CompressionLayer::new())
                .layer(middleware::tracing_layer())
                .layer(middleware::cors_layer(cors)),
        )
}

async fn root() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Health check handler
async fn health_check(State(state): State<FeatureState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "connected",
                "running_batches": state.scheduler.running_count()
            })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "store": "unavailable" })),
            )
        },
    }
}
