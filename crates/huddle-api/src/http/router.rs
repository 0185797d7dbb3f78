//! Axum router configuration with middleware.
//!
//! - `/ws?username=<name>`: chat WebSocket
//! - `/health`: liveness probe
//! - `/api/v1/...`: history, stats, rate limit admin and event injection
//!
//! Middleware: CORS, request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/messages", get(handlers::messages::list_messages))
        .route("/stats", get(handlers::stats::get_stats))
        .route("/events", post(handlers::events::publish_event))
        .route(
            "/rate-limits/{username}",
            get(handlers::rate_limits::get_rate_limit)
                .delete(handlers::rate_limits::reset_rate_limit),
        );

    Router::new()
        .route("/ws", get(handlers::ws::ws_handler))
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
