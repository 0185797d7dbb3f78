//! Per-identity rate limit inspection and admin reset.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use huddle_types::identity::Identity;
use serde::Serialize;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, new_request_id};
use crate::state::AppState;

/// Admission state of one identity.
#[derive(Debug, Serialize)]
pub struct RateLimitStatus {
    pub identity: Identity,
    pub messages_in_window: usize,
    pub limit: usize,
    pub blocked: bool,
    pub retry_after_ms: Option<u64>,
}

fn parse_identity(raw: &str) -> Result<Identity, AppError> {
    Identity::parse(raw).map_err(|e| AppError::Validation(e.to_string()))
}

/// GET /api/v1/rate-limits/{username} - Current window and cooldown state.
///
/// An identity that has never sent a message reports an empty window.
pub async fn get_rate_limit(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<RateLimitStatus>>, AppError> {
    let start = Instant::now();
    let request_id = new_request_id();
    let identity = parse_identity(&username)?;

    let status = match state.rate_limiter.stats(&identity, Instant::now()) {
        Some(stats) => RateLimitStatus {
            identity,
            messages_in_window: stats.in_window,
            limit: stats.limit,
            blocked: stats.blocked,
            retry_after_ms: stats.cooldown_remaining.map(|d| d.as_millis() as u64),
        },
        None => RateLimitStatus {
            identity,
            messages_in_window: 0,
            limit: state.rate_limiter.limit(),
            blocked: false,
            retry_after_ms: None,
        },
    };

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(status, request_id, elapsed)))
}

/// DELETE /api/v1/rate-limits/{username} - Clear an identity's window and cooldown.
pub async fn reset_rate_limit(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = new_request_id();
    let identity = parse_identity(&username)?;

    let reset = state.rate_limiter.reset(&identity);
    tracing::info!(%identity, reset, "rate limit reset");

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(
        serde_json::json!({"reset": reset, "identity": identity}),
        request_id,
        elapsed,
    )))
}
