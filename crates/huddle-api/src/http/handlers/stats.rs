//! Relay statistics handler for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use huddle_core::repository::message::MessageRepository;
use serde::Serialize;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, new_request_id};
use crate::state::AppState;

/// Point-in-time view of the relay.
#[derive(Debug, Serialize)]
pub struct RelayStats {
    pub connections: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub messages_stored: u64,
    /// Identities with a live rate-limit bucket.
    pub tracked_identities: usize,
    /// Identities currently serving a cooldown.
    pub blocked_identities: usize,
    pub uptime_secs: u64,
}

/// GET /api/v1/stats - Connection count, queue depth and stored message count.
pub async fn get_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RelayStats>>, AppError> {
    let start = Instant::now();
    let request_id = new_request_id();

    let stats = RelayStats {
        connections: state.registry.count().await,
        queue_depth: state.publisher.depth(),
        queue_capacity: state.publisher.max_capacity(),
        messages_stored: state.repository.count_messages().await?,
        tracked_identities: state.rate_limiter.tracked(),
        blocked_identities: state.rate_limiter.blocked(Instant::now()),
        uptime_secs: state.started_at.elapsed().as_secs(),
    };

    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(stats, request_id, elapsed)))
}
