//! Message history handler for the REST API.

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use huddle_core::repository::message::MessageRepository;
use serde::Deserialize;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, new_request_id};
use crate::state::AppState;

/// Largest page a single request may ask for.
const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Number of most recent messages; defaults to `server.history_limit`.
    pub limit: Option<u32>,
}

/// GET /api/v1/messages - Recent conversation history, oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = new_request_id();

    let limit = query.limit.unwrap_or(state.config.server.history_limit);
    if limit > MAX_LIMIT {
        return Err(AppError::Validation(format!(
            "limit must be at most {MAX_LIMIT}, got {limit}"
        )));
    }

    let messages = state.repository.load_history(Some(limit)).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let data = serde_json::json!({
        "count": messages.len(),
        "messages": messages,
    });
    Ok(Json(ApiResponse::success(data, request_id, elapsed)))
}
