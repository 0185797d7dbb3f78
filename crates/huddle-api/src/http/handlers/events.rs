//! Raw event injection for integrations and ops tooling.
//!
//! The body is one JSON [`EventEnvelope`] as it flows through the pipeline,
//! e.g. `{"type":"assistant_response","text":"Maintenance at 18:00",
//! "original_text":"","detected_intent":"announcement"}`. An unknown `type`
//! is a protocol violation and is rejected, never silently dropped.

use std::time::Instant;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use huddle_types::error::EnvelopeError;
use huddle_types::event::EventEnvelope;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, new_request_id};
use crate::state::AppState;

/// POST /api/v1/events - Decode an envelope and publish it.
pub async fn publish_event(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<ApiResponse<serde_json::Value>>), AppError> {
    let start = Instant::now();
    let request_id = new_request_id();

    let envelope = EventEnvelope::decode(&body).map_err(|e| {
        if let EnvelopeError::UnknownVariant(tag) = &e {
            tracing::warn!(%tag, "protocol violation: unknown event variant");
        }
        AppError::Validation(e.to_string())
    })?;
    let tag = envelope.tag();

    state
        .publisher
        .publish(envelope)
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    let elapsed = start.elapsed().as_millis() as u64;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(
            serde_json::json!({"accepted": true, "type": tag}),
            request_id,
            elapsed,
        )),
    ))
}
