//! HTTP layer for Huddle.
//!
//! The WebSocket chat endpoint at `/ws`, plus a small read-only REST API at
//! `/api/v1/` using the envelope response format.

pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
