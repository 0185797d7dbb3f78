//! Observability setup for Huddle: tracing subscriber and optional
//! OpenTelemetry span export.

pub mod tracing_setup;
