//! Shared domain types for Huddle.
//!
//! This crate contains the core domain types used across the chat relay:
//! participant identities, pipeline event envelopes, stored messages,
//! wire frames, configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
