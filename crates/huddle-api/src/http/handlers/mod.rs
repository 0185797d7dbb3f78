//! Route handlers.

pub mod events;
pub mod messages;
pub mod rate_limits;
pub mod stats;
pub mod ws;
