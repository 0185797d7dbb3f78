//! Core domain logic for the Huddle chat relay.
//!
//! - [`rate_limit`]: per-sender sliding-window admission control.
//! - [`registry`]: live connection map with resilient broadcast.
//! - [`pipeline`]: publisher / queue / consumer chain.
//! - [`repository`], [`responder`]: ports implemented by adapters.

pub mod pipeline;
pub mod rate_limit;
pub mod registry;
pub mod repository;
pub mod responder;

#[cfg(test)]
mod test_support;
