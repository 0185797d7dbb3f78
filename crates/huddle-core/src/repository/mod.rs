//! Repository trait definitions for the persistence port.
//!
//! Implementations live in huddle-infra (e.g. `SqliteMessageRepository`).

pub mod message;
