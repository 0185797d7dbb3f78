//! Infrastructure layer for Huddle.
//!
//! Contains implementations of the ports defined in `huddle-core`: SQLite
//! message storage, plus the config loader and data directory resolution.

pub mod config;
pub mod filesystem;
pub mod sqlite;
