//! Global configuration types for Huddle.
//!
//! `HuddleConfig` represents the top-level `config.toml` that controls the
//! listening address, rate limiting, pipeline sizing and assistant behavior.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the chat relay.
///
/// Loaded from `~/.huddle/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HuddleConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Listening address and join-time behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of past messages sent to a client when it joins.
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_history_limit() -> u32 {
    50
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            history_limit: default_history_limit(),
        }
    }
}

/// Per-sender rate limit settings.
///
/// A sender may post `capacity` messages in any sliding window of
/// `capacity / refill_per_second` seconds (3 per second by default).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Messages admitted per window.
    #[serde(default = "default_capacity")]
    pub capacity: f64,

    /// Sustained messages per second; sets the window length.
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,

    /// Penalty after a rejection, during which every message is rejected.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,

    /// Buckets idle for longer than this are evicted by the sweeper.
    #[serde(default = "default_idle_eviction_secs")]
    pub idle_eviction_secs: u64,
}

fn default_capacity() -> f64 {
    3.0
}

fn default_refill_per_second() -> f64 {
    3.0
}

fn default_cooldown_secs() -> f64 {
    2.0
}

fn default_idle_eviction_secs() -> u64 {
    3600
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_second: default_refill_per_second(),
            cooldown_secs: default_cooldown_secs(),
            idle_eviction_secs: default_idle_eviction_secs(),
        }
    }
}

/// Event queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of envelopes buffered before publishers are suspended.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Assistant trigger and display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Command token that routes a message to the assistant (case-insensitive).
    #[serde(default = "default_trigger_prefix")]
    pub trigger_prefix: String,

    /// Reserved identity the assistant speaks as.
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
}

fn default_trigger_prefix() -> String {
    "/ask".to_string()
}

fn default_bot_name() -> String {
    "AIBot".to_string()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            trigger_prefix: default_trigger_prefix(),
            bot_name: default_bot_name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = HuddleConfig::default();
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.rate_limit.capacity, 3.0);
        assert_eq!(config.rate_limit.cooldown_secs, 2.0);
        assert_eq!(config.pipeline.queue_capacity, 1024);
        assert_eq!(config.assistant.trigger_prefix, "/ask");
        assert_eq!(config.assistant.bot_name, "AIBot");
    }

    #[test]
    fn test_config_deserialize_empty() {
        let config: HuddleConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.history_limit, 50);
        assert_eq!(config.rate_limit.refill_per_second, 3.0);
    }

    #[test]
    fn test_config_deserialize_partial_section() {
        let toml_str = r#"
[rate_limit]
capacity = 5.0

[assistant]
trigger_prefix = "/AIBot"
"#;
        let config: HuddleConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.rate_limit.capacity, 5.0);
        // Unset fields in a present section keep their defaults
        assert_eq!(config.rate_limit.cooldown_secs, 2.0);
        assert_eq!(config.assistant.trigger_prefix, "/AIBot");
        assert_eq!(config.assistant.bot_name, "AIBot");
        assert_eq!(config.server.port, 8765);
    }
}
