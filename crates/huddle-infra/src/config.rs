//! Configuration loader for Huddle.
//!
//! Reads `config.toml` from the data directory (`~/.huddle/` in production)
//! and deserializes it into [`HuddleConfig`]. Falls back to defaults when the
//! file is missing or malformed; values that parse but make no sense are
//! rejected by [`validate`].

use std::path::Path;

use huddle_core::rate_limit::MAX_PERIOD;
use huddle_types::config::HuddleConfig;
use thiserror::Error;

/// A configuration value outside its usable range.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("rate_limit.{field} must be a positive number, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("rate_limit.cooldown_secs must be between 0 and {max}, got {0}", max = MAX_PERIOD.as_secs())]
    InvalidCooldown(f64),

    #[error("rate_limit.capacity / refill_per_second must be at most {max} seconds, got {0}", max = MAX_PERIOD.as_secs())]
    WindowTooLong(f64),

    #[error("assistant.bot_name must not be blank")]
    BlankBotName,
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`HuddleConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> HuddleConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return HuddleConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return HuddleConfig::default();
        }
    };

    match toml::from_str::<HuddleConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            HuddleConfig::default()
        }
    }
}

/// Reject settings the rate limiter or assistant cannot work with.
pub fn validate(config: &HuddleConfig) -> Result<(), ConfigError> {
    let rl = &config.rate_limit;
    if !is_positive(rl.capacity) {
        return Err(ConfigError::NonPositive {
            field: "capacity",
            value: rl.capacity,
        });
    }
    if !is_positive(rl.refill_per_second) {
        return Err(ConfigError::NonPositive {
            field: "refill_per_second",
            value: rl.refill_per_second,
        });
    }
    let window_secs = rl.capacity / rl.refill_per_second;
    if window_secs > max_period_secs() {
        return Err(ConfigError::WindowTooLong(window_secs));
    }
    if !(0.0..=max_period_secs()).contains(&rl.cooldown_secs) {
        return Err(ConfigError::InvalidCooldown(rl.cooldown_secs));
    }
    if config.assistant.bot_name.trim().is_empty() {
        return Err(ConfigError::BlankBotName);
    }
    Ok(())
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn max_period_secs() -> f64 {
    MAX_PERIOD.as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.assistant.trigger_prefix, "/ask");
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[server]
port = 9000
history_limit = 20

[pipeline]
queue_capacity = 64
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.history_limit, 20);
        assert_eq!(config.pipeline.queue_capacity, 64);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.server.port, 8765);
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&HuddleConfig::default()).is_ok());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = HuddleConfig::default();
        config.rate_limit.capacity = 0.0;
        assert_eq!(
            validate(&config),
            Err(ConfigError::NonPositive {
                field: "capacity",
                value: 0.0
            })
        );
    }

    #[test]
    fn validate_rejects_nan_refill() {
        let mut config = HuddleConfig::default();
        config.rate_limit.refill_per_second = f64::NAN;
        assert!(matches!(
            validate(&config),
            Err(ConfigError::NonPositive { field: "refill_per_second", .. })
        ));
    }

    #[test]
    fn validate_rejects_negative_cooldown() {
        let mut config = HuddleConfig::default();
        config.rate_limit.cooldown_secs = -1.0;
        assert_eq!(validate(&config), Err(ConfigError::InvalidCooldown(-1.0)));
    }

    #[test]
    fn validate_rejects_huge_cooldown() {
        let mut config = HuddleConfig::default();
        config.rate_limit.cooldown_secs = 1e300;
        assert_eq!(validate(&config), Err(ConfigError::InvalidCooldown(1e300)));

        config.rate_limit.cooldown_secs = f64::INFINITY;
        assert!(matches!(validate(&config), Err(ConfigError::InvalidCooldown(_))));

        config.rate_limit.cooldown_secs = 86_400.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn validate_rejects_window_longer_than_a_day() {
        let mut config = HuddleConfig::default();
        config.rate_limit.capacity = 1e6;
        config.rate_limit.refill_per_second = 1.0;
        assert_eq!(validate(&config), Err(ConfigError::WindowTooLong(1e6)));
    }

    #[test]
    fn validate_rejects_blank_bot_name() {
        let mut config = HuddleConfig::default();
        config.assistant.bot_name = " ".to_string();
        assert_eq!(validate(&config), Err(ConfigError::BlankBotName));
    }
}
