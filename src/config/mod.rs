//! Configuration system (layered: code > env > config file > defaults).

use std::path::Path;
use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::BlockstreamError;
use crate::util::BackoffPolicy;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_MS: u64 = 500;
const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
/// One display frame at 60 Hz.
const DEFAULT_TICK_MS: u64 = 16;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Environment variable names read by [`EngineConfig::from_env`].
pub const ENV_BASE_URL: &str = "BLOCKSTREAM_BASE_URL";
pub const ENV_MAX_ATTEMPTS: &str = "BLOCKSTREAM_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_MS: &str = "BLOCKSTREAM_RETRY_BASE_MS";
pub const ENV_TICK_MS: &str = "BLOCKSTREAM_TICK_MS";

/// Engine configuration.
///
/// ```
/// use blockstream::config::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .max_attempts(5)
///     .base_url("http://localhost:8080/api".to_string())
///     .build();
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.tick_interval_ms, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Consecutive failed connection attempts before the session is exhausted.
    #[builder(default = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,
    /// Base reconnect delay; attempt `n` waits `base * 2^n`.
    #[builder(default = DEFAULT_RETRY_BASE_MS)]
    pub retry_base_delay_ms: u64,
    /// Cap for a single reconnect delay.
    #[builder(default = DEFAULT_RETRY_MAX_MS)]
    pub retry_max_delay_ms: u64,
    /// Coalescing tick for published updates.
    #[builder(default = DEFAULT_TICK_MS)]
    pub tick_interval_ms: u64,
    /// Base URL of the streaming endpoint (SSE transport only).
    pub base_url: Option<String>,
    /// Upper bound on a single HTTP stream (SSE transport only).
    #[builder(default = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl EngineConfig {
    /// Defaults overridden by `BLOCKSTREAM_*` environment variables (and `.env`).
    pub fn from_env() -> Result<Self, BlockstreamError> {
        let _ = dotenvy::dotenv();
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, BlockstreamError> {
        let config: Self = toml::from_str(source)
            .map_err(|e| BlockstreamError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, BlockstreamError> {
        let _ = dotenvy::dotenv();
        let base = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| {
                    BlockstreamError::Configuration(format!(
                        "cannot read {}: {e}",
                        path.display()
                    ))
                })?;
                Self::from_toml_str(&source)?
            }
            None => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup (environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, BlockstreamError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(url.trim().to_string());
        }
        if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
            self.max_attempts = parse_number(ENV_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = lookup(ENV_RETRY_BASE_MS) {
            self.retry_base_delay_ms = parse_number(ENV_RETRY_BASE_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_TICK_MS) {
            self.tick_interval_ms = parse_number(ENV_TICK_MS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), BlockstreamError> {
        if self.max_attempts == 0 {
            return Err(BlockstreamError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(BlockstreamError::Configuration(
                "tick_interval_ms must be at least 1; use ImmediateTick for unthrottled updates"
                    .into(),
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(BlockstreamError::Configuration(
                "retry_max_delay_ms must not be below retry_base_delay_ms".into(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reconnect policy derived from this config.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, BlockstreamError> {
    value
        .trim()
        .parse()
        .map_err(|_| BlockstreamError::Configuration(format!("{key}: not a number: {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();

        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base_delay_ms, 500);
        assert_eq!(config.tick_interval(), Duration::from_millis(16));
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = EngineConfig::default()
            .with_overrides(lookup(&[
                (ENV_BASE_URL, " http://relay.local/api "),
                (ENV_MAX_ATTEMPTS, "5"),
                (ENV_RETRY_BASE_MS, "250"),
                (ENV_TICK_MS, "33"),
            ]))
            .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("http://relay.local/api"));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff().base_delay, Duration::from_millis(250));
        assert_eq!(config.tick_interval_ms, 33);
    }

    #[test]
    fn unparsable_override_is_a_configuration_error() {
        let err = EngineConfig::default()
            .with_overrides(lookup(&[(ENV_MAX_ATTEMPTS, "three")]))
            .unwrap_err();

        assert!(matches!(err, BlockstreamError::Configuration(msg) if msg.contains(ENV_MAX_ATTEMPTS)));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let err = EngineConfig::default()
            .with_overrides(lookup(&[(ENV_MAX_ATTEMPTS, "0")]))
            .unwrap_err();

        assert!(matches!(err, BlockstreamError::Configuration(_)));
    }

    #[test]
    fn toml_keeps_defaults_for_missing_keys() {
        let config = EngineConfig::from_toml_str(
            r#"
            max_attempts = 4
            base_url = "https://chat.example.com/api"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.base_url.as_deref(), Some("https://chat.example.com/api"));
        assert_eq!(config.tick_interval_ms, DEFAULT_TICK_MS);
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("blockstream.toml");
        std::fs::write(&path, "retry_base_delay_ms = 1000\n").unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();

        assert_eq!(config.backoff().delay_for(1), Duration::from_millis(2000));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = EngineConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();

        assert!(matches!(err, BlockstreamError::Configuration(msg) if msg.contains("missing.toml")));
    }

    #[test]
    fn invalid_toml_is_a_configuration_error() {
        let err = EngineConfig::from_toml_str("max_attempts = \"many\"").unwrap_err();

        assert!(matches!(err, BlockstreamError::Configuration(_)));
    }
}
