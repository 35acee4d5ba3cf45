//! Configuration management.
//!
//! Settings come from, lowest precedence first: built-in defaults, a TOML file,
//! `OPENALEX_MCP__SECTION__KEY` environment variables, and `OPENALEX_EMAIL`
//! for the contact address.
//!
//! ```toml
//! [provider]
//! base_url = "https://api.openalex.org"
//! email = "you@example.org"
//! request_timeout = 30
//!
//! [rate_limit]
//! requests_per_second = 5.0
//! burst = 1
//!
//! [retry]
//! max_attempts = 3
//! initial_delay = 0.5
//! max_delay = 30
//!
//! [circuit_breaker]
//! failure_threshold = 5
//! open_duration = 30
//!
//! [server]
//! host = "127.0.0.1"
//! port = 8000
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{CircuitBreakerConfig, RetryConfig};

/// Environment variable holding the contact address
pub const EMAIL_ENV: &str = "OPENALEX_EMAIL";

/// Prefix of structured environment overrides
pub const ENV_PREFIX: &str = "OPENALEX_MCP";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub server: ServerConfig,
}

/// Provider endpoint and identity
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Contact address sent as `mailto`; raises the rate budget
    pub email: Option<String>,
    /// Per-request HTTP timeout
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openalex.org".to_string(),
            email: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Token bucket settings
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Explicit rate; unset picks the anonymous or contact tier
    pub requests_per_second: Option<f64>,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: None,
            burst: 1,
        }
    }
}

/// HTTP listener for the streamable transport
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load from `path` (or the default location, if it exists) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(default_config_path);
        let email = std::env::var(EMAIL_ENV).ok().filter(|e| !e.trim().is_empty());
        Self::build(path.as_deref(), email)
    }

    fn build(path: Option<&Path>, email: Option<String>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            tracing::debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .set_override_option("provider.email", email)?;

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(rate) = self.rate_limit.requests_per_second {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "rate_limit.requests_per_second must be positive, got {}",
                    rate
                )));
            }
        }
        if self.rate_limit.burst == 0 {
            return Err(ConfigError::Invalid("rate_limit.burst must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.backoff_multiplier must be at least 1".into(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if url::Url::parse(&self.provider.base_url).is_err() {
            return Err(ConfigError::Invalid(format!(
                "provider.base_url '{}' is not a URL",
                self.provider.base_url
            )));
        }
        Ok(())
    }
}

/// `$XDG_CONFIG_HOME/openalex-mcp/config.toml`, when present
pub fn default_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("openalex-mcp").join("config.toml");
    path.exists().then_some(path)
}

/// Serde adapter for durations written as (fractional) seconds
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.provider.base_url, "https://api.openalex.org");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(
            br#"
[provider]
email = "file@example.org"
request_timeout = 2.5

[retry]
max_attempts = 5
initial_delay = 0.25

[circuit_breaker]
open_duration = 10
"#,
        )
        .unwrap();

        let config = Config::build(Some(&path), None).unwrap();
        assert_eq!(config.provider.email.as_deref(), Some("file@example.org"));
        assert_eq!(config.provider.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(config.circuit_breaker.open_duration, Duration::from_secs(10));
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_email_env_wins_over_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[provider]\nemail = \"file@example.org\"\n").unwrap();

        let config = Config::build(Some(&path), Some("env@example.org".into())).unwrap();
        assert_eq!(config.provider.email.as_deref(), Some("env@example.org"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::build(Some(Path::new("/nonexistent/config.toml")), None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();
        assert!(matches!(
            Config::build(Some(&path), None),
            Err(ConfigError::Invalid(_))
        ));

        let mut config = Config::default();
        config.rate_limit.requests_per_second = Some(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("invalid.toml");
        std::fs::write(&path, "invalid = toml = content").unwrap();
        assert!(matches!(
            Config::build(Some(&path), None),
            Err(ConfigError::Load(_))
        ));
    }
}
