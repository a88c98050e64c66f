//! Session configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which provider persists sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Memory,
    Redis,
    Db,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Db => "db",
        })
    }
}

/// Session configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [session]
/// provider = "redis"
/// provider_config = "redis://127.0.0.1:6379/0"
/// max_lifetime = "24h"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backing provider.
    pub provider: ProviderKind,

    /// Provider connection string. The Redis URL for `redis`.
    pub provider_config: String,

    /// Name of the session cookie.
    pub cookie_name: String,

    /// Prefix prepended to session ids in Redis.
    pub key_prefix: String,

    /// Mark the session cookie `Secure`.
    pub cookie_secure: bool,

    /// How often expired sessions are collected.
    #[serde(with = "humantime_serde")]
    pub gc_interval: Duration,

    /// Idle time after which a session expires.
    #[serde(with = "humantime_serde")]
    pub max_lifetime: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Memory,
            provider_config: String::new(),
            cookie_name: "i_like_forge".to_string(),
            key_prefix: "session:".to_string(),
            cookie_secure: false,
            gc_interval: Duration::from_secs(86400),
            max_lifetime: Duration::from_secs(86400),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl SessionConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the Redis provider has no URL, and
    /// `ConfigError::InvalidValue` for an empty cookie name or zero lifetimes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "cookie_name cannot be empty".to_string(),
            ));
        }
        if self.max_lifetime.is_zero() {
            return Err(ConfigError::InvalidValue(
                "max_lifetime must be greater than 0".to_string(),
            ));
        }
        if self.gc_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "gc_interval must be greater than 0".to_string(),
            ));
        }
        if self.provider == ProviderKind::Redis && self.provider_config.is_empty() {
            return Err(ConfigError::Missing("provider_config".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn with_provider_config(mut self, provider_config: impl Into<String>) -> Self {
        self.provider_config = provider_config.into();
        self
    }

    #[must_use]
    pub fn with_max_lifetime(mut self, max_lifetime: Duration) -> Self {
        self.max_lifetime = max_lifetime;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cookie_name, "i_like_forge");
        assert_eq!(config.max_lifetime, Duration::from_secs(86400));
    }

    #[test]
    fn test_redis_requires_url() {
        let config = SessionConfig::default().with_provider(ProviderKind::Redis);
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        let config = config.with_provider_config("redis://127.0.0.1:6379");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        let config = SessionConfig::default().with_max_lifetime(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_deserialize_humantime() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"provider": "db", "max_lifetime": "2h", "gc_interval": "10m"}"#,
        )
        .unwrap();
        assert_eq!(config.provider, ProviderKind::Db);
        assert_eq!(config.max_lifetime, Duration::from_secs(7200));
        assert_eq!(config.gc_interval, Duration::from_secs(600));
        assert_eq!(config.cookie_name, "i_like_forge");
    }
}
