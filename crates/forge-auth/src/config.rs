//! Authentication configuration.
//!
//! One [`AuthConfig`] is built at startup and shared by reference with every
//! component that needs it.

use std::path::Path;
use std::time::Duration;

use forge_session::SessionConfig;
use serde::{Deserialize, Serialize};

/// Root authentication configuration.
///
/// # Example (TOML)
///
/// ```toml
/// remember_duration = "31d"
/// basic_auth_enabled = true
///
/// [reverse_proxy]
/// enabled = true
/// auto_register = true
///
/// [session]
/// provider = "redis"
/// provider_config = "redis://127.0.0.1:6379/0"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of remember-me auth tokens.
    #[serde(with = "humantime_serde")]
    pub remember_duration: Duration,

    /// Cookie carrying the `<id>:<secret>` remember-me token.
    pub remember_cookie_name: String,

    /// Allow username/password over HTTP basic auth.
    pub basic_auth_enabled: bool,

    /// Accept token and basic credentials on `info/lfs` paths.
    pub lfs_server_enabled: bool,

    /// Domain used to synthesize addresses for users without a valid email.
    pub no_reply_address: String,

    /// Reverse proxy header authentication.
    pub reverse_proxy: ReverseProxyConfig,

    /// Session storage.
    pub session: SessionConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            remember_duration: Duration::from_secs(31 * 24 * 3600),
            remember_cookie_name: "forge_incredible".to_string(),
            basic_auth_enabled: true,
            lfs_server_enabled: true,
            no_reply_address: "noreply.localhost".to_string(),
            reverse_proxy: ReverseProxyConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

/// Reverse proxy authentication.
///
/// A trusted proxy in front of the forge authenticates the user and passes
/// the username in a header.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReverseProxyConfig {
    pub enabled: bool,
    pub user_header: String,
    pub email_header: String,
    pub full_name_header: String,
    /// Create unknown users on first sight.
    pub auto_register: bool,
}

impl Default for ReverseProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            user_header: "X-WEBAUTH-USER".to_string(),
            email_header: "X-WEBAUTH-EMAIL".to_string(),
            full_name_header: "X-WEBAUTH-FULLNAME".to_string(),
            auto_register: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read.
    #[error("Failed to load configuration: {0}")]
    Load(String),
}

impl AuthConfig {
    /// Loads configuration from an optional file, then `FORGE_AUTH__*`
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source cannot be parsed, or a
    /// validation error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("FORGE_AUTH")
                .prefix_separator("__")
                .separator("__"),
        );

        let loaded: Self = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - The remember duration is zero
    /// - The remember cookie name or no-reply address is empty
    /// - Reverse proxy auth is enabled without a user header
    /// - The session configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remember_duration.is_zero() {
            return Err(ConfigError::InvalidValue(
                "remember_duration must be greater than 0".to_string(),
            ));
        }
        if self.remember_cookie_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "remember_cookie_name cannot be empty".to_string(),
            ));
        }
        if self.no_reply_address.trim().is_empty() {
            return Err(ConfigError::Missing("no_reply_address".to_string()));
        }
        if self.reverse_proxy.enabled && self.reverse_proxy.user_header.trim().is_empty() {
            return Err(ConfigError::Missing("reverse_proxy.user_header".to_string()));
        }
        self.session
            .validate()
            .map_err(|e| ConfigError::InvalidValue(format!("session: {e}")))
    }

    #[must_use]
    pub fn with_remember_duration(mut self, duration: Duration) -> Self {
        self.remember_duration = duration;
        self
    }

    #[must_use]
    pub fn with_reverse_proxy(mut self, reverse_proxy: ReverseProxyConfig) -> Self {
        self.reverse_proxy = reverse_proxy;
        self
    }

    #[must_use]
    pub fn with_basic_auth(mut self, enabled: bool) -> Self {
        self.basic_auth_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_lfs_server(mut self, enabled: bool) -> Self {
        self.lfs_server_enabled = enabled;
        self
    }
}
