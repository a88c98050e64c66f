//! SMTP password authentication.
//!
//! A login is accepted when the configured SMTP server accepts the
//! credentials in an AUTH exchange. First-time logins get a local shadow
//! account named after the local part of the address.

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::provision::create_user;
use crate::services::AuthServices;
use crate::source::{PasswordAuthenticator, Source, SourceType};
use crate::types::{NewUser, User};

/// Auth mechanisms an SMTP source may be configured with.
pub const SMTP_AUTH_TYPES: [&str; 3] = ["PLAIN", "LOGIN", "CRAM-MD5"];

/// SMTP AUTH mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpMechanism {
    Plain,
    Login,
    CramMd5,
}

impl SmtpMechanism {
    /// Parses a configured mechanism name, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::External` for anything outside [`SMTP_AUTH_TYPES`].
    pub fn parse(name: &str) -> AuthResult<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "LOGIN" => Ok(Self::Login),
            "CRAM-MD5" => Ok(Self::CramMd5),
            other => Err(AuthError::external(
                "smtp",
                format!("unsupported SMTP auth type: {other}"),
            )),
        }
    }
}

/// SMTP source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// One of [`SMTP_AUTH_TYPES`].
    pub auth: String,
    pub host: String,
    pub port: u16,
    /// Comma-separated domains allowed to log in. Empty allows any.
    pub allowed_domains: String,
    /// Connect with implicit TLS instead of STARTTLS.
    pub force_smtps: bool,
    pub skip_verify: bool,
    /// Name sent in EHLO. Empty uses the local hostname.
    pub helo_hostname: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            auth: "PLAIN".to_string(),
            host: String::new(),
            port: 587,
            allowed_domains: String::new(),
            force_smtps: false,
            skip_verify: false,
            helo_hostname: String::new(),
        }
    }
}

impl SmtpConfig {
    /// Returns `true` if `login` belongs to an allowed domain.
    #[must_use]
    pub fn is_allowed_login(&self, login: &str) -> bool {
        if self.allowed_domains.trim().is_empty() {
            return true;
        }
        let Some((_, domain)) = login.split_once('@') else {
            return false;
        };
        self.allowed_domains
            .split(',')
            .map(str::trim)
            .any(|allowed| allowed.eq_ignore_ascii_case(domain))
    }
}

// =============================================================================
// Dialer
// =============================================================================

/// Outcome of a failed SMTP AUTH attempt.
#[derive(Debug, thiserror::Error)]
pub enum SmtpAuthError {
    /// The server rejected the credentials.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The server does not offer AUTH.
    #[error("server does not support AUTH")]
    NoAuth,

    /// The dialer cannot speak the configured mechanism.
    #[error("unsupported SMTP auth type: {0}")]
    UnsupportedMechanism(&'static str),

    /// Connection or protocol failure.
    #[error("{0}")]
    Transport(String),
}

/// Performs an SMTP AUTH exchange.
#[async_trait]
pub trait SmtpDialer: Send + Sync {
    async fn authenticate(
        &self,
        config: &SmtpConfig,
        mechanism: SmtpMechanism,
        login: &str,
        password: &str,
    ) -> Result<(), SmtpAuthError>;
}

/// [`SmtpDialer`] built on lettre.
///
/// Speaks PLAIN and LOGIN. CRAM-MD5 is reported as unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct LettreDialer;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
impl SmtpDialer for LettreDialer {
    async fn authenticate(
        &self,
        config: &SmtpConfig,
        mechanism: SmtpMechanism,
        login: &str,
        password: &str,
    ) -> Result<(), SmtpAuthError> {
        let mechanism = match mechanism {
            SmtpMechanism::Plain => Mechanism::Plain,
            SmtpMechanism::Login => Mechanism::Login,
            SmtpMechanism::CramMd5 => return Err(SmtpAuthError::UnsupportedMechanism("CRAM-MD5")),
        };

        let tls_params = TlsParameters::builder(config.host.clone())
            .dangerous_accept_invalid_certs(config.skip_verify)
            .build()
            .map_err(|e| SmtpAuthError::Transport(e.to_string()))?;
        let tls = if config.force_smtps {
            Tls::Wrapper(tls_params)
        } else {
            Tls::Opportunistic(tls_params)
        };

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(tls)
            .timeout(Some(SMTP_TIMEOUT))
            .credentials(Credentials::new(login.to_string(), password.to_string()))
            .authentication(vec![mechanism]);
        if !config.helo_hostname.is_empty() {
            builder = builder.hello_name(ClientId::Domain(config.helo_hostname.clone()));
        }

        match builder.build::<Tokio1Executor>().test_connection().await {
            Ok(_) => Ok(()),
            Err(err) => Err(classify_smtp_error(&err)),
        }
    }
}

fn classify_smtp_error(err: &lettre::transport::smtp::Error) -> SmtpAuthError {
    let message = err.to_string();
    let code = err.status().map(|code| code.to_string());

    if matches!(code.as_deref(), Some("535" | "534"))
        || message.contains("Username and Password not accepted")
        || message.contains("Application-specific password required")
    {
        return SmtpAuthError::Rejected(message);
    }
    if message.contains("No compatible authentication mechanism") {
        return SmtpAuthError::NoAuth;
    }
    SmtpAuthError::Transport(message)
}

// =============================================================================
// Authenticator
// =============================================================================

#[async_trait]
impl PasswordAuthenticator for SmtpConfig {
    async fn authenticate(
        &self,
        services: &AuthServices,
        source: &Source,
        user: Option<User>,
        login: &str,
        password: &str,
    ) -> AuthResult<User> {
        if !self.is_allowed_login(login) {
            return Err(AuthError::user_not_exist(login));
        }

        let mechanism = SmtpMechanism::parse(&self.auth)?;
        match services
            .smtp
            .authenticate(self, mechanism, login, password)
            .await
        {
            Ok(()) => {}
            Err(SmtpAuthError::Rejected(reason)) => {
                tracing::debug!(source = %source.name, reason = %reason, "smtp rejected credentials");
                return Err(AuthError::user_not_exist(login));
            }
            Err(SmtpAuthError::NoAuth) => return Err(AuthError::UnsupportedLoginType),
            Err(err) => return Err(AuthError::external("smtp", err.to_string())),
        }

        if let Some(user) = user {
            return Ok(user);
        }

        let name = login
            .split_once('@')
            .map_or(login, |(local, _)| local)
            .to_lowercase();
        create_user(
            services,
            NewUser {
                name,
                email: login.to_string(),
                password: Some(password.to_string()),
                login_type: SourceType::Smtp,
                login_source: source.id,
                login_name: login.to_string(),
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
    }
}
