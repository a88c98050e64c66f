//! PAM password authentication.
//!
//! The PAM conversation itself is delegated to a [`PamBackend`]. Builds
//! without system PAM bindings use [`UnsupportedPam`], which refuses every
//! attempt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::provision::{create_user, is_valid_email};
use crate::services::AuthServices;
use crate::source::{PasswordAuthenticator, Source, SourceType};
use crate::types::{NewUser, User};

/// PAM source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PamConfig {
    /// PAM service to authenticate against.
    pub service_name: String,
    /// Domain appended to the login when it is not an email address.
    pub email_domain: String,
}

/// Outcome of a failed PAM conversation.
#[derive(Debug, thiserror::Error)]
pub enum PamError {
    #[error("Authentication failure")]
    AuthenticationFailure,

    #[error("PAM is not supported by this build")]
    Unavailable,

    #[error("{0}")]
    Other(String),
}

/// Runs a PAM conversation.
#[async_trait]
pub trait PamBackend: Send + Sync {
    /// Authenticates against `service` and returns the login name PAM
    /// settled on.
    async fn authenticate(
        &self,
        service: &str,
        login: &str,
        password: &str,
    ) -> Result<String, PamError>;
}

/// [`PamBackend`] for builds without PAM.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedPam;

#[async_trait]
impl PamBackend for UnsupportedPam {
    async fn authenticate(
        &self,
        _service: &str,
        _login: &str,
        _password: &str,
    ) -> Result<String, PamError> {
        Err(PamError::Unavailable)
    }
}

impl PamConfig {
    /// Derives the shadow account's name and email from a PAM login.
    ///
    /// Active Directory style logins (`user@domain`) keep only the part
    /// before `@` as the name.
    fn shadow_identity(&self, pam_login: &str, no_reply_address: &str) -> (String, String) {
        let username = pam_login
            .split_once('@')
            .map_or(pam_login, |(local, _)| local)
            .to_string();

        let mut email = pam_login.to_string();
        if !is_valid_email(&email) {
            let domain = if self.email_domain.is_empty() {
                no_reply_address
            } else {
                &self.email_domain
            };
            email = format!("{username}@{domain}");
            if !is_valid_email(&email) {
                email = format!("{}@localhost", Uuid::new_v4());
            }
        }
        (username, email)
    }
}

#[async_trait]
impl PasswordAuthenticator for PamConfig {
    async fn authenticate(
        &self,
        services: &AuthServices,
        source: &Source,
        user: Option<User>,
        login: &str,
        password: &str,
    ) -> AuthResult<User> {
        let pam_login = match services
            .pam
            .authenticate(&self.service_name, login, password)
            .await
        {
            Ok(pam_login) => pam_login,
            Err(PamError::AuthenticationFailure) => return Err(AuthError::user_not_exist(login)),
            Err(err) => return Err(AuthError::external("pam", err.to_string())),
        };

        if let Some(user) = user {
            return Ok(user);
        }

        let (name, email) = self.shadow_identity(&pam_login, &services.config.no_reply_address);
        create_user(
            services,
            NewUser {
                name,
                email,
                password: Some(password.to_string()),
                login_type: SourceType::Pam,
                login_source: source.id,
                login_name: login.to_string(),
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
    }
}
