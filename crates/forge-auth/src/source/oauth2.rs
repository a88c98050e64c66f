//! OAuth2 sources and external token synchronization.
//!
//! Users who signed in through an OAuth2 provider keep the provider's access
//! and refresh tokens on their external login link. Synchronization refreshes
//! expired access tokens. A provider answering `invalid_grant` has revoked
//! the grant, so the stored tokens are cleared and the local account is
//! deactivated until the user signs in through the provider again.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::AuthResult;
use crate::error::AuthError;
use crate::services::AuthServices;
use crate::source::{Source, SynchronizableSource};
use crate::types::{ExternalLoginUser, now_unix};

/// OAuth2 source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2Config {
    /// Provider name, e.g. `github` or `openidConnect`.
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    /// Token endpoint. Sync is skipped when empty.
    pub token_url: String,
    pub profile_url: String,
    pub scopes: Vec<String>,
}

// =============================================================================
// Token Refresh
// =============================================================================

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Some providers rotate the refresh token, others omit it.
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    pub expires_in: Option<i64>,
}

/// Why a refresh failed.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The provider no longer honours the refresh token.
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),

    #[error("{0}")]
    Other(String),
}

/// Exchanges a refresh token at a provider's token endpoint.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        config: &OAuth2Config,
        refresh_token: &str,
    ) -> Result<RefreshedToken, RefreshError>;
}

/// [`TokenRefresher`] speaking the standard `refresh_token` grant over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpTokenRefresher {
    client: reqwest::Client,
}

impl HttpTokenRefresher {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(
        &self,
        config: &OAuth2Config,
        refresh_token: &str,
    ) -> Result<RefreshedToken, RefreshError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
        ];
        let response = self
            .client
            .post(&config.token_url)
            .header(ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| RefreshError::Other(format!("token request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body: TokenResponse = response
                .json()
                .await
                .map_err(|e| RefreshError::Other(format!("invalid token response: {e}")))?;
            return Ok(RefreshedToken {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
                expires_in: body.expires_in,
            });
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<TokenErrorResponse>(&body) {
            Ok(err) if err.error == "invalid_grant" => Err(RefreshError::InvalidGrant(
                err.error_description.unwrap_or(err.error),
            )),
            Ok(err) => Err(RefreshError::Other(format!(
                "token endpoint returned {status}: {}",
                err.error
            ))),
            Err(_) => Err(RefreshError::Other(format!(
                "token endpoint returned {status}"
            ))),
        }
    }
}

// =============================================================================
// Sync
// =============================================================================

impl OAuth2Config {
    async fn refresh_link(
        &self,
        services: &AuthServices,
        source: &Source,
        mut link: ExternalLoginUser,
    ) -> AuthResult<()> {
        tracing::trace!(source = %source.name, user_id = link.user_id, "refreshing oauth2 token");

        match services.oauth2.refresh(self, &link.refresh_token).await {
            Ok(token) => {
                link.access_token = token.access_token;
                link.expires_at = token.expires_in.map(|secs| now_unix() + secs);
                if let Some(refresh) = token.refresh_token.filter(|r| !r.is_empty()) {
                    link.refresh_token = refresh;
                }
                services.external_logins.update_tokens(&link).await
            }
            Err(RefreshError::InvalidGrant(reason)) => {
                tracing::info!(
                    source = %source.name,
                    user_id = link.user_id,
                    reason = %reason,
                    "disabling user after revoked oauth2 grant"
                );
                if let Some(user) = services.users.find_by_id(link.user_id).await? {
                    if user.is_individual() {
                        services.users.set_active(user.id, false).await?;
                    }
                }
                link.access_token.clear();
                link.refresh_token.clear();
                link.expires_at = None;
                services.external_logins.update_tokens(&link).await
            }
            Err(RefreshError::Other(message)) => Err(AuthError::external("oauth2", message)),
        }
    }
}

#[async_trait]
impl SynchronizableSource for OAuth2Config {
    async fn sync(
        &self,
        services: &AuthServices,
        source: &Source,
        cancel: &CancellationToken,
        _update_existing: bool,
    ) -> AuthResult<()> {
        if self.token_url.is_empty() {
            tracing::trace!(source = %source.name, "provider has no token endpoint, skipping sync");
            return Ok(());
        }

        let now = now_unix();
        let expired = services
            .external_logins
            .list_by_source(source.id)
            .await?
            .into_iter()
            .filter(|link| !link.refresh_token.is_empty())
            .filter(|link| link.expires_at.is_none_or(|at| at < now));

        for link in expired {
            if cancel.is_cancelled() {
                return Err(AuthError::Cancelled {
                    message: format!("during sync of {}", source.name),
                });
            }
            self.refresh_link(services, source, link).await?;
        }
        Ok(())
    }
}
