//! Personal access token authentication.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use forge_session::RawStore;

use crate::AuthResult;
use crate::error::AuthError;
use crate::method::{AuthPathDetector, Method, RequestAuth};
use crate::services::AuthServices;
use crate::token::get_access_token_by_sha;
use crate::types::User;

/// Extracts a token from `?token=`, `?access_token=` or an
/// `Authorization: Bearer|token <value>` header.
pub(crate) fn parse_token(parts: &Parts) -> Option<String> {
    if let Some(query) = parts.uri.query() {
        let from_query = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, value)| (key == "token" || key == "access_token") && !value.is_empty())
            .map(|(_, value)| value.into_owned());
        if from_query.is_some() {
            return from_query;
        }
    }

    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    if (scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token"))
        && !token.is_empty()
    {
        return Some(token.to_string());
    }
    None
}

/// Identifies the owner of a personal access token.
///
/// Only applies to API, attachment, archive, git and token introspection
/// paths. Unknown tokens are left for later methods.
pub struct AccessTokenMethod {
    services: AuthServices,
}

impl AccessTokenMethod {
    #[must_use]
    pub fn new(services: AuthServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Method for AccessTokenMethod {
    fn name(&self) -> &'static str {
        "access_token"
    }

    async fn verify(
        &self,
        parts: &Parts,
        _session: Option<&dyn RawStore>,
        request: &mut RequestAuth,
    ) -> AuthResult<Option<User>> {
        let detector = AuthPathDetector::new(parts, self.services.config.lfs_server_enabled);
        if !detector.is_api_path()
            && !detector.is_attachment_download()
            && !detector.is_authenticated_token_request()
            && !detector.is_git_raw_or_attach_path()
            && !detector.is_archive_path()
        {
            return Ok(None);
        }
        let Some(presented) = parse_token(parts) else {
            return Ok(None);
        };

        let token = match get_access_token_by_sha(&self.services, &presented).await {
            Ok(token) => token,
            Err(AuthError::AccessTokenNotExist) => return Ok(None),
            Err(err) => return Err(err),
        };
        let Some(user) = self.services.users.find_by_id(token.uid).await? else {
            return Ok(None);
        };

        tracing::trace!(uid = user.id, token_id = token.id, "authenticated by access token");
        request.scope = Some(token.scope);
        Ok(Some(user))
    }
}
