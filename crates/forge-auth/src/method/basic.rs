//! HTTP basic authentication.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use forge_session::RawStore;

use crate::AuthResult;
use crate::error::AuthError;
use crate::method::{AuthPathDetector, Method, RequestAuth};
use crate::services::AuthServices;
use crate::signin::user_sign_in;
use crate::token::get_access_token_by_sha;
use crate::types::User;

/// Password placeholder git clients send along a token used as username.
const TOKEN_PASSWORD_PLACEHOLDER: &str = "x-oauth-basic";

/// Parses an `Authorization: Basic` header value into user and password.
fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, payload) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Authenticates `Authorization: Basic` credentials.
///
/// Either half may carry a personal access token: the username when the
/// password is empty or `x-oauth-basic`, the password otherwise. Failing
/// that, the pair is checked with [`user_sign_in`] if password basic auth
/// is enabled.
pub struct BasicMethod {
    services: AuthServices,
}

impl BasicMethod {
    #[must_use]
    pub fn new(services: AuthServices) -> Self {
        Self { services }
    }

    async fn user_from_token(
        &self,
        candidate: &str,
        request: &mut RequestAuth,
    ) -> AuthResult<Option<User>> {
        let token = match get_access_token_by_sha(&self.services, candidate).await {
            Ok(token) => token,
            Err(AuthError::AccessTokenNotExist) => return Ok(None),
            Err(err) => return Err(err),
        };
        let user = self.services.users.find_by_id(token.uid).await?;
        if user.is_some() {
            request.scope = Some(token.scope);
        }
        Ok(user)
    }
}

#[async_trait]
impl Method for BasicMethod {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn verify(
        &self,
        parts: &Parts,
        _session: Option<&dyn RawStore>,
        request: &mut RequestAuth,
    ) -> AuthResult<Option<User>> {
        let detector = AuthPathDetector::new(parts, self.services.config.lfs_server_enabled);
        if !detector.is_api_path()
            && !detector.is_container_path()
            && !detector.is_attachment_download()
            && !detector.is_archive_path()
            && !detector.is_git_raw_or_attach_or_lfs_path()
        {
            return Ok(None);
        }

        let Some((username, password)) = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_basic)
        else {
            return Ok(None);
        };

        let username_is_token = password.is_empty() || password == TOKEN_PASSWORD_PLACEHOLDER;
        let candidate = if username_is_token { &username } else { &password };
        if let Some(user) = self.user_from_token(candidate, request).await? {
            return Ok(Some(user));
        }

        if !self.services.config.basic_auth_enabled {
            return Ok(None);
        }

        tracing::trace!(login = %username, "basic auth sign-in attempt");
        let (user, _source) = user_sign_in(&self.services, &username, &password)
            .await
            .inspect_err(|e| {
                if !matches!(e, AuthError::UserNotExist { .. }) {
                    tracing::error!(login = %username, error = %e, "basic auth sign-in failed");
                }
            })?;

        if !self.services.webauthn.list_by_user(user.id).await?.is_empty() {
            return Err(AuthError::WebAuthnEnrolled { uid: user.id });
        }
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::provision::create_user;
    use crate::token::create_access_token;
    use crate::types::{NewUser, WebAuthnCredential};
    use axum::http::Request;

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    fn parts(uri: &str, authorization: &str) -> Parts {
        Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, authorization)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    async fn setup(config: AuthConfig) -> (AuthServices, User) {
        let services = AuthServices::in_memory(config);
        let user = create_user(
            &services,
            NewUser {
                name: "leo".into(),
                email: "leo@example.com".into(),
                password: Some("secret".into()),
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
        .unwrap();
        (services, user)
    }

    #[test]
    fn test_parse_basic() {
        assert_eq!(
            parse_basic(&basic("leo", "p:w")),
            Some(("leo".to_string(), "p:w".to_string()))
        );
        assert_eq!(parse_basic("Bearer abc"), None);
        assert_eq!(parse_basic("Basic !!!"), None);
    }

    #[tokio::test]
    async fn test_password_sign_in() {
        let (services, user) = setup(AuthConfig::default()).await;
        let method = BasicMethod::new(services);

        let found = method
            .verify(&parts("/api/v1/user", &basic("leo", "secret")), None, &mut RequestAuth::default())
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, user.id);

        let err = method
            .verify(&parts("/api/v1/user", &basic("leo", "wrong")), None, &mut RequestAuth::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserPasswordInvalid { .. }));

        let web = method
            .verify(&parts("/user/settings", &basic("leo", "secret")), None, &mut RequestAuth::default())
            .await
            .unwrap();
        assert!(web.is_none());
    }

    #[tokio::test]
    async fn test_token_in_either_half() {
        let (services, user) = setup(AuthConfig::default().with_basic_auth(false)).await;
        let (_, token) = create_access_token(&services, user.id, "git", "write:repository")
            .await
            .unwrap();
        let method = BasicMethod::new(services);

        for header in [
            basic(&token, ""),
            basic(&token, TOKEN_PASSWORD_PLACEHOLDER),
            basic("leo", &token),
        ] {
            let mut request = RequestAuth::default();
            let found = method
                .verify(&parts("/leo/repo.git/info/refs", &header), None, &mut request)
                .await
                .unwrap();
            assert_eq!(found.unwrap().id, user.id);
            assert_eq!(request.scope.unwrap().as_str(), "write:repository");
        }

        let declined = method
            .verify(&parts("/api/v1/user", &basic("leo", "secret")), None, &mut RequestAuth::default())
            .await
            .unwrap();
        assert!(declined.is_none());
    }

    #[tokio::test]
    async fn test_webauthn_enrollment_blocks_password() {
        let (services, user) = setup(AuthConfig::default()).await;
        services
            .webauthn
            .create(&WebAuthnCredential {
                id: 0,
                user_id: user.id,
                name: "key".into(),
                lower_name: "key".into(),
                credential_id: vec![9],
                public_key: vec![],
                attestation_type: "none".into(),
                aaguid: vec![],
                sign_count: 0,
                clone_warning: false,
                created_unix: 0,
                updated_unix: 0,
            })
            .await
            .unwrap();

        let err = BasicMethod::new(services)
            .verify(&parts("/api/v1/user", &basic("leo", "secret")), None, &mut RequestAuth::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WebAuthnEnrolled { .. }));
    }
}
