//! Remember-me cookie authentication.

use async_trait::async_trait;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use forge_session::RawStore;

use crate::AuthResult;
use crate::error::AuthError;
use crate::method::{Method, RequestAuth};
use crate::services::AuthServices;
use crate::token::{check_auth_token, regenerate_auth_token};
use crate::types::User;

/// Signs a user in from the `<id>:<secret>` remember-me cookie.
///
/// A used token is rotated; the new value is left on
/// [`RequestAuth::remember_token`] for the response.
pub struct AuthTokenMethod {
    services: AuthServices,
}

impl AuthTokenMethod {
    #[must_use]
    pub fn new(services: AuthServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Method for AuthTokenMethod {
    fn name(&self) -> &'static str {
        "auth_token"
    }

    async fn verify(
        &self,
        parts: &Parts,
        _session: Option<&dyn RawStore>,
        request: &mut RequestAuth,
    ) -> AuthResult<Option<User>> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = jar.get(&self.services.config.remember_cookie_name) else {
            return Ok(None);
        };

        let token = match check_auth_token(&self.services, cookie.value()).await {
            Ok(Some(token)) => token,
            Ok(None) | Err(AuthError::AuthTokenInvalidFormat | AuthError::AuthTokenExpired) => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let Some(user) = self.services.users.find_by_id(token.user_id).await? else {
            tracing::debug!(user_id = token.user_id, "remember-me token of a missing user");
            return Ok(None);
        };

        let (_, renewed) = regenerate_auth_token(&self.services, &token).await?;
        request.remember_token = Some(renewed);
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::provision::create_user;
    use crate::token::create_auth_token;
    use crate::types::NewUser;
    use axum::http::{Request, header::COOKIE};

    fn parts(cookie: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(()).unwrap().into_parts().0
    }

    async fn setup() -> (AuthServices, User) {
        let services = AuthServices::in_memory(AuthConfig::default());
        let user = create_user(
            &services,
            NewUser {
                name: "jack".into(),
                email: "jack@example.com".into(),
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
        .unwrap();
        (services, user)
    }

    #[tokio::test]
    async fn test_valid_cookie_rotates_token() {
        let (services, user) = setup().await;
        let (_, plaintext) = create_auth_token(&services, user.id).await.unwrap();
        let method = AuthTokenMethod::new(services.clone());

        let mut request = RequestAuth::default();
        let cookie = format!("forge_incredible={plaintext}");
        let found = method
            .verify(&parts(Some(&cookie)), None, &mut request)
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, user.id);

        let renewed = request.remember_token.unwrap();
        assert_ne!(renewed, plaintext);
        assert!(check_auth_token(&services, &renewed).await.unwrap().is_some());
        assert!(check_auth_token(&services, &plaintext).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_malformed_and_unknown_cookies_decline() {
        let (services, _) = setup().await;
        let method = AuthTokenMethod::new(services);
        let mut request = RequestAuth::default();

        for cookie in [None, Some("forge_incredible=garbage"), Some("forge_incredible=abc:def")] {
            let found = method.verify(&parts(cookie), None, &mut request).await.unwrap();
            assert!(found.is_none(), "cookie: {cookie:?}");
        }
    }

    #[tokio::test]
    async fn test_wrong_secret_is_an_error() {
        let (services, user) = setup().await;
        let (token, _) = create_auth_token(&services, user.id).await.unwrap();
        let method = AuthTokenMethod::new(services);

        let cookie = format!("forge_incredible={}:stolen", token.id);
        let err = method
            .verify(&parts(Some(&cookie)), None, &mut RequestAuth::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::AuthTokenInvalidHash));
    }
}
