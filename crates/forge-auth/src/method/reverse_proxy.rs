//! Trusted reverse proxy header authentication.

use async_trait::async_trait;
use axum::http::request::Parts;
use forge_session::RawStore;

use crate::AuthResult;
use crate::method::{Method, RequestAuth};
use crate::provision::{create_user, is_valid_email};
use crate::services::AuthServices;
use crate::source::SourceType;
use crate::types::{NewUser, User};

/// Trusts the username a front proxy put in the configured header.
///
/// Unknown users are created when auto-registration is on.
pub struct ReverseProxyMethod {
    services: AuthServices,
}

impl ReverseProxyMethod {
    #[must_use]
    pub fn new(services: AuthServices) -> Self {
        Self { services }
    }

    fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
        if name.is_empty() {
            return None;
        }
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    async fn register(&self, parts: &Parts, username: &str) -> AuthResult<User> {
        let proxy = &self.services.config.reverse_proxy;
        let email = Self::header(parts, &proxy.email_header)
            .filter(|e| is_valid_email(e))
            .map_or_else(
                || format!("{username}@{}", self.services.config.no_reply_address),
                str::to_string,
            );
        let full_name = Self::header(parts, &proxy.full_name_header)
            .unwrap_or_default()
            .to_string();

        create_user(
            &self.services,
            NewUser {
                name: username.to_string(),
                full_name,
                email,
                login_type: SourceType::Plain,
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
    }
}

#[async_trait]
impl Method for ReverseProxyMethod {
    fn name(&self) -> &'static str {
        "reverse_proxy"
    }

    async fn verify(
        &self,
        parts: &Parts,
        _session: Option<&dyn RawStore>,
        _request: &mut RequestAuth,
    ) -> AuthResult<Option<User>> {
        let proxy = &self.services.config.reverse_proxy;
        if !proxy.enabled {
            return Ok(None);
        }
        let Some(username) = Self::header(parts, &proxy.user_header) else {
            return Ok(None);
        };

        if let Some(user) = self
            .services
            .users
            .find_by_lower_name(&username.to_lowercase())
            .await?
        {
            return Ok(Some(user));
        }
        if !proxy.auto_register {
            tracing::debug!(username, "reverse proxy user not found");
            return Ok(None);
        }

        let user = self.register(parts, username).await?;
        tracing::info!(uid = user.id, name = %user.name, "auto-registered reverse proxy user");
        Ok(Some(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, ReverseProxyConfig};
    use axum::http::Request;

    fn services(auto_register: bool) -> AuthServices {
        AuthServices::in_memory(AuthConfig::default().with_reverse_proxy(ReverseProxyConfig {
            enabled: true,
            auto_register,
            ..ReverseProxyConfig::default()
        }))
    }

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_disabled_or_missing_header_declines() {
        let disabled = ReverseProxyMethod::new(AuthServices::in_memory(AuthConfig::default()));
        let found = disabled
            .verify(&parts(&[("X-WEBAUTH-USER", "mia")]), None, &mut RequestAuth::default())
            .await
            .unwrap();
        assert!(found.is_none());

        let enabled = ReverseProxyMethod::new(services(true));
        let found = enabled
            .verify(&parts(&[]), None, &mut RequestAuth::default())
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_unknown_user_without_auto_register() {
        let services = services(false);
        let method = ReverseProxyMethod::new(services.clone());
        let found = method
            .verify(&parts(&[("X-WEBAUTH-USER", "mia")]), None, &mut RequestAuth::default())
            .await
            .unwrap();
        assert!(found.is_none());
        assert!(services.users.find_by_lower_name("mia").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auto_register_then_lookup() {
        let services = services(true);
        let method = ReverseProxyMethod::new(services.clone());

        let created = method
            .verify(
                &parts(&[("X-WEBAUTH-USER", "Mia"), ("X-WEBAUTH-FULLNAME", "Mia Wong")]),
                None,
                &mut RequestAuth::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.email, "Mia@noreply.localhost");
        assert_eq!(created.full_name, "Mia Wong");
        assert!(created.is_active);

        let again = method
            .verify(&parts(&[("X-WEBAUTH-USER", "mia")]), None, &mut RequestAuth::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.id, created.id);
    }

    #[tokio::test]
    async fn test_auto_register_uses_email_header() {
        let method = ReverseProxyMethod::new(services(true));
        let created = method
            .verify(
                &parts(&[("X-WEBAUTH-USER", "noah"), ("X-WEBAUTH-EMAIL", "noah@corp.example")]),
                None,
                &mut RequestAuth::default(),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.email, "noah@corp.example");
    }
}
