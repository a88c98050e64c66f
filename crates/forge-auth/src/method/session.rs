//! Session cookie authentication.

use async_trait::async_trait;
use axum::http::request::Parts;
use forge_session::RawStore;

use crate::AuthResult;
use crate::method::{Method, RequestAuth};
use crate::services::AuthServices;
use crate::signin::SESSION_KEY_UID;
use crate::types::User;

/// Identifies the user stored under `uid` in the request's session.
pub struct SessionMethod {
    services: AuthServices,
}

impl SessionMethod {
    #[must_use]
    pub fn new(services: AuthServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl Method for SessionMethod {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn verify(
        &self,
        _parts: &Parts,
        session: Option<&dyn RawStore>,
        _request: &mut RequestAuth,
    ) -> AuthResult<Option<User>> {
        let Some(uid) = session
            .and_then(|s| s.get(SESSION_KEY_UID))
            .and_then(|v| v.as_int())
        else {
            return Ok(None);
        };

        let user = self.services.users.find_by_id(uid).await?;
        if user.is_none() {
            tracing::debug!(uid, "session refers to a missing user");
        }
        Ok(user)
    }
}
