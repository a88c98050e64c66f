//! Request authentication methods.
//!
//! A [`Method`] looks at one incoming request and either identifies a user,
//! declines (`Ok(None)`), or fails. A [`Group`] tries its methods in
//! registration order:
//!
//! - the first method returning a user wins and stops the chain
//! - otherwise the error of the first failing method is returned
//! - later methods still run after an earlier one failed, since several
//!   methods may look at the same header and only one of them owns it
//!
//! The winning method's name is recorded on [`RequestAuth`] unless an
//! earlier resolution in the same request already did.

pub mod access_token;
pub mod auth_token;
pub mod basic;
pub mod path;
pub mod reverse_proxy;
pub mod session;

use async_trait::async_trait;
use axum::http::request::Parts;
use forge_session::RawStore;

use crate::AuthResult;
use crate::error::AuthError;
use crate::token::scope::AccessTokenScope;
use crate::types::User;

pub use access_token::AccessTokenMethod;
pub use auth_token::AuthTokenMethod;
pub use basic::BasicMethod;
pub use path::AuthPathDetector;
pub use reverse_proxy::ReverseProxyMethod;
pub use session::SessionMethod;

/// Request-scoped authentication facts shared between methods and handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAuth {
    /// Name of the method that identified the user.
    pub method: Option<&'static str>,
    /// Scope of the access token used, if any.
    pub scope: Option<AccessTokenScope>,
    /// Rotated `<id>:<secret>` remember-me value to send back to the client.
    pub remember_token: Option<String>,
}

/// One way of identifying the user behind a request.
#[async_trait]
pub trait Method: Send + Sync {
    fn name(&self) -> &'static str;

    /// Identifies the request's user.
    ///
    /// `Ok(None)` means the method does not apply to this request.
    async fn verify(
        &self,
        parts: &Parts,
        session: Option<&dyn RawStore>,
        request: &mut RequestAuth,
    ) -> AuthResult<Option<User>>;
}

/// Running state of a [`Group`] evaluation.
#[derive(Debug, Default)]
pub struct Verification {
    pub user: Option<User>,
    pub claimed_by: Option<&'static str>,
    pub error: Option<AuthError>,
}

impl Verification {
    fn record(&mut self, method: &'static str, outcome: AuthResult<Option<User>>) {
        match outcome {
            Ok(Some(user)) => {
                self.user = Some(user);
                self.claimed_by = Some(method);
            }
            Ok(None) => {}
            Err(err) if self.error.is_none() => {
                tracing::debug!(method, error = %err, "auth method failed");
                self.error = Some(err);
            }
            Err(err) => {
                tracing::trace!(method, error = %err, "auth method failed after an earlier failure");
            }
        }
    }

    fn into_result(self, request: &mut RequestAuth) -> AuthResult<Option<User>> {
        if let Some(user) = self.user {
            if request.method.is_none() {
                request.method = self.claimed_by;
            }
            return Ok(Some(user));
        }
        match self.error {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }
}

/// Ordered chain of methods.
#[derive(Default)]
pub struct Group {
    methods: Vec<Box<dyn Method>>,
}

impl Group {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a method to the chain.
    #[must_use]
    pub fn with(mut self, method: impl Method + 'static) -> Self {
        self.methods.push(Box::new(method));
        self
    }

    pub fn add(&mut self, method: Box<dyn Method>) {
        self.methods.push(method);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[async_trait]
impl Method for Group {
    fn name(&self) -> &'static str {
        "group"
    }

    async fn verify(
        &self,
        parts: &Parts,
        session: Option<&dyn RawStore>,
        request: &mut RequestAuth,
    ) -> AuthResult<Option<User>> {
        let mut verification = Verification::default();
        for method in &self.methods {
            let outcome = method.verify(parts, session, request).await;
            verification.record(method.name(), outcome);
            if verification.user.is_some() {
                break;
            }
        }
        verification.into_result(request)
    }
}
