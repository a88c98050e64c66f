//! The explicit dependency bundle threaded through authentication.
//!
//! Everything an authenticator, sign-in flow or auth method needs (storage,
//! configuration, external service clients) lives on one [`AuthServices`]
//! value constructed at startup and passed by reference.

use std::sync::Arc;

use crate::config::AuthConfig;
use crate::source::oauth2::{HttpTokenRefresher, TokenRefresher};
use crate::source::pam::{PamBackend, UnsupportedPam};
use crate::source::smtp::{LettreDialer, SmtpDialer};
use crate::storage::{
    AccessTokenStorage, AuthTokenStorage, EmailAddressStorage, ExternalLoginStorage,
    MemoryAuthStorage, SourceStorage, UserStorage, WebAuthnCredentialStorage,
};

/// Storage, configuration and external clients used by authentication.
#[derive(Clone)]
pub struct AuthServices {
    pub config: Arc<AuthConfig>,
    pub users: Arc<dyn UserStorage>,
    pub emails: Arc<dyn EmailAddressStorage>,
    pub sources: Arc<dyn SourceStorage>,
    pub auth_tokens: Arc<dyn AuthTokenStorage>,
    pub access_tokens: Arc<dyn AccessTokenStorage>,
    pub external_logins: Arc<dyn ExternalLoginStorage>,
    pub webauthn: Arc<dyn WebAuthnCredentialStorage>,
    pub smtp: Arc<dyn SmtpDialer>,
    pub pam: Arc<dyn PamBackend>,
    pub oauth2: Arc<dyn TokenRefresher>,
}

impl AuthServices {
    /// Builds services over one storage backend implementing every storage trait.
    #[must_use]
    pub fn from_storage<S>(config: AuthConfig, storage: Arc<S>) -> Self
    where
        S: UserStorage
            + EmailAddressStorage
            + SourceStorage
            + AuthTokenStorage
            + AccessTokenStorage
            + ExternalLoginStorage
            + WebAuthnCredentialStorage
            + 'static,
    {
        Self {
            config: Arc::new(config),
            users: storage.clone(),
            emails: storage.clone(),
            sources: storage.clone(),
            auth_tokens: storage.clone(),
            access_tokens: storage.clone(),
            external_logins: storage.clone(),
            webauthn: storage,
            smtp: Arc::new(LettreDialer),
            pam: Arc::new(UnsupportedPam),
            oauth2: Arc::new(HttpTokenRefresher::default()),
        }
    }

    /// Builds services over a fresh [`MemoryAuthStorage`].
    #[must_use]
    pub fn in_memory(config: AuthConfig) -> Self {
        Self::from_storage(config, Arc::new(MemoryAuthStorage::new()))
    }

    #[must_use]
    pub fn with_smtp_dialer(mut self, dialer: Arc<dyn SmtpDialer>) -> Self {
        self.smtp = dialer;
        self
    }

    #[must_use]
    pub fn with_pam_backend(mut self, backend: Arc<dyn PamBackend>) -> Self {
        self.pam = backend;
        self
    }

    #[must_use]
    pub fn with_token_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.oauth2 = refresher;
        self
    }
}
