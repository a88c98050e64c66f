//! # forge-auth
//!
//! Authentication for the forge.
//!
//! This crate provides:
//! - Remember-me auth tokens and personal access tokens with scopes
//! - A registry of authentication sources (local database, SMTP, PAM,
//!   OAuth2, LDAP, SSPI) and password sign-in across them
//! - An ordered chain of request authentication methods
//! - Post sign-in session handling on top of `forge-session`
//! - WebAuthn credential bookkeeping
//! - axum middleware and error responses
//!
//! ## Modules
//!
//! - [`config`] - Authentication configuration
//! - [`token`] - Auth token codec, access tokens and scopes
//! - [`source`] - Authentication sources and their authenticators
//! - [`signin`] - Password sign-in and session handling
//! - [`sync`] - Periodic synchronization of external sources
//! - [`method`] - Request authentication methods and the method group
//! - [`middleware`] - axum middleware and `IntoResponse` for errors
//! - [`storage`] - Storage traits and the in-memory backend
//! - [`services`] - The dependency bundle passed to every operation

pub mod config;
pub mod error;
pub mod method;
pub mod middleware;
pub mod password;
pub mod provision;
pub mod services;
pub mod signin;
pub mod source;
pub mod storage;
pub mod sync;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError, ReverseProxyConfig};
pub use error::AuthError;
pub use method::{
    AccessTokenMethod, AuthTokenMethod, BasicMethod, Group, Method, RequestAuth,
    ReverseProxyMethod, SessionMethod,
};
pub use middleware::{AuthLayerState, Session, SignedInUser, authenticate};
pub use services::AuthServices;
pub use signin::{handle_sign_in, user_sign_in};
pub use source::{Source, SourceConfig, SourceType};
pub use sync::sync_external_users;
pub use token::AccessTokenScope;
pub use types::{AccessToken, AuthToken, EmailAddress, User, WebAuthnCredential};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
