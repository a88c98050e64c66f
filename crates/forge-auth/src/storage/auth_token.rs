//! Auth token storage trait.
//!
//! # Implementation Notes
//!
//! - Never store the plaintext secret, only `token_hash`
//! - `update` must replace hash and expiry in one atomic write so a
//!   concurrent lookup sees either the old or the new pair

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::AuthToken;

/// Storage for long-lived auth tokens.
#[async_trait]
pub trait AuthTokenStorage: Send + Sync {
    /// Inserts a new token.
    async fn insert(&self, token: &AuthToken) -> AuthResult<()>;

    /// Finds a token by its public id.
    async fn find_by_id(&self, id: &str) -> AuthResult<Option<AuthToken>>;

    /// Overwrites hash and expiry of the token with `token.id`.
    ///
    /// Returns `false` if no token has this id.
    async fn update(&self, token: &AuthToken) -> AuthResult<bool>;

    async fn delete_by_id(&self, id: &str) -> AuthResult<()>;

    async fn delete_by_user_id(&self, user_id: i64) -> AuthResult<u64>;

    /// Deletes tokens that expired at or before `now`.
    async fn delete_expired(&self, now: i64) -> AuthResult<u64>;
}
