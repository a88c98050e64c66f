//! Personal access token storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::AccessToken;

/// Storage for personal access tokens.
#[async_trait]
pub trait AccessTokenStorage: Send + Sync {
    /// Inserts a token; the storage assigns `id`.
    async fn create(&self, token: &AccessToken) -> AuthResult<AccessToken>;

    /// Returns every token whose plaintext ends with `last_eight`.
    async fn find_by_last_eight(&self, last_eight: &str) -> AuthResult<Vec<AccessToken>>;

    /// Records use of a token.
    async fn touch(&self, id: i64, now: i64) -> AuthResult<()>;

    /// Deletes a token owned by `uid`. Returns `false` if nothing matched.
    async fn delete(&self, id: i64, uid: i64) -> AuthResult<bool>;
}
