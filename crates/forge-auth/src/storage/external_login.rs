//! External login link storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::ExternalLoginUser;

/// Storage for links between users and external identities.
#[async_trait]
pub trait ExternalLoginStorage: Send + Sync {
    /// Inserts or replaces a link keyed by `(external_id, login_source_id)`.
    async fn upsert(&self, link: &ExternalLoginUser) -> AuthResult<()>;

    async fn list_by_source(&self, source_id: i64) -> AuthResult<Vec<ExternalLoginUser>>;

    /// Stores refreshed tokens for an existing link.
    async fn update_tokens(&self, link: &ExternalLoginUser) -> AuthResult<()>;

    async fn count_by_source(&self, source_id: i64) -> AuthResult<u64>;
}
