//! Authentication source storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::source::Source;

/// Storage for configured authentication sources.
///
/// Implementations persist [`Source::cfg`] through
/// [`SourceConfig::to_db`](crate::source::SourceConfig::to_db) and restore it
/// with [`SourceConfig::from_db`](crate::source::SourceConfig::from_db).
#[async_trait]
pub trait SourceStorage: Send + Sync {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Source>>;

    async fn find_by_name(&self, name: &str) -> AuthResult<Option<Source>>;

    /// Lists sources ordered by id, optionally only the active ones.
    async fn list(&self, active_only: bool) -> AuthResult<Vec<Source>>;

    /// Inserts a source; the storage assigns `id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SourceAlreadyExists` if the name is taken.
    async fn create(&self, source: &Source) -> AuthResult<Source>;

    /// Replaces a stored source.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::SourceNotExist` if no source has this id.
    async fn update(&self, source: &Source) -> AuthResult<()>;

    /// Removes a source. Reference checks happen in
    /// [`delete_source`](crate::source::delete_source).
    async fn delete(&self, id: i64) -> AuthResult<()>;
}
