//! User account storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{EmailAddress, User};

/// Storage for user accounts.
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Finds a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<User>>;

    /// Finds a user by lowercase name.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_lower_name(&self, lower_name: &str) -> AuthResult<Option<User>>;

    /// Inserts a user. The storage assigns `id`, `created_unix` and
    /// `updated_unix` and returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` if the lowercase name is taken.
    async fn create(&self, user: &User) -> AuthResult<User>;

    /// Inserts a user together with its primary email address. Either both
    /// records are stored or neither is; `address.uid` is set to the new id.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserAlreadyExists` if the name is taken and
    /// `AuthError::EmailAddressAlreadyUsed` if the address is.
    async fn create_with_email(
        &self,
        user: &User,
        address: &EmailAddress,
    ) -> AuthResult<(User, EmailAddress)>;

    /// Replaces the password hash.
    async fn update_password(&self, id: i64, passwd: &str) -> AuthResult<()>;

    /// Activates or deactivates an account.
    async fn set_active(&self, id: i64, is_active: bool) -> AuthResult<()>;

    /// Counts users signing in through `source_id`.
    async fn count_by_login_source(&self, source_id: i64) -> AuthResult<u64>;
}
