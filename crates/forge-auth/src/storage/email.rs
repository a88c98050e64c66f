//! Email address storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::EmailAddress;

/// Storage for user email addresses.
#[async_trait]
pub trait EmailAddressStorage: Send + Sync {
    /// Finds an address by its lowercase form.
    async fn find_by_lower_email(&self, lower_email: &str) -> AuthResult<Option<EmailAddress>>;

    /// Inserts an address; the storage assigns `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is already registered.
    async fn create(&self, address: &EmailAddress) -> AuthResult<EmailAddress>;
}
