//! WebAuthn credential storage trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::error::AuthError;
use crate::types::WebAuthnCredential;

/// Storage for WebAuthn credentials.
#[async_trait]
pub trait WebAuthnCredentialStorage: Send + Sync {
    /// Inserts a credential; the storage assigns `id`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WebAuthnCredentialExists` if the user already has
    /// a credential with the same lowercase name.
    async fn create(&self, credential: &WebAuthnCredential) -> AuthResult<WebAuthnCredential>;

    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> AuthResult<Option<WebAuthnCredential>>;

    async fn list_by_user(&self, user_id: i64) -> AuthResult<Vec<WebAuthnCredential>>;

    /// Persists counter and clone flag.
    async fn update_sign_count(
        &self,
        id: i64,
        sign_count: u32,
        clone_warning: bool,
    ) -> AuthResult<()>;

    /// Deletes a credential owned by `user_id`. Returns `false` if nothing matched.
    async fn delete(&self, id: i64, user_id: i64) -> AuthResult<bool>;
}

/// Records the counter reported by a successful assertion.
///
/// A non-advancing counter marks the credential with a clone warning, which
/// is persisted before the error is returned.
///
/// # Errors
///
/// Returns `AuthError::WebAuthnCredentialNotExist` for an unknown credential
/// and `AuthError::WebAuthnCloneDetected` for a non-advancing counter.
pub async fn update_sign_count(
    storage: &dyn WebAuthnCredentialStorage,
    credential_id: &[u8],
    reported: u32,
) -> AuthResult<WebAuthnCredential> {
    let mut credential = storage
        .find_by_credential_id(credential_id)
        .await?
        .ok_or(AuthError::WebAuthnCredentialNotExist)?;

    match credential.apply_sign_count(reported) {
        Ok(()) => {
            storage
                .update_sign_count(credential.id, credential.sign_count, credential.clone_warning)
                .await?;
            Ok(credential)
        }
        Err(err) => {
            tracing::warn!(
                credential = credential.id,
                user_id = credential.user_id,
                stored = credential.sign_count,
                reported,
                "webauthn sign count did not advance, possible cloned authenticator"
            );
            storage
                .update_sign_count(credential.id, credential.sign_count, true)
                .await?;
            Err(err)
        }
    }
}
