//! `forge_auth` storage trait implementations for [`PostgresAuthStorage`].
//!
//! Each impl delegates to the per-table store and maps unique violations and
//! missing rows onto the domain errors the sign-in chain expects.

use async_trait::async_trait;
use forge_auth::source::Source;
use forge_auth::storage::{
    AccessTokenStorage as AccessTokenStorageTrait, AuthTokenStorage as AuthTokenStorageTrait,
    EmailAddressStorage, ExternalLoginStorage as ExternalLoginStorageTrait,
    SourceStorage as SourceStorageTrait, UserStorage as UserStorageTrait,
    WebAuthnCredentialStorage,
};
use forge_auth::types::{
    AccessToken, AuthToken, EmailAddress, ExternalLoginUser, User, WebAuthnCredential,
};
use forge_auth::{AuthError, AuthResult};

use crate::email::insert_email;
use crate::user::insert_user;
use crate::{PostgresAuthStorage, StorageError};

/// Maps `Conflict` through `on_conflict`, everything else into a storage error.
fn map_conflict(err: StorageError, on_conflict: impl FnOnce() -> AuthError) -> AuthError {
    if err.is_conflict() {
        on_conflict()
    } else {
        err.into()
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStorageTrait for PostgresAuthStorage {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<User>> {
        Ok(self.users().find_by_id(id).await?)
    }

    async fn find_by_lower_name(&self, lower_name: &str) -> AuthResult<Option<User>> {
        Ok(self.users().find_by_lower_name(lower_name).await?)
    }

    async fn create(&self, user: &User) -> AuthResult<User> {
        self.users().create(user).await.map_err(|e| {
            map_conflict(e, || AuthError::UserAlreadyExists {
                name: user.name.clone(),
            })
        })
    }

    async fn create_with_email(
        &self,
        user: &User,
        address: &EmailAddress,
    ) -> AuthResult<(User, EmailAddress)> {
        let mut tx = self.pool().begin().await.map_err(StorageError::from)?;

        let created = insert_user(&mut *tx, user).await.map_err(|e| {
            map_conflict(e, || AuthError::UserAlreadyExists {
                name: user.name.clone(),
            })
        })?;
        let address = EmailAddress {
            uid: created.id,
            ..address.clone()
        };
        // Dropping the transaction on a failed email insert rolls back the user row.
        let email = insert_email(&mut *tx, &address).await.map_err(|e| {
            map_conflict(e, || AuthError::EmailAddressAlreadyUsed {
                email: address.email.clone(),
            })
        })?;

        tx.commit().await.map_err(StorageError::from)?;
        Ok((created, email))
    }

    async fn update_password(&self, id: i64, passwd: &str) -> AuthResult<()> {
        if self.users().update_password(id, passwd).await? {
            Ok(())
        } else {
            Err(AuthError::user_not_exist(format!("uid {id}")))
        }
    }

    async fn set_active(&self, id: i64, is_active: bool) -> AuthResult<()> {
        if self.users().set_active(id, is_active).await? {
            Ok(())
        } else {
            Err(AuthError::user_not_exist(format!("uid {id}")))
        }
    }

    async fn count_by_login_source(&self, source_id: i64) -> AuthResult<u64> {
        Ok(self.users().count_by_login_source(source_id).await?)
    }
}

#[async_trait]
impl EmailAddressStorage for PostgresAuthStorage {
    async fn find_by_lower_email(&self, lower_email: &str) -> AuthResult<Option<EmailAddress>> {
        Ok(self.emails().find_by_lower_email(lower_email).await?)
    }

    async fn create(&self, address: &EmailAddress) -> AuthResult<EmailAddress> {
        self.emails().create(address).await.map_err(|e| {
            map_conflict(e, || AuthError::EmailAddressAlreadyUsed {
                email: address.email.clone(),
            })
        })
    }
}

// =============================================================================
// Sources
// =============================================================================

#[async_trait]
impl SourceStorageTrait for PostgresAuthStorage {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Source>> {
        Ok(self.sources().find_by_id(id).await?)
    }

    async fn find_by_name(&self, name: &str) -> AuthResult<Option<Source>> {
        Ok(self.sources().find_by_name(name).await?)
    }

    async fn list(&self, active_only: bool) -> AuthResult<Vec<Source>> {
        Ok(self.sources().list(active_only).await?)
    }

    async fn create(&self, source: &Source) -> AuthResult<Source> {
        self.sources().create(source).await.map_err(|e| {
            map_conflict(e, || AuthError::SourceAlreadyExists {
                name: source.name.clone(),
            })
        })
    }

    async fn update(&self, source: &Source) -> AuthResult<()> {
        let updated = self.sources().update(source).await.map_err(|e| {
            map_conflict(e, || AuthError::SourceAlreadyExists {
                name: source.name.clone(),
            })
        })?;
        if updated {
            Ok(())
        } else {
            Err(AuthError::SourceNotExist { id: source.id })
        }
    }

    async fn delete(&self, id: i64) -> AuthResult<()> {
        Ok(self.sources().delete(id).await?)
    }
}

// =============================================================================
// Tokens
// =============================================================================

#[async_trait]
impl AuthTokenStorageTrait for PostgresAuthStorage {
    async fn insert(&self, token: &AuthToken) -> AuthResult<()> {
        Ok(self.auth_tokens().insert(token).await?)
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<AuthToken>> {
        Ok(self.auth_tokens().find_by_id(id).await?)
    }

    async fn update(&self, token: &AuthToken) -> AuthResult<bool> {
        Ok(self.auth_tokens().update(token).await?)
    }

    async fn delete_by_id(&self, id: &str) -> AuthResult<()> {
        Ok(self.auth_tokens().delete_by_id(id).await?)
    }

    async fn delete_by_user_id(&self, user_id: i64) -> AuthResult<u64> {
        Ok(self.auth_tokens().delete_by_user_id(user_id).await?)
    }

    async fn delete_expired(&self, now: i64) -> AuthResult<u64> {
        Ok(self.auth_tokens().delete_expired(now).await?)
    }
}

#[async_trait]
impl AccessTokenStorageTrait for PostgresAuthStorage {
    async fn create(&self, token: &AccessToken) -> AuthResult<AccessToken> {
        Ok(self.access_tokens().create(token).await?)
    }

    async fn find_by_last_eight(&self, last_eight: &str) -> AuthResult<Vec<AccessToken>> {
        Ok(self.access_tokens().find_by_last_eight(last_eight).await?)
    }

    async fn touch(&self, id: i64, now: i64) -> AuthResult<()> {
        Ok(self.access_tokens().touch(id, now).await?)
    }

    async fn delete(&self, id: i64, uid: i64) -> AuthResult<bool> {
        Ok(self.access_tokens().delete(id, uid).await?)
    }
}

// =============================================================================
// External Logins
// =============================================================================

#[async_trait]
impl ExternalLoginStorageTrait for PostgresAuthStorage {
    async fn upsert(&self, link: &ExternalLoginUser) -> AuthResult<()> {
        Ok(self.external_logins().upsert(link).await?)
    }

    async fn list_by_source(&self, source_id: i64) -> AuthResult<Vec<ExternalLoginUser>> {
        Ok(self.external_logins().list_by_source(source_id).await?)
    }

    async fn update_tokens(&self, link: &ExternalLoginUser) -> AuthResult<()> {
        Ok(self.external_logins().update_tokens(link).await?)
    }

    async fn count_by_source(&self, source_id: i64) -> AuthResult<u64> {
        Ok(self.external_logins().count_by_source(source_id).await?)
    }
}

// =============================================================================
// WebAuthn
// =============================================================================

#[async_trait]
impl WebAuthnCredentialStorage for PostgresAuthStorage {
    async fn create(&self, credential: &WebAuthnCredential) -> AuthResult<WebAuthnCredential> {
        self.webauthn().create(credential).await.map_err(|e| {
            map_conflict(e, || AuthError::WebAuthnCredentialExists {
                name: credential.name.clone(),
            })
        })
    }

    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> AuthResult<Option<WebAuthnCredential>> {
        Ok(self.webauthn().find_by_credential_id(credential_id).await?)
    }

    async fn list_by_user(&self, user_id: i64) -> AuthResult<Vec<WebAuthnCredential>> {
        Ok(self.webauthn().list_by_user(user_id).await?)
    }

    async fn update_sign_count(
        &self,
        id: i64,
        sign_count: u32,
        clone_warning: bool,
    ) -> AuthResult<()> {
        self.webauthn()
            .update_sign_count(id, sign_count, clone_warning)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64, user_id: i64) -> AuthResult<bool> {
        Ok(self.webauthn().delete(id, user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_conflict() {
        let err = map_conflict(StorageError::conflict("user mia"), || {
            AuthError::UserAlreadyExists { name: "mia".into() }
        });
        assert!(matches!(err, AuthError::UserAlreadyExists { .. }));

        let err = map_conflict(StorageError::invalid_data("bad row"), || {
            AuthError::UserAlreadyExists { name: "mia".into() }
        });
        assert!(matches!(err, AuthError::Storage { .. }));
    }
}
