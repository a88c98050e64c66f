//! WebAuthn credential storage.
//!
//! `sign_count` is a `u32` in the domain and a `BIGINT` column here.

use forge_auth::types::WebAuthnCredential;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use crate::{PgPool, StorageError, StorageResult, now_unix};

type CredentialTuple = (
    i64,
    i64,
    String,
    String,
    Vec<u8>,
    Vec<u8>,
    String,
    Vec<u8>,
    i64,
    bool,
    i64,
    i64,
);

const CREDENTIAL_COLUMNS: &str = "id, user_id, name, lower_name, credential_id, public_key, \
    attestation_type, aaguid, sign_count, clone_warning, created_unix, updated_unix";

fn credential_from_tuple(row: CredentialTuple) -> StorageResult<WebAuthnCredential> {
    let sign_count = u32::try_from(row.8)
        .map_err(|_| StorageError::invalid_data(format!("sign count {} out of range", row.8)))?;
    Ok(WebAuthnCredential {
        id: row.0,
        user_id: row.1,
        name: row.2,
        lower_name: row.3,
        credential_id: row.4,
        public_key: row.5,
        attestation_type: row.6,
        aaguid: row.7,
        sign_count,
        clone_warning: row.9,
        created_unix: row.10,
        updated_unix: row.11,
    })
}

/// Operations on the `webauthn_credential` table.
pub struct WebAuthnStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> WebAuthnStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a credential. The name is lowercased into `lower_name`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user already has a
    /// credential with this name or the credential id is registered.
    pub async fn create(&self, credential: &WebAuthnCredential) -> StorageResult<WebAuthnCredential> {
        let row: CredentialTuple = query_as(&format!(
            r#"
            INSERT INTO webauthn_credential (user_id, name, lower_name, credential_id,
                public_key, attestation_type, aaguid, sign_count, clone_warning,
                created_unix, updated_unix)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING {CREDENTIAL_COLUMNS}
            "#
        ))
        .bind(credential.user_id)
        .bind(&credential.name)
        .bind(credential.name.to_lowercase())
        .bind(&credential.credential_id)
        .bind(&credential.public_key)
        .bind(&credential.attestation_type)
        .bind(&credential.aaguid)
        .bind(i64::from(credential.sign_count))
        .bind(credential.clone_warning)
        .bind(now_unix())
        .fetch_one(self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, credential.name.clone()))?;
        credential_from_tuple(row)
    }

    /// Find a credential by the authenticator's credential id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> StorageResult<Option<WebAuthnCredential>> {
        let row: Option<CredentialTuple> = query_as(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM webauthn_credential WHERE credential_id = $1"
        ))
        .bind(credential_id)
        .fetch_optional(self.pool)
        .await?;
        row.map(credential_from_tuple).transpose()
    }

    /// Credentials of a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_by_user(&self, user_id: i64) -> StorageResult<Vec<WebAuthnCredential>> {
        let rows: Vec<CredentialTuple> = query_as(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM webauthn_credential WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(credential_from_tuple).collect()
    }

    /// Persist a counter and clone flag. Returns `false` if the credential is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_sign_count(
        &self,
        id: i64,
        sign_count: u32,
        clone_warning: bool,
    ) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE webauthn_credential
            SET sign_count = $2, clone_warning = $3, updated_unix = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(i64::from(sign_count))
        .bind(clone_warning)
        .bind(now_unix())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a credential owned by `user_id`. Returns `false` if no such credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: i64, user_id: i64) -> StorageResult<bool> {
        let result = query("DELETE FROM webauthn_credential WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
