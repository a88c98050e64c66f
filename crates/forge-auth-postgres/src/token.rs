//! Auth token and personal access token storage.

use forge_auth::token::AccessTokenScope;
use forge_auth::types::{AccessToken, AuthToken};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use crate::{PgPool, StorageError, StorageResult, now_unix};

// =============================================================================
// Auth Tokens
// =============================================================================

type AuthTokenTuple = (String, String, i64, i64);

fn auth_token_from_tuple(row: AuthTokenTuple) -> AuthToken {
    AuthToken {
        id: row.0,
        token_hash: row.1,
        user_id: row.2,
        expires_unix: row.3,
    }
}

/// Remember-me token operations on the `auth_token` table.
pub struct AuthTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> AuthTokenStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a token.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id is already used.
    pub async fn insert(&self, token: &AuthToken) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO auth_token (id, token_hash, user_id, expires_unix)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.id)
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.expires_unix)
        .execute(self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, format!("auth token {}", token.id)))?;
        Ok(())
    }

    /// Find a token by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_id(&self, id: &str) -> StorageResult<Option<AuthToken>> {
        let row: Option<AuthTokenTuple> = query_as(
            "SELECT id, token_hash, user_id, expires_unix FROM auth_token WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(auth_token_from_tuple))
    }

    /// Overwrite hash, owner and expiry in one statement. Returns `false`
    /// if the token is gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update(&self, token: &AuthToken) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE auth_token
            SET token_hash = $2, user_id = $3, expires_unix = $4
            WHERE id = $1
            "#,
        )
        .bind(&token.id)
        .bind(&token.token_hash)
        .bind(token.user_id)
        .bind(token.expires_unix)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a token by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_by_id(&self, id: &str) -> StorageResult<()> {
        query("DELETE FROM auth_token WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete every token of a user. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_by_user_id(&self, user_id: i64) -> StorageResult<u64> {
        let result = query("DELETE FROM auth_token WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete tokens expiring at or before `now`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete_expired(&self, now: i64) -> StorageResult<u64> {
        let result = query("DELETE FROM auth_token WHERE expires_unix <= $1")
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Access Tokens
// =============================================================================

type AccessTokenTuple = (i64, i64, String, String, String, String, String, i64, i64);

const ACCESS_TOKEN_COLUMNS: &str = "id, uid, name, token_hash, token_salt, token_last_eight, \
    scope, created_unix, updated_unix";

fn access_token_from_tuple(row: AccessTokenTuple) -> AccessToken {
    AccessToken {
        id: row.0,
        uid: row.1,
        name: row.2,
        token_hash: row.3,
        token_salt: row.4,
        token_last_eight: row.5,
        scope: AccessTokenScope::new(row.6),
        created_unix: row.7,
        updated_unix: row.8,
    }
}

/// Personal access token operations on the `access_token` table.
pub struct AccessTokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> AccessTokenStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a token, assigning its id and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` on a hash collision.
    pub async fn create(&self, token: &AccessToken) -> StorageResult<AccessToken> {
        let row: AccessTokenTuple = query_as(&format!(
            r#"
            INSERT INTO access_token (uid, name, token_hash, token_salt, token_last_eight,
                scope, created_unix, updated_unix)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {ACCESS_TOKEN_COLUMNS}
            "#
        ))
        .bind(token.uid)
        .bind(&token.name)
        .bind(&token.token_hash)
        .bind(&token.token_salt)
        .bind(&token.token_last_eight)
        .bind(token.scope.as_str())
        .bind(now_unix())
        .fetch_one(self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, format!("access token {}", token.name)))?;
        Ok(access_token_from_tuple(row))
    }

    /// Candidates whose plaintext ends in `last_eight`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_last_eight(&self, last_eight: &str) -> StorageResult<Vec<AccessToken>> {
        let rows: Vec<AccessTokenTuple> = query_as(&format!(
            "SELECT {ACCESS_TOKEN_COLUMNS} FROM access_token WHERE token_last_eight = $1 ORDER BY id"
        ))
        .bind(last_eight)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(access_token_from_tuple).collect())
    }

    /// Record use of a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn touch(&self, id: i64, now: i64) -> StorageResult<()> {
        query("UPDATE access_token SET updated_unix = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete a token owned by `uid`. Returns `false` if no such token.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: i64, uid: i64) -> StorageResult<bool> {
        let result = query("DELETE FROM access_token WHERE id = $1 AND uid = $2")
            .bind(id)
            .bind(uid)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
