//! External login link storage.

use forge_auth::types::ExternalLoginUser;
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;

use crate::{PgPool, StorageResult};

type LinkTuple = (String, i64, i64, String, String, String, String, Option<i64>);

fn link_from_tuple(row: LinkTuple) -> ExternalLoginUser {
    ExternalLoginUser {
        external_id: row.0,
        user_id: row.1,
        login_source_id: row.2,
        provider: row.3,
        email: row.4,
        access_token: row.5,
        refresh_token: row.6,
        expires_at: row.7,
    }
}

/// Operations on the `external_login_user` table.
pub struct ExternalLoginStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> ExternalLoginStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace the link for `(external_id, login_source_id)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn upsert(&self, link: &ExternalLoginUser) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO external_login_user (external_id, user_id, login_source_id, provider,
                email, access_token, refresh_token, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (external_id, login_source_id) DO UPDATE
            SET user_id = EXCLUDED.user_id,
                provider = EXCLUDED.provider,
                email = EXCLUDED.email,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&link.external_id)
        .bind(link.user_id)
        .bind(link.login_source_id)
        .bind(&link.provider)
        .bind(&link.email)
        .bind(&link.access_token)
        .bind(&link.refresh_token)
        .bind(link.expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Links of one source, ordered by external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_by_source(&self, source_id: i64) -> StorageResult<Vec<ExternalLoginUser>> {
        let rows: Vec<LinkTuple> = query_as(
            r#"
            SELECT external_id, user_id, login_source_id, provider, email,
                access_token, refresh_token, expires_at
            FROM external_login_user
            WHERE login_source_id = $1
            ORDER BY external_id
            "#,
        )
        .bind(source_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(link_from_tuple).collect())
    }

    /// Store refreshed provider tokens on an existing link.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_tokens(&self, link: &ExternalLoginUser) -> StorageResult<()> {
        query(
            r#"
            UPDATE external_login_user
            SET access_token = $3, refresh_token = $4, expires_at = $5
            WHERE external_id = $1 AND login_source_id = $2
            "#,
        )
        .bind(&link.external_id)
        .bind(link.login_source_id)
        .bind(&link.access_token)
        .bind(&link.refresh_token)
        .bind(link.expires_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Number of links to a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_by_source(&self, source_id: i64) -> StorageResult<u64> {
        let count: i64 =
            query_scalar("SELECT COUNT(*) FROM external_login_user WHERE login_source_id = $1")
                .bind(source_id)
                .fetch_one(self.pool)
                .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
