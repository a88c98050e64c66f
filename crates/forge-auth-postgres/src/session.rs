//! Session table for the database session provider.

use std::sync::Arc;

use async_trait::async_trait;
use forge_session::{SessionResult, SessionRow, SessionTable};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;

use crate::{PgPool, StorageError};

type RowTuple = (Vec<u8>, i64);

fn row_from_tuple(row: RowTuple) -> SessionRow {
    SessionRow {
        data: row.0,
        expiry: row.1,
    }
}

/// [`SessionTable`] over the `session` table.
#[derive(Debug, Clone)]
pub struct PgSessionTable {
    pool: Arc<PgPool>,
}

impl PgSessionTable {
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn db_err(err: sqlx_core::Error) -> forge_session::SessionError {
    StorageError::from(err).into()
}

#[async_trait]
impl SessionTable for PgSessionTable {
    async fn read_or_create(&self, sid: &str, now: i64) -> SessionResult<SessionRow> {
        query(
            r#"
            INSERT INTO session (key, data, expiry)
            VALUES ($1, ''::bytea, $2)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(sid)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;

        let row: RowTuple = query_as("SELECT data, expiry FROM session WHERE key = $1")
            .bind(sid)
            .fetch_one(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(row_from_tuple(row))
    }

    async fn upsert(&self, sid: &str, data: &[u8], now: i64) -> SessionResult<()> {
        query(
            r#"
            INSERT INTO session (key, data, expiry)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET data = EXCLUDED.data, expiry = EXCLUDED.expiry
            "#,
        )
        .bind(sid)
        .bind(data)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn exists(&self, sid: &str) -> SessionResult<bool> {
        let found: bool = query_scalar("SELECT EXISTS(SELECT 1 FROM session WHERE key = $1)")
            .bind(sid)
            .fetch_one(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(found)
    }

    async fn delete(&self, sid: &str) -> SessionResult<()> {
        query("DELETE FROM session WHERE key = $1")
            .bind(sid)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn regenerate(
        &self,
        old_sid: &str,
        new_sid: &str,
        now: i64,
    ) -> SessionResult<SessionRow> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let moved: Option<RowTuple> = query_as(
            r#"
            UPDATE session SET key = $2
            WHERE key = $1
            RETURNING data, expiry
            "#,
        )
        .bind(old_sid)
        .bind(new_sid)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let row = match moved {
            Some(row) => row_from_tuple(row),
            None => {
                query("INSERT INTO session (key, data, expiry) VALUES ($1, ''::bytea, $2)")
                    .bind(new_sid)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_err)?;
                SessionRow {
                    data: Vec::new(),
                    expiry: now,
                }
            }
        };

        tx.commit().await.map_err(db_err)?;
        Ok(row)
    }

    async fn count(&self) -> SessionResult<usize> {
        let count: i64 = query_scalar("SELECT COUNT(*) FROM session")
            .fetch_one(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn delete_expired(&self, cutoff: i64) -> SessionResult<u64> {
        let result = query("DELETE FROM session WHERE expiry <= $1")
            .bind(cutoff)
            .execute(&*self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}
