//! Login source storage.
//!
//! The per-kind configuration is stored as the blob produced by
//! `SourceConfig::to_db` and decoded according to the row's `type`.

use forge_auth::source::{Source, SourceConfig, SourceType};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use crate::{PgPool, StorageError, StorageResult, now_unix};

type SourceTuple = (i64, i32, String, bool, bool, Vec<u8>, i64, i64);

const SOURCE_COLUMNS: &str =
    "id, type, name, is_active, is_sync_enabled, cfg, created_unix, updated_unix";

fn source_from_tuple(row: SourceTuple) -> StorageResult<Source> {
    let source_type = SourceType::from_i32(row.1)
        .ok_or_else(|| StorageError::invalid_data(format!("unknown source type {}", row.1)))?;
    let cfg = SourceConfig::from_db(source_type, &row.5)
        .map_err(|e| StorageError::invalid_data(e.to_string()))?;
    Ok(Source {
        id: row.0,
        source_type,
        name: row.2,
        is_active: row.3,
        is_sync_enabled: row.4,
        cfg,
        created_unix: row.6,
        updated_unix: row.7,
    })
}

fn encode_cfg(source: &Source) -> StorageResult<Vec<u8>> {
    source
        .cfg
        .to_db()
        .map_err(|e| StorageError::invalid_data(e.to_string()))
}

/// Source operations on the `login_source` table.
pub struct SourceStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> SourceStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a source by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the config does not decode.
    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<Source>> {
        let row: Option<SourceTuple> =
            query_as(&format!("SELECT {SOURCE_COLUMNS} FROM login_source WHERE id = $1"))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        row.map(source_from_tuple).transpose()
    }

    /// Find a source by its unique name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the config does not decode.
    pub async fn find_by_name(&self, name: &str) -> StorageResult<Option<Source>> {
        let row: Option<SourceTuple> =
            query_as(&format!("SELECT {SOURCE_COLUMNS} FROM login_source WHERE name = $1"))
                .bind(name)
                .fetch_optional(self.pool)
                .await?;
        row.map(source_from_tuple).transpose()
    }

    /// List sources ordered by id, optionally only the active ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a config does not decode.
    pub async fn list(&self, active_only: bool) -> StorageResult<Vec<Source>> {
        let rows: Vec<SourceTuple> = query_as(&format!(
            "SELECT {SOURCE_COLUMNS} FROM login_source WHERE is_active OR NOT $1 ORDER BY id"
        ))
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;
        rows.into_iter().map(source_from_tuple).collect()
    }

    /// Insert a source, assigning its id and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the name is taken.
    pub async fn create(&self, source: &Source) -> StorageResult<Source> {
        let row: SourceTuple = query_as(&format!(
            r#"
            INSERT INTO login_source (type, name, is_active, is_sync_enabled, cfg,
                created_unix, updated_unix)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING {SOURCE_COLUMNS}
            "#
        ))
        .bind(source.source_type.as_i32())
        .bind(&source.name)
        .bind(source.is_active)
        .bind(source.is_sync_enabled)
        .bind(encode_cfg(source)?)
        .bind(now_unix())
        .fetch_one(self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, format!("login source {}", source.name)))?;
        source_from_tuple(row)
    }

    /// Overwrite a source. Returns `false` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the new name is taken.
    pub async fn update(&self, source: &Source) -> StorageResult<bool> {
        let result = query(
            r#"
            UPDATE login_source
            SET type = $2, name = $3, is_active = $4, is_sync_enabled = $5, cfg = $6,
                updated_unix = $7
            WHERE id = $1
            "#,
        )
        .bind(source.id)
        .bind(source.source_type.as_i32())
        .bind(&source.name)
        .bind(source.is_active)
        .bind(source.is_sync_enabled)
        .bind(encode_cfg(source)?)
        .bind(now_unix())
        .execute(self.pool)
        .await
        .map_err(|e| StorageError::from_insert(e, format!("login source {}", source.name)))?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, id: i64) -> StorageResult<()> {
        query("DELETE FROM login_source WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
