//! Schema migrations, embedded in the binary.

use std::borrow::Cow;

use sqlx_core::migrate::{Migration, MigrationType, Migrator};
use tracing::{info, instrument};

use crate::{PgPool, StorageError, StorageResult};

/// Embedded migrations as `(version, description, sql)`, oldest first.
macro_rules! embedded_migrations {
    () => {
        &[
            (
                20260101000001i64,
                "auth_schema",
                include_str!("../migrations/20260101000001_auth_schema.sql"),
            ),
            (
                20260101000002i64,
                "session",
                include_str!("../migrations/20260101000002_session.sql"),
            ),
        ]
    };
}

fn build_migrations() -> Vec<Migration> {
    embedded_migrations!()
        .iter()
        .map(|(version, description, sql)| Migration {
            version: *version,
            description: Cow::Borrowed(description),
            migration_type: MigrationType::Simple,
            sql: Cow::Borrowed(sql),
            checksum: Cow::Borrowed(&[]),
            no_tx: false,
        })
        .collect()
}

/// Applies all pending migrations, tracked in `_sqlx_migrations`.
///
/// # Errors
///
/// Returns `StorageError::Migration` if a migration fails to execute.
#[instrument(skip(pool))]
pub async fn run(pool: &PgPool) -> StorageResult<()> {
    let migrations = build_migrations();
    info!(count = migrations.len(), "Running auth storage migrations");

    let migrator = Migrator {
        migrations: Cow::Owned(migrations),
        ignore_missing: false,
        locking: true,
        no_tx: false,
    };
    migrator
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    info!("Auth storage migrations completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_ordered() {
        let migrations = build_migrations();
        assert_eq!(migrations.len(), 2);
        assert!(migrations.windows(2).all(|w| w[0].version < w[1].version));
        assert!(migrations[1].sql.contains("CREATE TABLE IF NOT EXISTS session"));
    }
}
