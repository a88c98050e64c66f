//! Email address storage.

use forge_auth::types::EmailAddress;
use sqlx_core::executor::Executor;
use sqlx_core::query_as::query_as;
use sqlx_postgres::Postgres;

use crate::{PgPool, StorageError, StorageResult};

type EmailTuple = (i64, i64, String, String, bool, bool);

fn email_from_tuple(row: EmailTuple) -> EmailAddress {
    EmailAddress {
        id: row.0,
        uid: row.1,
        email: row.2,
        lower_email: row.3,
        is_activated: row.4,
        is_primary: row.5,
    }
}

/// Inserts an address through any executor.
pub(crate) async fn insert_email<'e, E>(executor: E, address: &EmailAddress) -> StorageResult<EmailAddress>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: EmailTuple = query_as(
        r#"
        INSERT INTO email_address (uid, email, lower_email, is_activated, is_primary)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, uid, email, lower_email, is_activated, is_primary
        "#,
    )
    .bind(address.uid)
    .bind(&address.email)
    .bind(&address.lower_email)
    .bind(address.is_activated)
    .bind(address.is_primary)
    .fetch_one(executor)
    .await
    .map_err(|e| StorageError::from_insert(e, format!("email {}", address.email)))?;
    Ok(email_from_tuple(row))
}

/// Email address operations on the `email_address` table.
pub struct EmailStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> EmailStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find an address by its lowercased form.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find_by_lower_email(&self, lower_email: &str) -> StorageResult<Option<EmailAddress>> {
        let row: Option<EmailTuple> = query_as(
            r#"
            SELECT id, uid, email, lower_email, is_activated, is_primary
            FROM email_address
            WHERE lower_email = $1
            "#,
        )
        .bind(lower_email)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(email_from_tuple))
    }

    /// Insert an address.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the address is already used.
    pub async fn create(&self, address: &EmailAddress) -> StorageResult<EmailAddress> {
        insert_email(self.pool, address).await
    }
}
