//! User account storage.

use forge_auth::source::SourceType;
use forge_auth::types::{User, UserType};
use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::executor::Executor;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::Postgres;

use crate::{PgPool, StorageError, StorageResult, now_unix};

// =============================================================================
// Types
// =============================================================================

type UserTuple = (
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    i32,
    i64,
    String,
    i16,
    bool,
    bool,
    bool,
    i64,
    i64,
);

const USER_COLUMNS: &str = "id, name, lower_name, full_name, email, passwd, login_type, \
    login_source, login_name, user_type, is_active, is_admin, prohibit_login, \
    created_unix, updated_unix";

fn user_from_tuple(row: UserTuple) -> StorageResult<User> {
    let login_type = SourceType::from_i32(row.6)
        .ok_or_else(|| StorageError::invalid_data(format!("unknown login type {}", row.6)))?;
    Ok(User {
        id: row.0,
        name: row.1,
        lower_name: row.2,
        full_name: row.3,
        email: row.4,
        passwd: row.5,
        login_type,
        login_source: row.7,
        login_name: row.8,
        user_type: UserType::from_i16(row.9),
        is_active: row.10,
        is_admin: row.11,
        prohibit_login: row.12,
        created_unix: row.13,
        updated_unix: row.14,
    })
}

/// Inserts a user through any executor, so account creation can share a
/// transaction with the primary email insert.
pub(crate) async fn insert_user<'e, E>(executor: E, user: &User) -> StorageResult<User>
where
    E: Executor<'e, Database = Postgres>,
{
    let now = now_unix();
    let row: UserTuple = query_as(&format!(
        r#"
        INSERT INTO "user" (name, lower_name, full_name, email, passwd, login_type,
            login_source, login_name, user_type, is_active, is_admin, prohibit_login,
            created_unix, updated_unix)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&user.name)
    .bind(&user.lower_name)
    .bind(&user.full_name)
    .bind(&user.email)
    .bind(user.passwd.as_deref())
    .bind(user.login_type.as_i32())
    .bind(user.login_source)
    .bind(&user.login_name)
    .bind(user.user_type.as_i16())
    .bind(user.is_active)
    .bind(user.is_admin)
    .bind(user.prohibit_login)
    .bind(now)
    .fetch_one(executor)
    .await
    .map_err(|e| StorageError::from_insert(e, format!("user {}", user.name)))?;
    user_from_tuple(row)
}

// =============================================================================
// User Storage
// =============================================================================

/// User storage operations on the `user` table.
pub struct UserStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> UserStorage<'a> {
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn find_by_id(&self, id: i64) -> StorageResult<Option<User>> {
        let row: Option<UserTuple> =
            query_as(&format!(r#"SELECT {USER_COLUMNS} FROM "user" WHERE id = $1"#))
                .bind(id)
                .fetch_optional(self.pool)
                .await?;
        row.map(user_from_tuple).transpose()
    }

    /// Find a user by lowercased name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn find_by_lower_name(&self, lower_name: &str) -> StorageResult<Option<User>> {
        let row: Option<UserTuple> = query_as(&format!(
            r#"SELECT {USER_COLUMNS} FROM "user" WHERE lower_name = $1"#
        ))
        .bind(lower_name)
        .fetch_optional(self.pool)
        .await?;
        row.map(user_from_tuple).transpose()
    }

    /// Insert a user, assigning its id and timestamps.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the name is taken.
    pub async fn create(&self, user: &User) -> StorageResult<User> {
        insert_user(self.pool, user).await
    }

    /// Replace the password hash. Returns `false` if the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_password(&self, id: i64, passwd: &str) -> StorageResult<bool> {
        let result = query(r#"UPDATE "user" SET passwd = $2, updated_unix = $3 WHERE id = $1"#)
            .bind(id)
            .bind(passwd)
            .bind(now_unix())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Activate or deactivate a user. Returns `false` if the user does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_active(&self, id: i64, is_active: bool) -> StorageResult<bool> {
        let result = query(r#"UPDATE "user" SET is_active = $2, updated_unix = $3 WHERE id = $1"#)
            .bind(id)
            .bind(is_active)
            .bind(now_unix())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count users signing in through a source.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_by_login_source(&self, source_id: i64) -> StorageResult<u64> {
        let count: i64 = query_scalar(r#"SELECT COUNT(*) FROM "user" WHERE login_source = $1"#)
            .bind(source_id)
            .fetch_one(self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
