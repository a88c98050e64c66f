//! PostgreSQL storage backend for forge authentication.
//!
//! Provides persistent storage for:
//!
//! - Users and their email addresses
//! - Login sources with their serialized configuration
//! - Remember-me auth tokens and personal access tokens
//! - External login links
//! - WebAuthn credentials
//! - Sessions, for the `db` session provider
//!
//! The schema ships as embedded migrations, applied with [`migrations::run`].
//!
//! # Example
//!
//! ```ignore
//! use forge_auth::{AuthConfig, AuthServices};
//! use forge_auth_postgres::PostgresAuthStorage;
//!
//! let storage = PostgresAuthStorage::connect("postgres://localhost/forge").await?;
//! storage.migrate().await?;
//!
//! let services = AuthServices::from_storage(AuthConfig::default(), Arc::new(storage.clone()));
//! let sessions = Arc::new(storage.session_table());
//! ```

pub mod adapters;
pub mod email;
pub mod external_login;
pub mod migrations;
pub mod session;
pub mod source;
pub mod token;
pub mod user;
pub mod webauthn;

use std::sync::Arc;

use forge_auth::AuthError;
use forge_session::SessionError;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

pub use email::EmailStorage;
pub use external_login::ExternalLoginStorage;
pub use session::PgSessionTable;
pub use source::SourceStorage;
pub use token::{AccessTokenStorage, AuthTokenStorage};
pub use user::UserStorage;
pub use webauthn::WebAuthnStorage;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// A unique constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A stored value could not be decoded.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Applying migrations failed.
    #[error("Migration error: {0}")]
    Migration(String),
}

impl StorageError {
    /// Create a `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an `InvalidData` error.
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData(message.into())
    }

    /// Returns `true` if this is a `Conflict` error.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Turns a unique violation into `Conflict(what)`, passing other errors through.
    pub(crate) fn from_insert(err: sqlx_core::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx_core::Error::Database(db) if db.is_unique_violation() => Self::conflict(what),
            _ => Self::Database(err),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::storage(err.to_string())
    }
}

impl From<StorageError> for SessionError {
    fn from(err: StorageError) -> Self {
        SessionError::backend(err.to_string())
    }
}

// =============================================================================
// PostgreSQL Auth Storage
// =============================================================================

/// PostgreSQL storage backend for authentication data.
///
/// Holds a connection pool and hands out per-table stores. Implements every
/// `forge_auth` storage trait, see [`adapters`].
#[derive(Debug, Clone)]
pub struct PostgresAuthStorage {
    pool: Arc<PgPool>,
}

impl PostgresAuthStorage {
    /// Create new storage with an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create new storage by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Migration` if a migration fails.
    pub async fn migrate(&self) -> StorageResult<()> {
        migrations::run(&self.pool).await
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -------------------------------------------------------------------------
    // Storage Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn users(&self) -> UserStorage<'_> {
        UserStorage::new(&self.pool)
    }

    #[must_use]
    pub fn emails(&self) -> EmailStorage<'_> {
        EmailStorage::new(&self.pool)
    }

    #[must_use]
    pub fn sources(&self) -> SourceStorage<'_> {
        SourceStorage::new(&self.pool)
    }

    #[must_use]
    pub fn auth_tokens(&self) -> AuthTokenStorage<'_> {
        AuthTokenStorage::new(&self.pool)
    }

    #[must_use]
    pub fn access_tokens(&self) -> AccessTokenStorage<'_> {
        AccessTokenStorage::new(&self.pool)
    }

    #[must_use]
    pub fn external_logins(&self) -> ExternalLoginStorage<'_> {
        ExternalLoginStorage::new(&self.pool)
    }

    #[must_use]
    pub fn webauthn(&self) -> WebAuthnStorage<'_> {
        WebAuthnStorage::new(&self.pool)
    }

    /// Session table for `forge_session::DbProvider`, sharing this pool.
    #[must_use]
    pub fn session_table(&self) -> PgSessionTable {
        PgSessionTable::new(Arc::clone(&self.pool))
    }
}

pub(crate) fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

// =============================================================================
// Tests
// =============================================================================
