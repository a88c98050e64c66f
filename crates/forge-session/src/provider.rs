//! The provider capability and provider selection.

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::config::{ProviderKind, SessionConfig};
use crate::db::{DbProvider, SessionTable};
use crate::error::{SessionError, SessionResult};
use crate::memory::MemoryProvider;
use crate::redis_provider::RedisProvider;
use crate::store::RawStore;

/// Length in hex characters of a generated session id.
pub const SID_LENGTH: usize = 32;

/// A session persistence backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Opens the session `sid`, creating an empty one if it does not exist.
    async fn read(&self, sid: &str) -> SessionResult<Box<dyn RawStore>>;

    /// Returns `true` if the session exists.
    async fn exist(&self, sid: &str) -> SessionResult<bool>;

    /// Removes the session.
    async fn destroy(&self, sid: &str) -> SessionResult<()>;

    /// Moves the data of `old_sid` to `new_sid`.
    ///
    /// A missing old session is treated as empty.
    async fn regenerate(&self, old_sid: &str, new_sid: &str)
    -> SessionResult<Box<dyn RawStore>>;

    /// Number of live sessions.
    async fn count(&self) -> SessionResult<usize>;

    /// Evicts expired sessions.
    async fn gc(&self) -> SessionResult<()>;
}

/// Generates a fresh random session id.
#[must_use]
pub fn generate_sid() -> String {
    let bytes: [u8; SID_LENGTH / 2] = rand::thread_rng().r#gen();
    hex::encode(bytes)
}

/// Checks that a client-supplied session id has the generated shape.
#[must_use]
pub fn is_valid_sid(sid: &str) -> bool {
    sid.len() == SID_LENGTH && sid.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Builds the provider selected by `config`.
///
/// The `db` provider needs a `table`; the other providers ignore it.
///
/// # Errors
///
/// Returns `SessionError::Configuration` if the db provider is selected
/// without a table, or a backend error if Redis cannot be reached.
pub async fn open_provider(
    config: &SessionConfig,
    table: Option<Arc<dyn SessionTable>>,
) -> SessionResult<Arc<dyn Provider>> {
    tracing::info!(provider = %config.provider, "Opening session provider");

    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::Memory => Arc::new(MemoryProvider::new(config.max_lifetime)),
        ProviderKind::Redis => Arc::new(RedisProvider::init(config).await?),
        ProviderKind::Db => {
            let table = table.ok_or_else(|| {
                SessionError::configuration("db session provider requires a session table")
            })?;
            Arc::new(DbProvider::new(table, config.max_lifetime))
        }
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_sid_is_valid() {
        let sid = generate_sid();
        assert_eq!(sid.len(), SID_LENGTH);
        assert!(is_valid_sid(&sid));
        assert_ne!(sid, generate_sid());
    }

    #[test]
    fn test_is_valid_sid_rejects_bad_input() {
        assert!(!is_valid_sid(""));
        assert!(!is_valid_sid("../../etc/passwd"));
        assert!(!is_valid_sid(&"z".repeat(SID_LENGTH)));
    }

    #[tokio::test]
    async fn test_db_provider_requires_table() {
        let config = SessionConfig::default().with_provider(ProviderKind::Db);
        let err = open_provider(&config, None).await.err().unwrap();
        assert!(matches!(err, SessionError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_open_memory_provider() {
        let provider = open_provider(&SessionConfig::default(), None).await.unwrap();
        assert_eq!(provider.count().await.unwrap(), 0);
    }
}
