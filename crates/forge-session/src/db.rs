//! Database-backed session provider.
//!
//! The provider talks to a [`SessionTable`], which a storage crate implements
//! over its relational database. Each row carries the encoded session and the
//! unix time of its last write; a row is stale once
//! `expiry + max_lifetime <= now`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::SessionResult;
use crate::provider::Provider;
use crate::store::{BufferedStore, RawStore, Sink};
use crate::value::{SessionMap, decode, encode};

/// A stored session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    /// Encoded session payload.
    pub data: Vec<u8>,
    /// Unix time of the last write.
    pub expiry: i64,
}

/// Relational persistence for sessions.
#[async_trait]
pub trait SessionTable: Send + Sync {
    /// Reads a row, inserting an empty one stamped `now` when missing.
    async fn read_or_create(&self, sid: &str, now: i64) -> SessionResult<SessionRow>;

    /// Inserts or replaces a row.
    async fn upsert(&self, sid: &str, data: &[u8], now: i64) -> SessionResult<()>;

    async fn exists(&self, sid: &str) -> SessionResult<bool>;

    async fn delete(&self, sid: &str) -> SessionResult<()>;

    /// Renames `old_sid` to `new_sid` in a single transaction and returns the
    /// moved row. A missing `old_sid` is created empty first.
    async fn regenerate(&self, old_sid: &str, new_sid: &str, now: i64)
    -> SessionResult<SessionRow>;

    async fn count(&self) -> SessionResult<usize>;

    /// Deletes rows last written at or before `cutoff`. Returns the number removed.
    async fn delete_expired(&self, cutoff: i64) -> SessionResult<u64>;
}

/// Session provider backed by a [`SessionTable`].
#[derive(Clone)]
pub struct DbProvider {
    table: Arc<dyn SessionTable>,
    max_lifetime: Duration,
}

impl DbProvider {
    #[must_use]
    pub fn new(table: Arc<dyn SessionTable>, max_lifetime: Duration) -> Self {
        Self {
            table,
            max_lifetime,
        }
    }

    fn lifetime_secs(&self) -> i64 {
        i64::try_from(self.max_lifetime.as_secs()).unwrap_or(i64::MAX)
    }

    fn live_data(&self, row: &SessionRow, now: i64) -> SessionResult<SessionMap> {
        if row.data.is_empty() || row.expiry.saturating_add(self.lifetime_secs()) <= now {
            return Ok(SessionMap::new());
        }
        decode(&row.data)
    }

    fn store(&self, sid: &str, data: SessionMap) -> Box<dyn RawStore> {
        let sink = DbSink {
            table: Arc::clone(&self.table),
        };
        Box::new(BufferedStore::new(sid, data, sink))
    }
}

fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

struct DbSink {
    table: Arc<dyn SessionTable>,
}

#[async_trait]
impl Sink for DbSink {
    async fn write_back(&self, sid: &str, data: &SessionMap) -> SessionResult<()> {
        let payload = encode(data)?;
        self.table.upsert(sid, &payload, now_unix()).await
    }
}

#[async_trait]
impl Provider for DbProvider {
    async fn read(&self, sid: &str) -> SessionResult<Box<dyn RawStore>> {
        let now = now_unix();
        let row = self.table.read_or_create(sid, now).await?;
        let data = self.live_data(&row, now)?;
        Ok(self.store(sid, data))
    }

    async fn exist(&self, sid: &str) -> SessionResult<bool> {
        self.table.exists(sid).await
    }

    async fn destroy(&self, sid: &str) -> SessionResult<()> {
        self.table.delete(sid).await
    }

    async fn regenerate(
        &self,
        old_sid: &str,
        new_sid: &str,
    ) -> SessionResult<Box<dyn RawStore>> {
        let now = now_unix();
        let row = self.table.regenerate(old_sid, new_sid, now).await?;
        let data = self.live_data(&row, now)?;
        Ok(self.store(new_sid, data))
    }

    async fn count(&self) -> SessionResult<usize> {
        self.table.count().await
    }

    async fn gc(&self) -> SessionResult<()> {
        let cutoff = now_unix().saturating_sub(self.lifetime_secs());
        let removed = self.table.delete_expired(cutoff).await?;
        tracing::debug!(removed, "db session gc");
        Ok(())
    }
}
