//! Process-local session provider.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::SessionResult;
use crate::provider::Provider;
use crate::store::{BufferedStore, RawStore, Sink};
use crate::value::SessionMap;

#[derive(Debug, Clone)]
struct MemoryEntry {
    data: SessionMap,
    last_access: Instant,
}

impl MemoryEntry {
    fn new(data: SessionMap) -> Self {
        Self {
            data,
            last_access: Instant::now(),
        }
    }

    fn is_expired(&self, max_lifetime: Duration) -> bool {
        self.last_access.elapsed() >= max_lifetime
    }
}

/// Session provider keeping every session in a concurrent map.
///
/// Sessions vanish with the process. Suitable for single-instance
/// deployments and tests.
#[derive(Clone)]
pub struct MemoryProvider {
    entries: Arc<DashMap<String, MemoryEntry>>,
    max_lifetime: Duration,
}

impl MemoryProvider {
    /// Creates an empty provider expiring sessions idle for `max_lifetime`.
    #[must_use]
    pub fn new(max_lifetime: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_lifetime,
        }
    }

    fn store(&self, sid: &str, data: SessionMap) -> Box<dyn RawStore> {
        let sink = MemorySink {
            entries: Arc::clone(&self.entries),
        };
        Box::new(BufferedStore::new(sid, data, sink))
    }
}

struct MemorySink {
    entries: Arc<DashMap<String, MemoryEntry>>,
}

#[async_trait]
impl Sink for MemorySink {
    async fn write_back(&self, sid: &str, data: &SessionMap) -> SessionResult<()> {
        self.entries
            .insert(sid.to_string(), MemoryEntry::new(data.clone()));
        Ok(())
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn read(&self, sid: &str) -> SessionResult<Box<dyn RawStore>> {
        let mut entry = self
            .entries
            .entry(sid.to_string())
            .or_insert_with(|| MemoryEntry::new(SessionMap::new()));
        if entry.is_expired(self.max_lifetime) {
            entry.data.clear();
        }
        entry.last_access = Instant::now();
        let data = entry.data.clone();
        drop(entry);

        Ok(self.store(sid, data))
    }

    async fn exist(&self, sid: &str) -> SessionResult<bool> {
        Ok(self
            .entries
            .get(sid)
            .is_some_and(|entry| !entry.is_expired(self.max_lifetime)))
    }

    async fn destroy(&self, sid: &str) -> SessionResult<()> {
        self.entries.remove(sid);
        Ok(())
    }

    async fn regenerate(
        &self,
        old_sid: &str,
        new_sid: &str,
    ) -> SessionResult<Box<dyn RawStore>> {
        let data = self
            .entries
            .remove(old_sid)
            .filter(|(_, entry)| !entry.is_expired(self.max_lifetime))
            .map(|(_, entry)| entry.data)
            .unwrap_or_default();
        self.entries
            .insert(new_sid.to_string(), MemoryEntry::new(data.clone()));

        Ok(self.store(new_sid, data))
    }

    async fn count(&self) -> SessionResult<usize> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(self.max_lifetime))
            .count())
    }

    async fn gc(&self) -> SessionResult<()> {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !entry.is_expired(self.max_lifetime));
        tracing::debug!(
            evicted = before.saturating_sub(self.entries.len()),
            "memory session gc"
        );
        Ok(())
    }
}
