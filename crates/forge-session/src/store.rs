//! Request-scoped session stores.
//!
//! A [`RawStore`] is handed out by a provider for one request. Mutations land
//! in a [`SessionBuffer`] guarded by a reader/writer lock and are written back
//! to the provider's medium by [`RawStore::release`].

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::SessionResult;
use crate::value::{SessionMap, SessionValue};

/// A session handle for one request.
#[async_trait]
pub trait RawStore: Send + Sync {
    /// Sets a value in the session.
    fn set(&self, key: &str, value: SessionValue);

    /// Gets a value from the session.
    fn get(&self, key: &str) -> Option<SessionValue>;

    /// Deletes a value from the session.
    fn delete(&self, key: &str);

    /// Returns the session id.
    fn id(&self) -> &str;

    /// Writes buffered data back to the provider.
    ///
    /// An empty session is never written.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backing medium fails.
    async fn release(&self) -> SessionResult<()>;

    /// Deletes all buffered values.
    fn flush(&self);
}

/// In-memory buffer shared by every [`RawStore`] implementation.
#[derive(Debug)]
pub struct SessionBuffer {
    sid: String,
    data: RwLock<SessionMap>,
}

impl SessionBuffer {
    /// Creates a buffer for `sid` pre-populated with `data`.
    #[must_use]
    pub fn new(sid: impl Into<String>, data: SessionMap) -> Self {
        Self {
            sid: sid.into(),
            data: RwLock::new(data),
        }
    }

    pub fn id(&self) -> &str {
        &self.sid
    }

    pub fn set(&self, key: &str, value: SessionValue) {
        self.data.write().insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<SessionValue> {
        self.data.read().get(key).cloned()
    }

    pub fn delete(&self, key: &str) {
        self.data.write().remove(key);
    }

    pub fn flush(&self) {
        self.data.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Copies out the buffered data, or `None` when there is nothing to persist.
    #[must_use]
    pub fn snapshot(&self) -> Option<SessionMap> {
        let data = self.data.read();
        if data.is_empty() {
            None
        } else {
            Some(data.clone())
        }
    }
}

/// Destination of a store's buffered data on release.
#[async_trait]
pub(crate) trait Sink: Send + Sync {
    async fn write_back(&self, sid: &str, data: &SessionMap) -> SessionResult<()>;
}

/// A [`RawStore`] that buffers in a [`SessionBuffer`] and persists through a [`Sink`].
pub(crate) struct BufferedStore<S> {
    buffer: SessionBuffer,
    sink: S,
}

impl<S: Sink> BufferedStore<S> {
    pub(crate) fn new(sid: impl Into<String>, data: SessionMap, sink: S) -> Self {
        Self {
            buffer: SessionBuffer::new(sid, data),
            sink,
        }
    }
}

#[async_trait]
impl<S: Sink> RawStore for BufferedStore<S> {
    fn set(&self, key: &str, value: SessionValue) {
        self.buffer.set(key, value);
    }

    fn get(&self, key: &str) -> Option<SessionValue> {
        self.buffer.get(key)
    }

    fn delete(&self, key: &str) {
        self.buffer.delete(key);
    }

    fn id(&self) -> &str {
        self.buffer.id()
    }

    async fn release(&self) -> SessionResult<()> {
        let Some(data) = self.buffer.snapshot() else {
            tracing::trace!(sid = %self.buffer.id(), "skipping release of empty session");
            return Ok(());
        };
        self.sink.write_back(self.buffer.id(), &data).await
    }

    fn flush(&self) {
        self.buffer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct CountingSink {
        writes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Sink for CountingSink {
        async fn write_back(&self, _sid: &str, _data: &SessionMap) -> SessionResult<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_buffer_set_get_delete() {
        let buffer = SessionBuffer::new("sid", SessionMap::new());
        buffer.set("uid", 1.into());
        assert_eq!(buffer.get("uid"), Some(SessionValue::Int(1)));
        buffer.delete("uid");
        assert!(buffer.get("uid").is_none());
        assert!(buffer.snapshot().is_none());
    }

    #[tokio::test]
    async fn test_release_of_empty_store_writes_nothing() {
        let sink = CountingSink::default();
        let store = BufferedStore::new("sid", SessionMap::new(), sink.clone());
        store.release().await.unwrap();
        assert_eq!(sink.writes.load(Ordering::SeqCst), 0);

        store.set("uid", 3.into());
        store.release().await.unwrap();
        assert_eq!(sink.writes.load(Ordering::SeqCst), 1);

        store.flush();
        store.release().await.unwrap();
        assert_eq!(sink.writes.load(Ordering::SeqCst), 1);
    }
}
