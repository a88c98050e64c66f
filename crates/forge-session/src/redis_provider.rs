//! Redis-backed session provider.
//!
//! Each session lives under `<key_prefix><sid>` with a TTL of the configured
//! max lifetime. Regeneration runs as a single Lua script so the old id is
//! invalidated and the new id becomes visible in one step.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::provider::Provider;
use crate::store::{BufferedStore, RawStore, Sink};
use crate::value::{SessionMap, decode, encode};

/// Moves KEYS[1] to KEYS[2] unless KEYS[2] exists. Returns `{moved, data}`.
const REGENERATE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[2]) == 1 then
  return {0, ''}
end
local data = redis.call('GET', KEYS[1])
if not data then
  data = ''
end
redis.call('DEL', KEYS[1])
redis.call('SET', KEYS[2], data, 'EX', ARGV[1])
return {1, data}
";

/// Session provider backed by a Redis connection pool.
#[derive(Clone)]
pub struct RedisProvider {
    pool: Pool,
    prefix: String,
    max_lifetime: Duration,
}

impl RedisProvider {
    /// Creates a provider over an existing pool.
    #[must_use]
    pub fn new(pool: Pool, prefix: impl Into<String>, max_lifetime: Duration) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            max_lifetime,
        }
    }

    /// Connects to the Redis server named by `config.provider_config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be built or the server is unreachable.
    pub async fn init(config: &SessionConfig) -> SessionResult<Self> {
        let pool = deadpool_redis::Config::from_url(&config.provider_config)
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| SessionError::configuration(format!("redis pool: {e}")))?;

        // Fail at startup rather than on the first request.
        pool.get().await?;
        tracing::info!("Connected to Redis session store");

        Ok(Self::new(pool, config.key_prefix.clone(), config.max_lifetime))
    }

    fn key(&self, sid: &str) -> String {
        format!("{}{}", self.prefix, sid)
    }

    fn ttl_secs(&self) -> u64 {
        self.max_lifetime.as_secs().max(1)
    }

    fn store(&self, sid: &str, data: SessionMap) -> Box<dyn RawStore> {
        let sink = RedisSink {
            pool: self.pool.clone(),
            key: self.key(sid),
            ttl_secs: self.ttl_secs(),
        };
        Box::new(BufferedStore::new(sid, data, sink))
    }
}

struct RedisSink {
    pool: Pool,
    key: String,
    ttl_secs: u64,
}

#[async_trait]
impl Sink for RedisSink {
    async fn write_back(&self, _sid: &str, data: &SessionMap) -> SessionResult<()> {
        let payload = encode(data)?;
        let mut conn = self.pool.get().await?;
        conn.set_ex::<_, _, ()>(&self.key, payload, self.ttl_secs)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Provider for RedisProvider {
    async fn read(&self, sid: &str) -> SessionResult<Box<dyn RawStore>> {
        let key = self.key(sid);
        let mut conn = self.pool.get().await?;

        let payload: Option<Vec<u8>> = conn.get(&key).await?;
        let data = match payload {
            Some(bytes) => decode(&bytes)?,
            None => {
                conn.set_ex::<_, _, ()>(&key, "", self.ttl_secs()).await?;
                SessionMap::new()
            }
        };

        Ok(self.store(sid, data))
    }

    async fn exist(&self, sid: &str) -> SessionResult<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.exists(self.key(sid)).await?)
    }

    async fn destroy(&self, sid: &str) -> SessionResult<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(self.key(sid)).await?;
        Ok(())
    }

    async fn regenerate(
        &self,
        old_sid: &str,
        new_sid: &str,
    ) -> SessionResult<Box<dyn RawStore>> {
        let mut conn = self.pool.get().await?;

        let (moved, payload): (i64, Vec<u8>) = redis::Script::new(REGENERATE_SCRIPT)
            .key(self.key(old_sid))
            .key(self.key(new_sid))
            .arg(self.ttl_secs())
            .invoke_async(&mut conn)
            .await?;
        if moved == 0 {
            return Err(SessionError::AlreadyExists {
                sid: new_sid.to_string(),
            });
        }

        Ok(self.store(new_sid, decode(&payload)?))
    }

    async fn count(&self) -> SessionResult<usize> {
        let mut conn = self.pool.get().await?;
        let size: usize = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(size)
    }

    async fn gc(&self) -> SessionResult<()> {
        // Keys expire through their TTL.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_uses_prefix() {
        let pool = deadpool_redis::Config::from_url("redis://127.0.0.1:6379")
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        let provider = RedisProvider::new(pool, "session:", Duration::from_millis(10));
        assert_eq!(provider.key("abc"), "session:abc");
        assert_eq!(provider.ttl_secs(), 1);
    }
}
