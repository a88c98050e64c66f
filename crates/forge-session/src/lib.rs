//! Session persistence for the forge.
//!
//! A session is an opaque key/value bag identified by a session id (sid).
//! Three interchangeable providers persist sessions:
//!
//! - [`MemoryProvider`]: process-local, backed by a concurrent map
//! - [`RedisProvider`]: shared across instances, one key per session with a TTL
//! - [`DbProvider`]: backed by a relational [`SessionTable`]
//!
//! Every provider hands out [`RawStore`] instances. A store buffers reads and
//! writes in memory and only touches the backing medium on
//! [`RawStore::release`], and only when the session holds data.
//!
//! # Example
//!
//! ```ignore
//! use forge_session::{SessionConfig, open_provider};
//!
//! let provider = open_provider(&SessionConfig::default(), None).await?;
//! let store = provider.read(&forge_session::generate_sid()).await?;
//! store.set("uid", 42.into());
//! store.release().await?;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod provider;
pub mod redis_provider;
pub mod store;
pub mod value;

pub use config::{ConfigError, ProviderKind, SessionConfig};
pub use db::{DbProvider, SessionRow, SessionTable};
pub use error::{SessionError, SessionResult};
pub use memory::MemoryProvider;
pub use provider::{Provider, generate_sid, is_valid_sid, open_provider};
pub use redis_provider::RedisProvider;
pub use store::{RawStore, SessionBuffer};
pub use value::{SessionMap, SessionValue, decode, encode};
