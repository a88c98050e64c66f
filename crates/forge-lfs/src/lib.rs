//! git-lfs-transfer bridge for the forge.
//!
//! When git talks to the forge over SSH with `lfs.sshtransfer` enabled it
//! runs `forge-lfs-transfer <repo> <upload|download>` and speaks the
//! pktline-based transfer protocol over stdin/stdout. This crate answers that
//! protocol by calling the forge's internal LFS API over HTTP:
//!
//! - [`pktline`] - packet framing
//! - [`protocol`] - handshake and command processing
//! - [`lock`] / [`http_lock`] - lock model and the locks API client
//! - [`transfer`] - object transfer through the batch API
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use forge_lfs::{ClientConfig, HttpLockBackend, HttpTransferBackend, InternalClient, Operation, Processor};
//!
//! let client = InternalClient::new(&ClientConfig::new(server_url, "mia/assets"))?;
//! let processor = Processor::new(
//!     tokio::io::stdin(),
//!     tokio::io::stdout(),
//!     Operation::Upload,
//!     Arc::new(HttpTransferBackend::new(client.clone())),
//!     Arc::new(HttpLockBackend::new(client)),
//! );
//! processor.run().await?;
//! ```

pub mod client;
pub mod error;
pub mod http_lock;
pub mod lock;
pub mod pktline;
pub mod protocol;
pub mod transfer;

pub use client::{ClientConfig, InternalClient};
pub use error::{LfsError, LfsResult};
pub use http_lock::HttpLockBackend;
pub use lock::{CURRENT_USER, Lock, LockBackend, UNKNOWN_OWNER};
pub use pktline::{Packet, PktReader, PktWriter};
pub use protocol::Processor;
pub use transfer::{
    Action, BatchItem, HttpTransferBackend, ObjectStream, Operation, Pointer, TransferBackend,
};
