//! Object transfer backend.
//!
//! [`HttpTransferBackend`] resolves every transfer through the LFS batch API
//! (`POST objects/batch`) and then follows the returned action hrefs.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::client::{InternalClient, MIME_GIT_LFS};
use crate::error::{LfsError, LfsResult};

/// Direction negotiated when the transfer process starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Operation {
    type Err = LfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            other => Err(LfsError::parse(format!("unknown operation {other:?}"))),
        }
    }
}

/// An object id with its size in bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pointer {
    pub oid: String,
    pub size: u64,
}

impl Pointer {
    #[must_use]
    pub fn new(oid: impl Into<String>, size: u64) -> Self {
        Self {
            oid: oid.into(),
            size,
        }
    }
}

/// What the client has to do with an object after `batch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    Download,
    Noop,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Noop => "noop",
        }
    }
}

/// One object of a `batch` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub pointer: Pointer,
    pub action: Action,
}

/// Object content being downloaded.
pub struct ObjectStream {
    pub size: u64,
    pub body: BoxStream<'static, LfsResult<Bytes>>,
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream").field("size", &self.size).finish()
    }
}

/// Object storage, as seen by the transfer protocol.
#[async_trait]
pub trait TransferBackend: Send + Sync {
    /// Decides the action for each object.
    async fn batch(
        &self,
        operation: Operation,
        pointers: &[Pointer],
        refname: Option<&str>,
    ) -> LfsResult<Vec<BatchItem>>;

    /// Opens an object for reading.
    async fn download(&self, pointer: &Pointer) -> LfsResult<ObjectStream>;

    /// Stores an object whose content was already checked against its id.
    async fn upload(&self, pointer: &Pointer, data: Bytes) -> LfsResult<()>;

    /// Confirms an uploaded object is stored with the given size.
    async fn verify(&self, pointer: &Pointer) -> LfsResult<()>;
}

// =============================================================================
// Batch API Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    operation: Operation,
    transfers: [&'static str; 1],
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    refspec: Option<RefName<'a>>,
    objects: &'a [Pointer],
    hash_algo: &'static str,
}

#[derive(Debug, Serialize)]
struct RefName<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    objects: Vec<BatchObject>,
}

#[derive(Debug, Deserialize)]
struct BatchObject {
    oid: String,
    size: u64,
    #[serde(default)]
    actions: HashMap<String, Link>,
    #[serde(default)]
    error: Option<ObjectError>,
}

#[derive(Debug, Clone, Deserialize)]
struct Link {
    href: Url,
    #[serde(default)]
    header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ObjectError {
    code: u16,
    message: String,
}

impl BatchObject {
    fn check(&self) -> LfsResult<()> {
        match &self.error {
            Some(err) => {
                debug!(oid = %self.oid, code = err.code, message = %err.message, "batch object error");
                Err(LfsError::from_status(err.code))
            }
            None => Ok(()),
        }
    }
}

// =============================================================================
// HTTP Transfer Backend
// =============================================================================

/// Transfer backend over the LFS batch API.
#[derive(Debug, Clone)]
pub struct HttpTransferBackend {
    client: InternalClient,
}

impl HttpTransferBackend {
    #[must_use]
    pub fn new(client: InternalClient) -> Self {
        Self { client }
    }

    async fn batch_objects(
        &self,
        operation: Operation,
        pointers: &[Pointer],
        refname: Option<&str>,
    ) -> LfsResult<Vec<BatchObject>> {
        let body = BatchRequest {
            operation,
            transfers: ["basic"],
            refspec: refname.map(|name| RefName { name }),
            objects: pointers,
            hash_algo: "sha256",
        };
        let resp = self
            .client
            .request(Method::POST, self.client.url("objects/batch")?)
            .body(serde_json::to_vec(&body)?)
            .send()
            .await
            .inspect_err(|e| warn!(op = "batch", error = %e, "lfs batch request failed"))?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            warn!(op = "batch", status = status.as_u16(), "lfs batch api returned error status");
            return Err(LfsError::from_status(status.as_u16()));
        }
        let decoded: BatchResponse = serde_json::from_slice(&bytes)
            .inspect_err(|e| warn!(op = "batch", error = %e, "lfs batch decode failed"))?;
        Ok(decoded.objects)
    }

    async fn single(&self, operation: Operation, pointer: &Pointer) -> LfsResult<BatchObject> {
        let object = self
            .batch_objects(operation, std::slice::from_ref(pointer), None)
            .await?
            .into_iter()
            .find(|o| o.oid == pointer.oid)
            .ok_or(LfsError::NotFound)?;
        object.check()?;
        Ok(object)
    }

    fn action(&self, method: Method, link: &Link) -> RequestBuilder {
        link.header.iter().fold(
            self.client.action_request(method, link.href.clone()),
            |req, (name, value)| req.header(name.as_str(), value.as_str()),
        )
    }

    async fn post_verify(&self, link: &Link, pointer: &Pointer) -> LfsResult<()> {
        let resp = self
            .action(Method::POST, link)
            .header(CONTENT_TYPE, MIME_GIT_LFS)
            .body(serde_json::to_vec(pointer)?)
            .send()
            .await
            .inspect_err(|e| warn!(op = "verify", error = %e, "lfs verify request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            warn!(op = "verify", status = status.as_u16(), oid = %pointer.oid, "lfs verify failed");
            return Err(LfsError::from_status(status.as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl TransferBackend for HttpTransferBackend {
    async fn batch(
        &self,
        operation: Operation,
        pointers: &[Pointer],
        refname: Option<&str>,
    ) -> LfsResult<Vec<BatchItem>> {
        let objects = self.batch_objects(operation, pointers, refname).await?;
        let items = objects
            .into_iter()
            .map(|object| {
                let action = match operation {
                    Operation::Upload if object.actions.contains_key("upload") => Action::Upload,
                    Operation::Download
                        if object.error.is_none() && object.actions.contains_key("download") =>
                    {
                        Action::Download
                    }
                    _ => Action::Noop,
                };
                BatchItem {
                    pointer: Pointer::new(object.oid, object.size),
                    action,
                }
            })
            .collect();
        Ok(items)
    }

    async fn download(&self, pointer: &Pointer) -> LfsResult<ObjectStream> {
        let object = self.single(Operation::Download, pointer).await?;
        let link = object.actions.get("download").ok_or(LfsError::NotFound)?;

        let resp = self
            .action(Method::GET, link)
            .send()
            .await
            .inspect_err(|e| warn!(op = "download", error = %e, "lfs download request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            warn!(op = "download", status = status.as_u16(), oid = %pointer.oid, "lfs download failed");
            return Err(LfsError::from_status(status.as_u16()));
        }

        Ok(ObjectStream {
            size: object.size,
            body: Box::pin(resp.bytes_stream().map_err(LfsError::from)),
        })
    }

    async fn upload(&self, pointer: &Pointer, data: Bytes) -> LfsResult<()> {
        let object = self.single(Operation::Upload, pointer).await?;
        let Some(link) = object.actions.get("upload") else {
            debug!(oid = %pointer.oid, "object already present");
            return Ok(());
        };

        let resp = self
            .action(Method::PUT, link)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .inspect_err(|e| warn!(op = "upload", error = %e, "lfs upload request failed"))?;
        let status = resp.status();
        if !status.is_success() {
            warn!(op = "upload", status = status.as_u16(), oid = %pointer.oid, "lfs upload failed");
            return Err(LfsError::from_status(status.as_u16()));
        }

        if let Some(verify) = object.actions.get("verify") {
            self.post_verify(verify, pointer).await?;
        }
        debug!(oid = %pointer.oid, size = pointer.size, "uploaded lfs object");
        Ok(())
    }

    async fn verify(&self, pointer: &Pointer) -> LfsResult<()> {
        let object = self.single(Operation::Upload, pointer).await?;
        if object.actions.contains_key("upload") {
            return Err(LfsError::NotFound);
        }
        match object.actions.get("verify") {
            Some(link) => self.post_verify(link, pointer).await,
            None => Ok(()),
        }
    }
}
