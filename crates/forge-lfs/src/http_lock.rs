//! [`LockBackend`] over the internal locks API.
//!
//! `POST locks` creates, `POST locks/{id}/unlock` releases and
//! `GET locks?path=&id=&cursor=&limit=` queries. Failures are logged with the
//! operation name and returned unchanged; nothing is retried.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tracing::{debug, warn};

use crate::client::InternalClient;
use crate::error::{LfsError, LfsResult};
use crate::lock::{
    Lock, LockBackend, LockList, LockRequest, LockResponse, LockVisitor, RefSpec, UnlockRequest,
};

/// Lock backend talking to the forge over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLockBackend {
    client: InternalClient,
}

impl HttpLockBackend {
    #[must_use]
    pub fn new(client: InternalClient) -> Self {
        Self { client }
    }

    async fn query_locks(&self, params: &[(&str, &str)]) -> LfsResult<(Vec<Lock>, String)> {
        let mut url = self.client.url("locks")?;
        url.query_pairs_mut().extend_pairs(params);

        let resp = self
            .client
            .request(Method::GET, url)
            .send()
            .await
            .inspect_err(|e| warn!(op = "list", error = %e, "lfs lock request failed"))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .inspect_err(|e| warn!(op = "list", error = %e, "lfs lock read failed"))?;
        if status != StatusCode::OK {
            warn!(op = "list", status = status.as_u16(), "lfs lock api returned error status");
            return Err(LfsError::from_status(status.as_u16()));
        }

        let list: LockList = serde_json::from_slice(&body)
            .inspect_err(|e| warn!(op = "list", error = %e, "lfs lock decode failed"))?;
        let locks = list.locks.into_iter().map(Lock::from).collect();
        Ok((locks, list.next))
    }

    async fn first_lock(&self, params: &[(&str, &str)]) -> LfsResult<Lock> {
        let (locks, _) = self.query_locks(params).await?;
        locks.into_iter().next().ok_or(LfsError::NotFound)
    }
}

#[async_trait]
impl LockBackend for HttpLockBackend {
    async fn create(&self, path: &str, refname: Option<&str>) -> LfsResult<Lock> {
        let body = LockRequest {
            path: path.to_string(),
            refspec: refname.map(|name| RefSpec {
                name: name.to_string(),
            }),
        };
        let resp = self
            .client
            .request(Method::POST, self.client.url("locks")?)
            .body(serde_json::to_vec(&body)?)
            .send()
            .await
            .inspect_err(|e| warn!(op = "create", error = %e, "lfs lock request failed"))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .inspect_err(|e| warn!(op = "create", error = %e, "lfs lock read failed"))?;
        if status != StatusCode::CREATED {
            warn!(op = "create", status = status.as_u16(), path, "lfs lock api returned error status");
            return Err(LfsError::from_status(status.as_u16()));
        }

        let created: LockResponse = serde_json::from_slice(&bytes)
            .inspect_err(|e| warn!(op = "create", error = %e, "lfs lock decode failed"))?;
        let Some(lock) = created.lock else {
            warn!(op = "create", "api returned nil lock");
            return Err(LfsError::NilLock);
        };
        let lock = Lock::from(lock);
        debug!(id = %lock.id, path = %lock.path, "created lfs lock");
        Ok(lock)
    }

    async fn unlock(&self, id: &str, force: bool) -> LfsResult<()> {
        let url = self.client.url(&format!("locks/{id}/unlock"))?;
        let resp = self
            .client
            .request(Method::POST, url)
            .body(serde_json::to_vec(&UnlockRequest { force })?)
            .send()
            .await
            .inspect_err(|e| warn!(op = "unlock", error = %e, "lfs lock request failed"))?;
        let status = resp.status();
        if status != StatusCode::OK {
            warn!(op = "unlock", status = status.as_u16(), id, "lfs lock api returned error status");
            return Err(LfsError::from_status(status.as_u16()));
        }
        debug!(id, "released lfs lock");
        Ok(())
    }

    async fn from_path(&self, path: &str) -> LfsResult<Lock> {
        self.first_lock(&[("path", path)]).await
    }

    async fn from_id(&self, id: &str) -> LfsResult<Lock> {
        self.first_lock(&[("id", id)]).await
    }

    async fn range(
        &self,
        cursor: &str,
        limit: usize,
        visit: &mut LockVisitor<'_>,
    ) -> LfsResult<String> {
        let limit = limit.to_string();
        let mut params = vec![("limit", limit.as_str())];
        if !cursor.is_empty() {
            params.push(("cursor", cursor));
        }

        let (locks, next) = self.query_locks(&params).await?;
        for lock in locks {
            visit(lock)?;
        }
        Ok(next)
    }
}
