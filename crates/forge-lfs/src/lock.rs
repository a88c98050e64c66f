//! LFS locks and the backend that stores them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::LfsResult;

/// Owner name the bridge reports for itself.
///
/// The transfer process runs as one pre-authenticated principal, so lock
/// ownership is judged against this fixed name rather than a per-request user.
pub const CURRENT_USER: &str = "(self)";

/// Owner name used when the API omits the lock owner.
pub const UNKNOWN_OWNER: &str = "unknown";

/// A lock on a repository path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub id: String,
    pub path: String,
    pub locked_at: OffsetDateTime,
    pub owner: String,
}

impl Lock {
    /// Lock time as RFC 3339 in UTC with whole seconds.
    #[must_use]
    pub fn formatted_timestamp(&self) -> String {
        let utc = self.locked_at.to_offset(time::UtcOffset::UTC);
        let utc = utc.replace_nanosecond(0).unwrap_or(utc);
        utc.format(&Rfc3339).unwrap_or_default()
    }

    /// Whether the lock belongs to [`CURRENT_USER`].
    #[must_use]
    pub fn is_ours(&self) -> bool {
        self.owner == CURRENT_USER
    }

    /// Lines describing this lock in a `list-lock` response.
    ///
    /// With `owner_id` the `owner <id> ours|theirs` line is appended.
    #[must_use]
    pub fn as_lock_spec(&self, owner_id: bool) -> Vec<String> {
        let mut lines = vec![
            format!("lock {}", self.id),
            format!("path {} {}", self.id, self.path),
            format!("locked-at {} {}", self.id, self.formatted_timestamp()),
            format!("ownername {} {}", self.id, self.owner),
        ];
        if owner_id {
            let who = if self.is_ours() { "ours" } else { "theirs" };
            lines.push(format!("owner {} {}", self.id, who));
        }
        lines
    }

    /// Key/value arguments describing this lock in `lock` and `unlock` responses.
    #[must_use]
    pub fn as_arguments(&self) -> Vec<String> {
        vec![
            format!("id={}", self.id),
            format!("path={}", self.path),
            format!("locked-at={}", self.formatted_timestamp()),
            format!("ownername={}", self.owner),
        ]
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Lock as returned by the locks API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLock {
    pub id: String,
    pub path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub locked_at: OffsetDateTime,
    #[serde(default)]
    pub owner: Option<ApiLockOwner>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiLockOwner {
    pub name: String,
}

impl From<ApiLock> for Lock {
    fn from(lock: ApiLock) -> Self {
        Self {
            id: lock.id,
            path: lock.path,
            locked_at: lock.locked_at,
            owner: lock
                .owner
                .map_or_else(|| UNKNOWN_OWNER.to_string(), |owner| owner.name),
        }
    }
}

/// Body of `POST /locks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub path: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub refspec: Option<RefSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefSpec {
    pub name: String,
}

/// Response of `POST /locks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockResponse {
    #[serde(default)]
    pub lock: Option<ApiLock>,
}

/// Response of `GET /locks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockList {
    #[serde(default)]
    pub locks: Vec<ApiLock>,
    #[serde(default, rename = "next_cursor", skip_serializing_if = "String::is_empty")]
    pub next: String,
}

/// Body of `POST /locks/{id}/unlock`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub force: bool,
}

// =============================================================================
// Backend
// =============================================================================

/// Visitor invoked per lock while paging through [`LockBackend::range`].
pub type LockVisitor<'a> = dyn FnMut(Lock) -> LfsResult<()> + Send + 'a;

/// Storage for locks, as seen by the transfer protocol.
#[async_trait]
pub trait LockBackend: Send + Sync {
    /// Creates a lock on `path`.
    async fn create(&self, path: &str, refname: Option<&str>) -> LfsResult<Lock>;

    /// Releases the lock `id`.
    async fn unlock(&self, id: &str, force: bool) -> LfsResult<()>;

    /// The lock on `path`, or `LfsError::NotFound`.
    async fn from_path(&self, path: &str) -> LfsResult<Lock>;

    /// The lock `id`, or `LfsError::NotFound`.
    async fn from_id(&self, id: &str) -> LfsResult<Lock>;

    /// Visits one page of locks starting at `cursor` and returns the cursor
    /// of the next page, empty when this was the last one. A visitor error
    /// stops the page and is returned.
    async fn range(&self, cursor: &str, limit: usize, visit: &mut LockVisitor<'_>)
    -> LfsResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn lock(owner: &str) -> Lock {
        Lock {
            id: "7".into(),
            path: "assets/logo.psd".into(),
            locked_at: datetime!(2026-03-01 12:30:45.250 +02:00),
            owner: owner.into(),
        }
    }

    #[test]
    fn test_lock_spec_lines() {
        assert_eq!(
            lock("mia").as_lock_spec(false),
            vec![
                "lock 7",
                "path 7 assets/logo.psd",
                "locked-at 7 2026-03-01T10:30:45Z",
                "ownername 7 mia",
            ]
        );
    }

    #[test]
    fn test_lock_spec_owner_line() {
        assert_eq!(lock("mia").as_lock_spec(true)[4], "owner 7 theirs");
        assert_eq!(lock(CURRENT_USER).as_lock_spec(true)[4], "owner 7 ours");
    }

    #[test]
    fn test_lock_arguments() {
        assert_eq!(
            lock("mia").as_arguments(),
            vec![
                "id=7",
                "path=assets/logo.psd",
                "locked-at=2026-03-01T10:30:45Z",
                "ownername=mia",
            ]
        );
    }

    #[test]
    fn test_api_lock_without_owner() {
        let api: ApiLock = serde_json::from_str(
            r#"{"id":"1","path":"a.bin","locked_at":"2026-01-02T03:04:05.123456Z"}"#,
        )
        .unwrap();
        let lock = Lock::from(api);
        assert_eq!(lock.owner, UNKNOWN_OWNER);
        assert_eq!(lock.formatted_timestamp(), "2026-01-02T03:04:05Z");
    }

    #[test]
    fn test_lock_list_cursor_name() {
        let list: LockList =
            serde_json::from_str(r#"{"locks":[],"next_cursor":"abc"}"#).unwrap();
        assert_eq!(list.next, "abc");
        let list: LockList = serde_json::from_str(r#"{"locks":[]}"#).unwrap();
        assert!(list.next.is_empty());
    }
}
