//! Classification of request paths.
//!
//! Credentials other than the session cookie are only honoured on paths
//! that non-browser clients use: the API, git smart HTTP, raw files,
//! attachments, archives and LFS.

use std::sync::LazyLock;

use axum::http::Method;
use axum::http::request::Parts;
use regex::Regex;

static GIT_RAW_OR_ATTACH_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^/[-.\w]+/[-.\w]+/(?:(?:git-(?:(?:upload)|(?:receive))-pack$)|(?:info/refs$)|(?:HEAD$)|(?:objects/)|(?:raw/)|(?:releases/download/)|(?:attachments/))",
    )
    .expect("Invalid git path regex")
});

static LFS_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[-.\w]+/[-.\w]+/info/lfs/").expect("Invalid LFS path regex"));

static ARCHIVE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[-.\w]+/[-.\w]+/archive/").expect("Invalid archive path regex"));

/// Answers path questions about one request.
#[derive(Debug, Clone, Copy)]
pub struct AuthPathDetector<'a> {
    method: &'a Method,
    path: &'a str,
    lfs_server_enabled: bool,
}

impl<'a> AuthPathDetector<'a> {
    #[must_use]
    pub fn new(parts: &'a Parts, lfs_server_enabled: bool) -> Self {
        Self {
            method: &parts.method,
            path: parts.uri.path(),
            lfs_server_enabled,
        }
    }

    #[must_use]
    pub fn is_api_path(&self) -> bool {
        self.path.starts_with("/api/")
    }

    /// A `GET` for an attachment by UUID.
    #[must_use]
    pub fn is_attachment_download(&self) -> bool {
        self.path.starts_with("/attachments/") && *self.method == Method::GET
    }

    #[must_use]
    pub fn is_container_path(&self) -> bool {
        self.path.starts_with("/v2/")
    }

    #[must_use]
    pub fn is_git_raw_or_attach_path(&self) -> bool {
        GIT_RAW_OR_ATTACH_PATH.is_match(self.path)
    }

    /// Like [`Self::is_git_raw_or_attach_path`], plus LFS paths when the
    /// LFS server is enabled.
    #[must_use]
    pub fn is_git_raw_or_attach_or_lfs_path(&self) -> bool {
        self.is_git_raw_or_attach_path() || (self.lfs_server_enabled && LFS_PATH.is_match(self.path))
    }

    #[must_use]
    pub fn is_archive_path(&self) -> bool {
        ARCHIVE_PATH.is_match(self.path)
    }

    #[must_use]
    pub fn is_authenticated_token_request(&self) -> bool {
        matches!(self.path, "/login/oauth/userinfo" | "/login/oauth/introspect")
    }
}
