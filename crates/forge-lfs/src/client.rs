//! Authenticated client for the forge's internal LFS API.
//!
//! All requests carry the user's `Authorization` token and the
//! `X-Forge-Internal-Auth` header proving the caller is a forge process.

use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use url::Url;

use crate::error::LfsResult;

/// Media type of LFS API bodies.
pub const MIME_GIT_LFS: &str = "application/vnd.git-lfs+json";

/// Header carrying the internal API token.
pub const HEADER_INTERNAL_AUTH: &str = "X-Forge-Internal-Auth";

/// Connection settings for the internal LFS API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the internal repository API, e.g. `http://127.0.0.1:3000/api/internal/repo/`.
    pub server_url: Url,
    /// Repository as `owner/name`.
    pub repo: String,
    /// Value of the `Authorization` header.
    pub auth_token: String,
    /// Value of the internal auth header.
    pub internal_token: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    #[must_use]
    pub fn new(server_url: Url, repo: impl Into<String>) -> Self {
        Self {
            server_url,
            repo: repo.into(),
            auth_token: String::new(),
            internal_token: String::new(),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    #[must_use]
    pub fn with_internal_token(mut self, token: impl Into<String>) -> Self {
        self.internal_token = token.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client bound to one repository's LFS endpoint.
#[derive(Debug, Clone)]
pub struct InternalClient {
    http: reqwest::Client,
    base: Url,
    auth_token: String,
    internal_token: String,
}

impl InternalClient {
    /// Builds the client and resolves `<server>/<owner>/<repo>.git/info/lfs/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built or the HTTP client fails
    /// to initialise.
    pub fn new(config: &ClientConfig) -> LfsResult<Self> {
        let mut server = config.server_url.clone();
        if !server.path().ends_with('/') {
            server.set_path(&format!("{}/", server.path()));
        }
        let repo = config.repo.trim_matches('/').trim_end_matches(".git");
        let base = server.join(&format!("{repo}.git/info/lfs/"))?;

        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base,
            auth_token: config.auth_token.clone(),
            internal_token: config.internal_token.clone(),
        })
    }

    /// The resolved LFS base URL.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolves `path` against the LFS base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` does not form a valid URL.
    pub fn url(&self, path: &str) -> LfsResult<Url> {
        Ok(self.base.join(path)?)
    }

    /// Starts a request with the authentication and LFS media type headers.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(AUTHORIZATION, &self.auth_token)
            .header(HEADER_INTERNAL_AUTH, &self.internal_token)
            .header(ACCEPT, MIME_GIT_LFS)
            .header(CONTENT_TYPE, MIME_GIT_LFS)
    }

    /// Starts a request to an action href handed out by the batch API.
    ///
    /// Action hrefs carry their own headers, so only those are sent.
    pub fn action_request(&self, method: Method, href: Url) -> RequestBuilder {
        self.http.request(method, href)
    }
}
