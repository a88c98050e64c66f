//! Error types for the LFS transfer bridge.

use crate::lock::Lock;

/// Errors raised by the pktline codec, the protocol processor and the
/// HTTP backends.
#[derive(Debug, thiserror::Error)]
pub enum LfsError {
    /// The requested lock or object does not exist.
    #[error("not found")]
    NotFound,

    /// A lock already exists. Carries the existing lock when it is known.
    #[error("conflict")]
    Conflict {
        /// The conflicting lock.
        lock: Option<Box<Lock>>,
    },

    /// The caller may not perform this operation.
    #[error("forbidden")]
    Forbidden,

    /// The caller's credentials were rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// A request or response could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The peer violated the transfer protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The internal API answered with an unmapped status code.
    #[error("server returned status {0}")]
    Status(u16),

    /// The internal API answered 201 without a lock object.
    #[error("api returned nil lock")]
    NilLock,

    /// Uploaded data did not hash to the announced object id.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// HTTP transport failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stream I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON body could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL could not be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl LfsError {
    /// Create a `Parse` error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Create a `Protocol` error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Maps a non-success status of the internal API onto an error.
    #[must_use]
    pub fn from_status(code: u16) -> Self {
        match code {
            400 => Self::parse("bad request"),
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            409 => Self::Conflict { lock: None },
            _ => Self::Status(code),
        }
    }

    /// Status code reported to the git-lfs client for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict { .. } => 409,
            Self::Forbidden => 403,
            Self::Unauthorized => 401,
            Self::Parse(_) | Self::CorruptData(_) => 400,
            _ => 500,
        }
    }
}

/// Result type for LFS operations.
pub type LfsResult<T> = Result<T, LfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status() {
        assert!(matches!(LfsError::from_status(400), LfsError::Parse(_)));
        assert!(matches!(LfsError::from_status(401), LfsError::Unauthorized));
        assert!(matches!(LfsError::from_status(403), LfsError::Forbidden));
        assert!(matches!(LfsError::from_status(404), LfsError::NotFound));
        assert!(matches!(
            LfsError::from_status(409),
            LfsError::Conflict { lock: None }
        ));
        assert_eq!(
            LfsError::from_status(502).to_string(),
            "server returned status 502"
        );
    }

    #[test]
    fn test_status_code_roundtrip() {
        for code in [400, 401, 403, 404, 409] {
            assert_eq!(LfsError::from_status(code).status_code(), code);
        }
        assert_eq!(LfsError::from_status(418).status_code(), 500);
        assert_eq!(LfsError::NilLock.status_code(), 500);
        assert_eq!(LfsError::CorruptData("x".into()).status_code(), 400);
    }
}
