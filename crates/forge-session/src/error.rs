//! Session error types.

/// Errors raised by session providers and stores.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Regeneration target already holds a session.
    #[error("new sid '{sid}' already exists")]
    AlreadyExists {
        /// The colliding session id.
        sid: String,
    },

    /// A session id failed validation.
    #[error("invalid session id: {sid}")]
    InvalidSid {
        /// The offending session id.
        sid: String,
    },

    /// Session payload could not be encoded or decoded.
    #[error("session codec error: {message}")]
    Codec {
        /// Description of the codec failure.
        message: String,
    },

    /// The backing medium failed.
    #[error("session backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },

    /// The provider configuration is unusable.
    #[error("session configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },
}

impl SessionError {
    /// Creates a new `Codec` error.
    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns `true` if this is an `AlreadyExists` error.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<redis::RedisError> for SessionError {
    fn from(err: redis::RedisError) -> Self {
        Self::backend(format!("redis: {err}"))
    }
}

impl From<deadpool_redis::PoolError> for SessionError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::backend(format!("redis pool: {err}"))
    }
}

impl From<rmp_serde::encode::Error> for SessionError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::codec(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SessionError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::codec(err.to_string())
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
