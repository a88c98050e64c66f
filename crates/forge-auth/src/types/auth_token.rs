//! Long-lived auth token record.
//!
//! The plaintext secret is handed to the client once and never stored. Only
//! its SHA-256 hex digest is persisted.

use serde::{Deserialize, Serialize};

/// A stored auth token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    /// Opaque public identifier, the part before `:`.
    pub id: String,
    /// SHA-256 hex digest of the secret.
    pub token_hash: String,
    pub user_id: i64,
    pub expires_unix: i64,
}

impl AuthToken {
    /// Returns `true` if the token expired at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_unix <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired_at() {
        let token = AuthToken {
            id: "id".into(),
            token_hash: "h".into(),
            user_id: 1,
            expires_unix: 100,
        };
        assert!(!token.is_expired_at(99));
        assert!(token.is_expired_at(100));
        assert!(token.is_expired_at(101));
    }
}
