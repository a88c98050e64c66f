//! WebAuthn credentials.
//!
//! Authenticators report a signature counter with every assertion. A counter
//! that fails to advance means the private key may have been cloned.

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;

/// A registered WebAuthn credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAuthnCredential {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub lower_name: String,
    pub credential_id: Vec<u8>,
    pub public_key: Vec<u8>,
    pub attestation_type: String,
    pub aaguid: Vec<u8>,
    pub sign_count: u32,
    /// Set once a non-advancing counter has been observed.
    pub clone_warning: bool,
    pub created_unix: i64,
    pub updated_unix: i64,
}

impl WebAuthnCredential {
    /// Applies a counter reported by an assertion.
    ///
    /// Counters of zero on both sides mean the authenticator does not keep
    /// one, which is accepted.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::WebAuthnCloneDetected` and sets `clone_warning`
    /// if the reported counter does not exceed the stored one.
    pub fn apply_sign_count(&mut self, reported: u32) -> AuthResult<()> {
        if (reported != 0 || self.sign_count != 0) && reported <= self.sign_count {
            self.clone_warning = true;
            return Err(AuthError::WebAuthnCloneDetected {
                stored: self.sign_count,
                reported,
            });
        }
        self.sign_count = reported;
        Ok(())
    }
}
