//! Personal access token record.

use serde::{Deserialize, Serialize};

use crate::token::scope::AccessTokenScope;

/// A stored personal access token.
///
/// The token is looked up by its last eight characters and confirmed by
/// comparing the salted hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: i64,
    pub uid: i64,
    pub name: String,
    /// SHA-256 hex digest of `token_salt || token`.
    pub token_hash: String,
    pub token_salt: String,
    pub token_last_eight: String,
    pub scope: AccessTokenScope,
    pub created_unix: i64,
    pub updated_unix: i64,
}
