//! Links between local users and identities at external sources.

use serde::{Deserialize, Serialize};

/// A local user linked to an identity at an external source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLoginUser {
    /// Identity at the provider.
    pub external_id: String,
    pub user_id: i64,
    pub login_source_id: i64,
    pub provider: String,
    pub email: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Unix time the access token expires, if known.
    pub expires_at: Option<i64>,
}
