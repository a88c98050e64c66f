//! Personal access tokens.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::AuthResult;
use crate::error::AuthError;
use crate::services::AuthServices;
use crate::token::scope::AccessTokenScope;
use crate::types::{AccessToken, now_unix};

const TOKEN_BYTES: usize = 20;
const SALT_BYTES: usize = 10;

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(salt: &str, token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn last_eight(token: &str) -> &str {
    &token[token.len().saturating_sub(8)..]
}

/// Creates a token for `uid` with a normalized `scope`.
///
/// The returned plaintext is 40 hex characters and is not stored.
///
/// # Errors
///
/// Returns `AuthError::InvalidScope` if `scope` does not parse.
pub async fn create_access_token(
    services: &AuthServices,
    uid: i64,
    name: &str,
    scope: &str,
) -> AuthResult<(AccessToken, String)> {
    let scope = AccessTokenScope::parse(scope)?;
    let plaintext = random_hex(TOKEN_BYTES);
    let salt = random_hex(SALT_BYTES);

    let token = services
        .access_tokens
        .create(&AccessToken {
            id: 0,
            uid,
            name: name.to_string(),
            token_hash: hash_token(&salt, &plaintext),
            token_salt: salt,
            token_last_eight: last_eight(&plaintext).to_string(),
            scope,
            created_unix: 0,
            updated_unix: 0,
        })
        .await?;
    tracing::info!(uid, token_id = token.id, scope = %token.scope, "created access token");
    Ok((token, plaintext))
}

/// Resolves a presented personal access token.
///
/// A successful lookup refreshes the token's last-used time.
///
/// # Errors
///
/// Returns `AuthError::AccessTokenNotExist` when nothing matches.
pub async fn get_access_token_by_sha(services: &AuthServices, presented: &str) -> AuthResult<AccessToken> {
    if presented.len() < 8 || !presented.is_ascii() {
        return Err(AuthError::AccessTokenNotExist);
    }

    let candidates = services
        .access_tokens
        .find_by_last_eight(last_eight(presented))
        .await?;
    for token in candidates {
        let hash = hash_token(&token.token_salt, presented);
        if bool::from(hash.as_bytes().ct_eq(token.token_hash.as_bytes())) {
            services.access_tokens.touch(token.id, now_unix()).await?;
            return Ok(token);
        }
    }
    Err(AuthError::AccessTokenNotExist)
}
