//! Long-lived auth tokens (the "remember me" cookie).
//!
//! A token is presented as `<id>:<secret>`. Only the SHA-256 of the secret
//! is stored, so the plaintext is returned exactly once by
//! [`create_auth_token`] and [`regenerate_auth_token`].

use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::AuthResult;
use crate::error::AuthError;
use crate::services::AuthServices;
use crate::types::{AuthToken, now_unix};

const TOKEN_ID_LENGTH: usize = 10;
const TOKEN_SECRET_BYTES: usize = 32;

fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_ID_LENGTH)
        .map(char::from)
        .collect()
}

fn generate_secret() -> String {
    let bytes: [u8; TOKEN_SECRET_BYTES] = rand::random();
    hex::encode(bytes)
}

/// SHA-256 of `secret`, hex encoded.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

fn expiry(services: &AuthServices) -> i64 {
    let ttl = i64::try_from(services.config.remember_duration.as_secs()).unwrap_or(i64::MAX);
    now_unix().saturating_add(ttl)
}

/// Issues a new token for `user_id`.
///
/// Returns the stored token and the `<id>:<secret>` value to hand to the client.
pub async fn create_auth_token(
    services: &AuthServices,
    user_id: i64,
) -> AuthResult<(AuthToken, String)> {
    let secret = generate_secret();
    let token = AuthToken {
        id: generate_id(),
        token_hash: hash_secret(&secret),
        user_id,
        expires_unix: expiry(services),
    };
    services.auth_tokens.insert(&token).await?;
    tracing::debug!(user_id, token_id = %token.id, "issued auth token");

    let plaintext = format!("{}:{secret}", token.id);
    Ok((token, plaintext))
}

/// Validates a presented `<id>:<secret>` value.
///
/// An empty value means no token was presented and yields `Ok(None)`.
///
/// # Errors
///
/// - `AuthTokenInvalidFormat` when the separator is missing
/// - `AuthTokenExpired` when the id is unknown or the token has expired
/// - `AuthTokenInvalidHash` when the secret does not match
pub async fn check_auth_token(services: &AuthServices, raw: &str) -> AuthResult<Option<AuthToken>> {
    if raw.is_empty() {
        return Ok(None);
    }
    let (id, secret) = raw
        .split_once(':')
        .ok_or(AuthError::AuthTokenInvalidFormat)?;

    let token = services
        .auth_tokens
        .find_by_id(id)
        .await?
        .filter(|t| !t.is_expired_at(now_unix()))
        .ok_or(AuthError::AuthTokenExpired)?;

    let presented = hash_secret(secret);
    if !bool::from(presented.as_bytes().ct_eq(token.token_hash.as_bytes())) {
        return Err(AuthError::AuthTokenInvalidHash);
    }
    Ok(Some(token))
}

/// Replaces the secret and expiry of an existing token.
///
/// The old secret stops working as soon as the single update lands.
///
/// # Errors
///
/// Returns `AuthError::AuthTokenNotExist` if the token was deleted meanwhile.
pub async fn regenerate_auth_token(
    services: &AuthServices,
    token: &AuthToken,
) -> AuthResult<(AuthToken, String)> {
    let secret = generate_secret();
    let updated = AuthToken {
        id: token.id.clone(),
        token_hash: hash_secret(&secret),
        user_id: token.user_id,
        expires_unix: expiry(services),
    };
    if !services.auth_tokens.update(&updated).await? {
        return Err(AuthError::AuthTokenNotExist {
            id: token.id.clone(),
        });
    }

    let plaintext = format!("{}:{secret}", updated.id);
    Ok((updated, plaintext))
}

pub async fn delete_auth_token_by_id(services: &AuthServices, id: &str) -> AuthResult<()> {
    services.auth_tokens.delete_by_id(id).await
}

/// Revokes every token of a user, e.g. on password change.
pub async fn delete_auth_tokens_by_user_id(services: &AuthServices, user_id: i64) -> AuthResult<u64> {
    let deleted = services.auth_tokens.delete_by_user_id(user_id).await?;
    tracing::debug!(user_id, deleted, "revoked auth tokens");
    Ok(deleted)
}

/// Removes every expired token.
pub async fn delete_expired_auth_tokens(services: &AuthServices) -> AuthResult<u64> {
    let deleted = services.auth_tokens.delete_expired(now_unix()).await?;
    if deleted > 0 {
        tracing::info!(deleted, "removed expired auth tokens");
    }
    Ok(deleted)
}
