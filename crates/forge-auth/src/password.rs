//! Argon2-based password hashing.
//!
//! Hashes are stored in PHC string format. Hashes produced by another
//! algorithm or with outdated Argon2 parameters are reported by
//! [`needs_rehash`] so sign-in can upgrade them transparently.

use argon2::{
    Algorithm, Argon2, Params,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::AuthResult;
use crate::error::AuthError;

/// Hash a password for storage using Argon2id with default parameters.
///
/// # Errors
///
/// Returns `AuthError::Internal` if hashing fails.
pub fn hash_password(password: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal(format!("failed to hash password: {e}")))
}

/// Verify a password against a stored PHC hash.
///
/// Returns `false` for unparseable hashes.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Returns `true` if `hash` was not produced with the current algorithm and parameters.
#[must_use]
pub fn needs_rehash(hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return true;
    };
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        return true;
    }
    let current = Params::default();
    match Params::try_from(&parsed) {
        Ok(params) => {
            params.m_cost() != current.m_cost()
                || params.t_cost() != current.t_cost()
                || params.p_cost() != current.p_cost()
        }
        Err(_) => true,
    }
}
