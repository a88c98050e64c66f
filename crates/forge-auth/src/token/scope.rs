//! Access token scopes.
//!
//! A scope string is a comma separated list of `read:<category>`,
//! `write:<category>`, `all` and `public-only`. Internally a scope is a
//! bitmap with a read and a write bit per category; write implies read and
//! `all` is write on every category. `public-only` is orthogonal to the
//! categories.
//!
//! The canonical form puts the special tokens first (`public-only`, then
//! `all`), followed by the categories alphabetically, each once at its
//! strongest level. Write on every category is spelled `all`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;

/// Scope categories in canonical order.
pub const CATEGORIES: [&str; 9] = [
    "activitypub",
    "admin",
    "issue",
    "misc",
    "notification",
    "organization",
    "package",
    "repository",
    "user",
];

pub const SCOPE_ALL: &str = "all";
pub const SCOPE_PUBLIC_ONLY: &str = "public-only";

const PUBLIC_ONLY_BIT: u32 = 1 << (2 * CATEGORIES.len());

const fn read_bit(index: usize) -> u32 {
    1 << (2 * index)
}

const fn write_bit(index: usize) -> u32 {
    1 << (2 * index + 1)
}

const fn all_bits() -> u32 {
    let mut bits = 0;
    let mut i = 0;
    while i < CATEGORIES.len() {
        bits |= read_bit(i) | write_bit(i);
        i += 1;
    }
    bits
}

const ALL_BITS: u32 = all_bits();

/// Parsed form of a scope string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScopeBitmap(u32);

impl ScopeBitmap {
    fn parse(scope: &str) -> AuthResult<Self> {
        let mut bits = 0;
        for token in scope.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            bits |= match token {
                SCOPE_ALL => ALL_BITS,
                SCOPE_PUBLIC_ONLY => PUBLIC_ONLY_BIT,
                _ => {
                    let (level, category) = token
                        .split_once(':')
                        .ok_or_else(|| AuthError::invalid_scope(token))?;
                    let index = CATEGORIES
                        .iter()
                        .position(|c| *c == category)
                        .ok_or_else(|| AuthError::invalid_scope(token))?;
                    match level {
                        "read" => read_bit(index),
                        "write" => read_bit(index) | write_bit(index),
                        _ => return Err(AuthError::invalid_scope(token)),
                    }
                }
            };
        }
        Ok(Self(bits))
    }

    fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn to_canonical(self) -> String {
        let mut tokens = Vec::new();
        if self.0 & PUBLIC_ONLY_BIT != 0 {
            tokens.push(SCOPE_PUBLIC_ONLY.to_string());
        }
        if self.contains(Self(ALL_BITS)) {
            tokens.push(SCOPE_ALL.to_string());
            return tokens.join(",");
        }
        for (index, category) in CATEGORIES.iter().enumerate() {
            if self.0 & write_bit(index) != 0 {
                tokens.push(format!("write:{category}"));
            } else if self.0 & read_bit(index) != 0 {
                tokens.push(format!("read:{category}"));
            }
        }
        tokens.join(",")
    }
}

/// Permissions granted to a personal access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessTokenScope(String);

impl AccessTokenScope {
    /// Wraps a raw scope string without validating it.
    #[must_use]
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    /// Parses and canonicalizes a scope string.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidScope` for an unknown token.
    pub fn parse(scope: &str) -> AuthResult<Self> {
        Ok(Self(ScopeBitmap::parse(scope)?.to_canonical()))
    }

    /// Returns the canonical form of this scope.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidScope` for an unknown token.
    pub fn normalize(&self) -> AuthResult<Self> {
        Self::parse(&self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this scope grants everything `required` does.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidScope` if either scope is malformed.
    pub fn has_scope(&self, required: &str) -> AuthResult<bool> {
        Ok(ScopeBitmap::parse(&self.0)?.contains(ScopeBitmap::parse(required)?))
    }

    /// Returns `true` if this scope grants at least one of `required`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidScope` if any scope is malformed.
    pub fn has_any_scope(&self, required: &[&str]) -> AuthResult<bool> {
        let granted = ScopeBitmap::parse(&self.0)?;
        for scope in required {
            if granted.contains(ScopeBitmap::parse(scope)?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Returns `true` if the token is restricted to public resources.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidScope` if the scope is malformed.
    pub fn public_only(&self) -> AuthResult<bool> {
        self.has_scope(SCOPE_PUBLIC_ONLY)
    }
}

impl fmt::Display for AccessTokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
