//! Session values and their binary encoding.
//!
//! Every stored value carries its own type discriminator: [`SessionValue`] is
//! a closed sum type and MessagePack encodes the variant name next to the
//! payload. Decoding a session therefore never depends on a process-wide
//! registration step having happened first.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SessionResult;

/// The key/value bag held by one session.
pub type SessionMap = BTreeMap<String, SessionValue>;

/// A single value stored in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionValue {
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<SessionValue>),
    Map(BTreeMap<String, SessionValue>),
}

impl SessionValue {
    /// Returns the integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Encodes a session map.
///
/// # Errors
///
/// Returns `SessionError::Codec` if serialization fails.
pub fn encode(data: &SessionMap) -> SessionResult<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(data)?)
}

/// Decodes a session map. An empty payload decodes to an empty map.
///
/// # Errors
///
/// Returns `SessionError::Codec` if the payload is not a valid session.
pub fn decode(bytes: &[u8]) -> SessionResult<SessionMap> {
    if bytes.is_empty() {
        return Ok(SessionMap::new());
    }
    Ok(rmp_serde::from_slice(bytes)?)
}
