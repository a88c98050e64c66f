//! User accounts and email addresses.

use serde::{Deserialize, Serialize};

use crate::source::SourceType;

/// Kind of account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    #[default]
    Individual,
    Organization,
    Reserved,
    Bot,
}

impl UserType {
    /// Database discriminant.
    #[must_use]
    pub fn as_i16(self) -> i16 {
        match self {
            Self::Individual => 0,
            Self::Organization => 1,
            Self::Reserved => 2,
            Self::Bot => 4,
        }
    }

    /// Parses a database discriminant. Unknown values map to `Reserved`.
    #[must_use]
    pub fn from_i16(value: i16) -> Self {
        match value {
            0 => Self::Individual,
            1 => Self::Organization,
            4 => Self::Bot,
            _ => Self::Reserved,
        }
    }
}

/// A forge account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub lower_name: String,
    pub full_name: String,
    pub email: String,
    /// PHC-format password hash. `None` for accounts without a local password.
    #[serde(skip_serializing)]
    pub passwd: Option<String>,
    /// Kind of source the account signs in through.
    pub login_type: SourceType,
    /// Id of the source the account signs in through. `0` is the local database.
    pub login_source: i64,
    /// Identity at the source, which may differ from `name`.
    pub login_name: String,
    pub user_type: UserType,
    pub is_active: bool,
    pub is_admin: bool,
    /// Administratively locked.
    pub prohibit_login: bool,
    pub created_unix: i64,
    pub updated_unix: i64,
}

impl User {
    #[must_use]
    pub fn is_individual(&self) -> bool {
        self.user_type == UserType::Individual
    }

    /// Returns `true` if the account authenticates against the local database.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self.login_type, SourceType::NoType | SourceType::Plain)
    }
}

/// Input for creating an account.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub name: String,
    pub full_name: String,
    pub email: String,
    /// Plaintext password, hashed on creation.
    pub password: Option<String>,
    pub login_type: SourceType,
    pub login_source: i64,
    pub login_name: String,
    pub is_active: bool,
}

/// An email address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub id: i64,
    pub uid: i64,
    pub email: String,
    pub lower_email: String,
    pub is_activated: bool,
    pub is_primary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_type_discriminants() {
        for kind in [
            UserType::Individual,
            UserType::Organization,
            UserType::Reserved,
            UserType::Bot,
        ] {
            assert_eq!(UserType::from_i16(kind.as_i16()), kind);
        }
        assert_eq!(UserType::from_i16(42), UserType::Reserved);
    }
}
