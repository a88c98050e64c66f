//! Domain types for authentication.

pub mod access_token;
pub mod auth_token;
pub mod external_login;
pub mod user;
pub mod webauthn;

pub use access_token::AccessToken;
pub use auth_token::AuthToken;
pub use external_login::ExternalLoginUser;
pub use user::{EmailAddress, NewUser, User, UserType};
pub use webauthn::WebAuthnCredential;

use time::OffsetDateTime;

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
