//! Local account creation.
//!
//! Used by authenticators that create a shadow user the first time an
//! external identity signs in, and by reverse proxy auto-registration.

use std::sync::LazyLock;

use regex::Regex;

use crate::AuthResult;
use crate::error::AuthError;
use crate::password::hash_password;
use crate::services::AuthServices;
use crate::types::{EmailAddress, NewUser, User, UserType};

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("Invalid email regex")
});

static USERNAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\-]+$").expect("Invalid username regex"));

/// Returns `true` if `email` is a syntactically valid address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Returns `true` if `name` may be used as a user name.
#[must_use]
pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && USERNAME_REGEX.is_match(name)
        && !name.starts_with(['.', '-'])
        && !name.ends_with(['.', '-'])
}

/// Creates a user and its primary email address in one storage write.
///
/// The plaintext password, if any, is hashed before storage. A taken
/// address leaves no user behind.
///
/// # Errors
///
/// Returns `AuthError::InvalidUserName` for an unusable name, or the
/// storage error for a taken name or address.
pub async fn create_user(services: &AuthServices, new_user: NewUser) -> AuthResult<User> {
    let name = new_user.name.trim().to_string();
    if !is_valid_username(&name) {
        return Err(AuthError::InvalidUserName { name });
    }

    let passwd = new_user
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(hash_password)
        .transpose()?;

    let user = User {
        id: 0,
        lower_name: name.to_lowercase(),
        name,
        full_name: new_user.full_name,
        email: new_user.email.trim().to_string(),
        passwd,
        login_type: new_user.login_type,
        login_source: new_user.login_source,
        login_name: new_user.login_name,
        user_type: UserType::Individual,
        is_active: new_user.is_active,
        is_admin: false,
        prohibit_login: false,
        created_unix: 0,
        updated_unix: 0,
    };
    let address = EmailAddress {
        id: 0,
        uid: 0,
        email: user.email.clone(),
        lower_email: user.email.to_lowercase(),
        is_activated: user.is_active,
        is_primary: true,
    };
    let (user, _) = services.users.create_with_email(&user, &address).await?;

    tracing::info!(
        uid = user.id,
        name = %user.name,
        login_type = ?user.login_type,
        login_source = user.login_source,
        "created user"
    );
    Ok(user)
}
