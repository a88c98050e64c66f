//! Password sign-in and post-sign-in session handling.

use forge_session::{Provider, RawStore, SessionValue, generate_sid};

use crate::AuthResult;
use crate::error::AuthError;
use crate::services::AuthServices;
use crate::source::{Source, active_sources, get_source_by_id};
use crate::token::auth_token::hash_secret;
use crate::types::User;

/// Session keys that must not survive a sign-in.
const STALE_SESSION_KEYS: [&str; 8] = [
    "openid_verified_uri",
    "openid_signin_remember",
    "openid_determined_email",
    "openid_determined_username",
    "twofaUid",
    "twofaRemember",
    "webauthnAssertion",
    "linkAccount",
];

pub const SESSION_KEY_UID: &str = "uid";
pub const SESSION_KEY_UNAME: &str = "uname";
pub const SESSION_KEY_CSRF: &str = "_csrf";

/// Resolves the local account named by `username`, if any.
async fn find_local_user(services: &AuthServices, username: &str) -> AuthResult<Option<User>> {
    if username.contains('@') {
        let lower_email = username.trim().to_lowercase();
        return match services.emails.find_by_lower_email(&lower_email).await? {
            Some(address) if !address.is_activated => Err(AuthError::email_not_exist(username)),
            Some(address) => services.users.find_by_id(address.uid).await,
            None => Ok(None),
        };
    }

    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(AuthError::user_not_exist(username));
    }
    services.users.find_by_lower_name(&trimmed.to_lowercase()).await
}

/// Authenticates a login/password pair.
///
/// A known account is checked against its own source only. Otherwise
/// every active source gets a chance to authenticate, and possibly
/// provision, the login; the first success wins.
///
/// Account activation is not checked here so the caller can offer to
/// resend the confirmation mail.
///
/// # Errors
///
/// - `EmailAddressNotExist` / `UserNotExist` when nothing authenticates the login
/// - `AuthSourceNotActivated` when the account's source is disabled
/// - `UnsupportedLoginType` when the account's source cannot check passwords
/// - `UserProhibitLogin` when the account is locked
/// - the authenticator's error for a known account
pub async fn user_sign_in(
    services: &AuthServices,
    username: &str,
    password: &str,
) -> AuthResult<(User, Source)> {
    if let Some(user) = find_local_user(services, username).await? {
        let source = get_source_by_id(services, user.login_source).await?;
        if !source.is_active {
            return Err(AuthError::AuthSourceNotActivated);
        }
        let authenticator = source
            .cfg
            .as_password_authenticator()
            .ok_or(AuthError::UnsupportedLoginType)?;

        let login = user.login_name.clone();
        let user = authenticator
            .authenticate(services, &source, Some(user), &login, password)
            .await?;
        if user.prohibit_login {
            return Err(AuthError::UserProhibitLogin {
                uid: user.id,
                name: user.name,
            });
        }
        return Ok((user, source));
    }

    for source in active_sources(services).await? {
        let Some(authenticator) = source.cfg.as_password_authenticator() else {
            continue;
        };
        let err = match authenticator
            .authenticate(services, &source, None, username, password)
            .await
        {
            Ok(user) if !user.prohibit_login => return Ok((user, source)),
            Ok(user) => AuthError::UserProhibitLogin {
                uid: user.id,
                name: user.name,
            },
            Err(err) => err,
        };

        if matches!(err, AuthError::UserNotExist { .. }) {
            tracing::debug!(login = %username, source = %source.name, error = %err, "failed to sign in");
        } else {
            tracing::warn!(login = %username, source = %source.name, error = %err, "failed to sign in");
        }
    }

    if username.contains('@') {
        Err(AuthError::email_not_exist(username))
    } else {
        Err(AuthError::user_not_exist(username))
    }
}

/// Starts a fresh session for a user who just signed in.
///
/// The session id is regenerated so a pre-login id cannot be fixated,
/// leftovers of half-finished flows are dropped, and a new CSRF token is
/// issued. The returned store is already released.
pub async fn handle_sign_in(
    provider: &dyn Provider,
    store: &dyn RawStore,
    user: &User,
) -> AuthResult<Box<dyn RawStore>> {
    let session = provider.regenerate(store.id(), &generate_sid()).await?;
    for key in STALE_SESSION_KEYS {
        session.delete(key);
    }
    session.set(SESSION_KEY_UID, SessionValue::Int(user.id));
    session.set(SESSION_KEY_UNAME, SessionValue::from(user.name.as_str()));
    session.set(SESSION_KEY_CSRF, SessionValue::from(new_csrf_token()));
    session.release().await?;

    tracing::debug!(uid = user.id, "started signed-in session");
    Ok(session)
}

fn new_csrf_token() -> String {
    let seed: [u8; 32] = rand::random();
    hash_secret(&hex::encode(seed))
}
