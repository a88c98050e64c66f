//! Authentication error types.
//!
//! Not-exist errors are expected and drive control flow (falling through to
//! the next source, for example). Token format, hash and expiry errors are
//! distinguished here for logging but collapse into one generic response at
//! the HTTP boundary.

use forge_session::SessionError;

/// Errors that can occur during authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No user matches the given name or id.
    #[error("user does not exist [name: {name}]")]
    UserNotExist {
        /// The name that was looked up.
        name: String,
    },

    /// No activated email address matches.
    #[error("email address does not exist [email: {email}]")]
    EmailAddressNotExist {
        /// The address that was looked up.
        email: String,
    },

    /// A user with the same name already exists.
    #[error("user already exists [name: {name}]")]
    UserAlreadyExists {
        /// The conflicting name.
        name: String,
    },

    /// The name is not a valid user name.
    #[error("invalid user name [name: {name}]")]
    InvalidUserName {
        /// The rejected name.
        name: String,
    },

    /// The email address belongs to another account.
    #[error("email address is already used [email: {email}]")]
    EmailAddressAlreadyUsed {
        /// The conflicting address.
        email: String,
    },

    /// The account is locked or not allowed to sign in.
    #[error("user is not allowed to login [uid: {uid}, name: {name}]")]
    UserProhibitLogin {
        /// User id.
        uid: i64,
        /// User name.
        name: String,
    },

    /// The account has no local password.
    #[error("user password is not set [uid: {uid}, name: {name}]")]
    UserPasswordNotSet {
        /// User id.
        uid: i64,
        /// User name.
        name: String,
    },

    /// The supplied password does not match.
    #[error("user password is invalid [uid: {uid}, name: {name}]")]
    UserPasswordInvalid {
        /// User id.
        uid: i64,
        /// User name.
        name: String,
    },

    /// The token is not of the form `<id>:<secret>`.
    #[error("auth token has an invalid format")]
    AuthTokenInvalidFormat,

    /// The token secret does not match the stored hash.
    #[error("auth token hash does not match")]
    AuthTokenInvalidHash,

    /// The token expired or was never issued.
    #[error("auth token has expired")]
    AuthTokenExpired,

    /// No auth token with this id exists.
    #[error("auth token does not exist [id: {id}]")]
    AuthTokenNotExist {
        /// Token id.
        id: String,
    },

    /// No access token matches the presented value.
    #[error("access token does not exist")]
    AccessTokenNotExist,

    /// The authentication source is disabled.
    #[error("login source is not activated")]
    AuthSourceNotActivated,

    /// The source cannot authenticate passwords, or the remote server
    /// offers no usable mechanism.
    #[error("login source is unknown")]
    UnsupportedLoginType,

    /// No source with this id exists.
    #[error("login source does not exist [id: {id}]")]
    SourceNotExist {
        /// Source id.
        id: i64,
    },

    /// A source with the same name already exists.
    #[error("login source already exists [name: {name}]")]
    SourceAlreadyExists {
        /// The conflicting name.
        name: String,
    },

    /// The source is still referenced by users or external logins.
    #[error("login source is still used by {users} user(s) and {external_logins} external login(s) [id: {id}]")]
    SourceInUse {
        /// Source id.
        id: i64,
        /// Users whose login source is this source.
        users: u64,
        /// External logins linked to this source.
        external_logins: u64,
    },

    /// The scope string contains an unknown permission.
    #[error("invalid access token scope: {scope}")]
    InvalidScope {
        /// The offending scope fragment.
        scope: String,
    },

    /// No WebAuthn credential matches.
    #[error("webauthn credential does not exist")]
    WebAuthnCredentialNotExist,

    /// The user already has a credential with this name.
    #[error("webauthn credential already exists [name: {name}]")]
    WebAuthnCredentialExists {
        /// The conflicting name.
        name: String,
    },

    /// The authenticator reported a signature counter that did not advance.
    #[error("webauthn sign count did not increase (stored {stored}, reported {reported})")]
    WebAuthnCloneDetected {
        /// Counter value on record.
        stored: u32,
        /// Counter value reported by the authenticator.
        reported: u32,
    },

    /// Password basic auth is refused for accounts with a security key.
    #[error("basic authorization is not allowed while webauthn is enrolled [uid: {uid}]")]
    WebAuthnEnrolled {
        /// The user's ID.
        uid: i64,
    },

    /// The operation was cancelled before completion.
    #[error("cancelled: {message}")]
    Cancelled {
        /// What was about to happen.
        message: String,
    },

    /// Session persistence failed.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// An error occurred while storing or retrieving auth data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An external authentication service (SMTP, PAM, OAuth2) failed.
    #[error("{service} error: {message}")]
    External {
        /// The service that failed.
        service: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `UserNotExist` error.
    #[must_use]
    pub fn user_not_exist(name: impl Into<String>) -> Self {
        Self::UserNotExist { name: name.into() }
    }

    /// Creates a new `EmailAddressNotExist` error.
    #[must_use]
    pub fn email_not_exist(email: impl Into<String>) -> Self {
        Self::EmailAddressNotExist {
            email: email.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(scope: impl Into<String>) -> Self {
        Self::InvalidScope {
            scope: scope.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `External` error.
    #[must_use]
    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        Self::External {
            service,
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for the expected "nothing found" errors.
    #[must_use]
    pub fn is_not_exist(&self) -> bool {
        matches!(
            self,
            Self::UserNotExist { .. }
                | Self::EmailAddressNotExist { .. }
                | Self::AuthTokenNotExist { .. }
                | Self::AccessTokenNotExist
                | Self::SourceNotExist { .. }
                | Self::WebAuthnCredentialNotExist
        )
    }

    /// Returns `true` if the presented credential was rejected.
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::UserNotExist { .. }
                | Self::EmailAddressNotExist { .. }
                | Self::UserPasswordNotSet { .. }
                | Self::UserPasswordInvalid { .. }
                | Self::AuthTokenInvalidFormat
                | Self::AuthTokenInvalidHash
                | Self::AuthTokenExpired
                | Self::AuthTokenNotExist { .. }
                | Self::AccessTokenNotExist
        )
    }

    /// Returns `true` if the caller is identified but not allowed in.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(
            self,
            Self::UserProhibitLogin { .. }
                | Self::AuthSourceNotActivated
                | Self::UnsupportedLoginType
                | Self::WebAuthnCloneDetected { .. }
                | Self::WebAuthnEnrolled { .. }
        )
    }

    /// Returns `true` if this error is caused by the client rather than the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.is_credential_error()
            || self.is_forbidden()
            || matches!(
                self,
                Self::UserAlreadyExists { .. }
                    | Self::InvalidUserName { .. }
                    | Self::EmailAddressAlreadyUsed { .. }
                    | Self::SourceAlreadyExists { .. }
                    | Self::SourceInUse { .. }
                    | Self::SourceNotExist { .. }
                    | Self::InvalidScope { .. }
                    | Self::WebAuthnCredentialNotExist
                    | Self::WebAuthnCredentialExists { .. }
            )
    }
}
