//! Authentication sources.
//!
//! A [`Source`] is a configured identity provider. Its configuration is a
//! [`SourceConfig`], a closed sum type with one statically typed struct per
//! kind. Persistence goes through [`SourceConfig::to_db`] and
//! [`SourceConfig::from_db`], a single match over the source type.
//!
//! Capabilities are discovered per config:
//!
//! - [`PasswordAuthenticator`] for DB, SMTP and PAM sources
//! - [`SynchronizableSource`] for OAuth2 sources
//!
//! LDAP and SSPI configurations are stored and round-tripped but have no
//! authenticator in this crate.

pub mod db;
pub mod directory;
pub mod oauth2;
pub mod pam;
pub mod smtp;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::AuthResult;
use crate::error::AuthError;
use crate::services::AuthServices;
use crate::types::User;

pub use db::DbConfig;
pub use directory::{LdapConfig, SspiConfig};
pub use oauth2::OAuth2Config;
pub use pam::PamConfig;
pub use smtp::SmtpConfig;

// =============================================================================
// Source Type
// =============================================================================

/// Kind of authentication source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// Local accounts without an explicit source.
    #[default]
    NoType,
    Plain,
    Ldap,
    Smtp,
    Pam,
    DLdap,
    OAuth2,
    Sspi,
}

impl SourceType {
    /// Database discriminant.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::NoType => 0,
            Self::Plain => 1,
            Self::Ldap => 2,
            Self::Smtp => 3,
            Self::Pam => 4,
            Self::DLdap => 5,
            Self::OAuth2 => 6,
            Self::Sspi => 7,
        }
    }

    /// Parses a database discriminant.
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            0 => Self::NoType,
            1 => Self::Plain,
            2 => Self::Ldap,
            3 => Self::Smtp,
            4 => Self::Pam,
            5 => Self::DLdap,
            6 => Self::OAuth2,
            7 => Self::Sspi,
            _ => return None,
        })
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoType => "No Type",
            Self::Plain => "Plain",
            Self::Ldap => "LDAP (via BindDN)",
            Self::Smtp => "SMTP",
            Self::Pam => "PAM",
            Self::DLdap => "LDAP (simple auth)",
            Self::OAuth2 => "OAuth2",
            Self::Sspi => "SPNEGO with SSPI",
        })
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// A source that can check a login/password pair.
#[async_trait]
pub trait PasswordAuthenticator: Send + Sync {
    /// Authenticates `login` with `password`.
    ///
    /// `user` is the local account when one already matched; external
    /// sources create a shadow account when it is `None`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotExist` when the source does not know the
    /// login, or another error describing the failure.
    async fn authenticate(
        &self,
        services: &AuthServices,
        source: &Source,
        user: Option<User>,
        login: &str,
        password: &str,
    ) -> AuthResult<User>;
}

/// A source whose users can be synchronized in bulk.
#[async_trait]
pub trait SynchronizableSource: Send + Sync {
    /// Synchronizes the users of `source`.
    async fn sync(
        &self,
        services: &AuthServices,
        source: &Source,
        cancel: &CancellationToken,
        update_existing: bool,
    ) -> AuthResult<()>;
}

// =============================================================================
// Source Config
// =============================================================================

/// Per-kind source configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    Db(DbConfig),
    /// Shared by `Ldap` and `DLdap` sources.
    Ldap(LdapConfig),
    Smtp(SmtpConfig),
    Pam(PamConfig),
    OAuth2(OAuth2Config),
    Sspi(SspiConfig),
}

impl SourceConfig {
    /// The zero-value config for a source type.
    #[must_use]
    pub fn default_for(source_type: SourceType) -> Self {
        match source_type {
            SourceType::NoType | SourceType::Plain => Self::Db(DbConfig::default()),
            SourceType::Ldap | SourceType::DLdap => Self::Ldap(LdapConfig::default()),
            SourceType::Smtp => Self::Smtp(SmtpConfig::default()),
            SourceType::Pam => Self::Pam(PamConfig::default()),
            SourceType::OAuth2 => Self::OAuth2(OAuth2Config::default()),
            SourceType::Sspi => Self::Sspi(SspiConfig::default()),
        }
    }

    /// Returns `true` if this config is the one used by `source_type`.
    #[must_use]
    pub fn matches(&self, source_type: SourceType) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(&Self::default_for(source_type))
    }

    /// Serializes the config for storage.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if serialization fails.
    pub fn to_db(&self) -> AuthResult<Vec<u8>> {
        let encoded = match self {
            Self::Db(cfg) => serde_json::to_vec(cfg),
            Self::Ldap(cfg) => serde_json::to_vec(cfg),
            Self::Smtp(cfg) => serde_json::to_vec(cfg),
            Self::Pam(cfg) => serde_json::to_vec(cfg),
            Self::OAuth2(cfg) => serde_json::to_vec(cfg),
            Self::Sspi(cfg) => serde_json::to_vec(cfg),
        };
        encoded.map_err(|e| AuthError::internal(format!("failed to encode source config: {e}")))
    }

    /// Restores the config of a `source_type` source from storage.
    ///
    /// An empty blob yields the zero-value config.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Storage` if the blob does not decode as the
    /// config for `source_type`.
    pub fn from_db(source_type: SourceType, bytes: &[u8]) -> AuthResult<Self> {
        if bytes.is_empty() {
            return Ok(Self::default_for(source_type));
        }
        let decoded = match source_type {
            SourceType::NoType | SourceType::Plain => serde_json::from_slice(bytes).map(Self::Db),
            SourceType::Ldap | SourceType::DLdap => serde_json::from_slice(bytes).map(Self::Ldap),
            SourceType::Smtp => serde_json::from_slice(bytes).map(Self::Smtp),
            SourceType::Pam => serde_json::from_slice(bytes).map(Self::Pam),
            SourceType::OAuth2 => serde_json::from_slice(bytes).map(Self::OAuth2),
            SourceType::Sspi => serde_json::from_slice(bytes).map(Self::Sspi),
        };
        decoded.map_err(|e| {
            AuthError::storage(format!("failed to decode {source_type} source config: {e}"))
        })
    }

    /// The password capability, if this kind of source has one.
    #[must_use]
    pub fn as_password_authenticator(&self) -> Option<&dyn PasswordAuthenticator> {
        match self {
            Self::Db(cfg) => Some(cfg),
            Self::Smtp(cfg) => Some(cfg),
            Self::Pam(cfg) => Some(cfg),
            Self::Ldap(_) | Self::OAuth2(_) | Self::Sspi(_) => None,
        }
    }

    /// The sync capability, if this kind of source has one.
    #[must_use]
    pub fn as_synchronizable(&self) -> Option<&dyn SynchronizableSource> {
        match self {
            Self::OAuth2(cfg) => Some(cfg),
            _ => None,
        }
    }
}

// =============================================================================
// Source
// =============================================================================

/// A configured authentication source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: i64,
    pub source_type: SourceType,
    pub name: String,
    pub is_active: bool,
    pub is_sync_enabled: bool,
    pub cfg: SourceConfig,
    pub created_unix: i64,
    pub updated_unix: i64,
}

impl Source {
    /// Creates an unsaved, active source.
    #[must_use]
    pub fn new(name: impl Into<String>, cfg: SourceConfig, source_type: SourceType) -> Self {
        Self {
            id: 0,
            source_type,
            name: name.into(),
            is_active: true,
            is_sync_enabled: false,
            cfg,
            created_unix: 0,
            updated_unix: 0,
        }
    }

    /// The built-in local database source, id `0`. Always active.
    #[must_use]
    pub fn local() -> Self {
        Self::new("", SourceConfig::Db(DbConfig::default()), SourceType::NoType)
    }

    #[must_use]
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.is_sync_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }
}

// =============================================================================
// Registry Operations
// =============================================================================

/// Loads a source. Id `0` is the built-in local source.
///
/// # Errors
///
/// Returns `AuthError::SourceNotExist` for an unknown id.
pub async fn get_source_by_id(services: &AuthServices, id: i64) -> AuthResult<Source> {
    if id == 0 {
        return Ok(Source::local());
    }
    services
        .sources
        .find_by_id(id)
        .await?
        .ok_or(AuthError::SourceNotExist { id })
}

/// Lists active sources ordered by id.
pub async fn active_sources(services: &AuthServices) -> AuthResult<Vec<Source>> {
    services.sources.list(true).await
}

/// Validates and stores a new source.
///
/// # Errors
///
/// Returns `AuthError::Configuration` for an empty name or a config that
/// does not belong to the source type, and `SourceAlreadyExists` for a
/// taken name.
pub async fn create_source(services: &AuthServices, source: Source) -> AuthResult<Source> {
    if source.name.trim().is_empty() {
        return Err(AuthError::configuration("source name cannot be empty"));
    }
    if !source.cfg.matches(source.source_type) {
        return Err(AuthError::configuration(format!(
            "config does not belong to a {} source",
            source.source_type
        )));
    }
    if services.sources.find_by_name(&source.name).await?.is_some() {
        return Err(AuthError::SourceAlreadyExists { name: source.name });
    }

    let created = services.sources.create(&source).await?;
    tracing::info!(id = created.id, name = %created.name, kind = %created.source_type, "created login source");
    Ok(created)
}

/// Deletes a source that nothing references any more.
///
/// # Errors
///
/// Returns `AuthError::SourceInUse` while users or external logins still
/// reference the source.
pub async fn delete_source(services: &AuthServices, id: i64) -> AuthResult<()> {
    let users = services.users.count_by_login_source(id).await?;
    let external_logins = services.external_logins.count_by_source(id).await?;
    if users > 0 || external_logins > 0 {
        return Err(AuthError::SourceInUse {
            id,
            users,
            external_logins,
        });
    }
    services.sources.delete(id).await?;
    tracing::info!(id, "deleted login source");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::provision::create_user;
    use crate::types::NewUser;

    fn smtp_source() -> Source {
        Source::new(
            "mail",
            SourceConfig::Smtp(SmtpConfig {
                host: "smtp.example.com".into(),
                port: 587,
                ..SmtpConfig::default()
            }),
            SourceType::Smtp,
        )
    }

    #[test]
    fn test_source_type_discriminants() {
        for value in 0..=7 {
            let kind = SourceType::from_i32(value).unwrap();
            assert_eq!(kind.as_i32(), value);
        }
        assert!(SourceType::from_i32(8).is_none());
        assert_eq!(SourceType::Smtp.as_i32(), 3);
        assert_eq!(SourceType::OAuth2.as_i32(), 6);
    }

    #[test]
    fn test_config_round_trip_per_type() {
        let cfg = smtp_source().cfg;
        let bytes = cfg.to_db().unwrap();
        assert_eq!(SourceConfig::from_db(SourceType::Smtp, &bytes).unwrap(), cfg);
    }

    #[test]
    fn test_from_db_empty_blob_is_default() {
        assert_eq!(
            SourceConfig::from_db(SourceType::DLdap, &[]).unwrap(),
            SourceConfig::Ldap(LdapConfig::default())
        );
    }

    #[test]
    fn test_from_db_rejects_garbage() {
        let err = SourceConfig::from_db(SourceType::Pam, b"not json").unwrap_err();
        assert!(matches!(err, AuthError::Storage { .. }));
    }

    #[test]
    fn test_capabilities() {
        assert!(SourceConfig::default_for(SourceType::Plain)
            .as_password_authenticator()
            .is_some());
        assert!(SourceConfig::default_for(SourceType::Smtp)
            .as_password_authenticator()
            .is_some());
        assert!(SourceConfig::default_for(SourceType::Ldap)
            .as_password_authenticator()
            .is_none());
        assert!(SourceConfig::default_for(SourceType::OAuth2)
            .as_synchronizable()
            .is_some());
        assert!(SourceConfig::default_for(SourceType::Pam)
            .as_synchronizable()
            .is_none());
    }

    #[test]
    fn test_matches() {
        let ldap = SourceConfig::default_for(SourceType::Ldap);
        assert!(ldap.matches(SourceType::DLdap));
        assert!(!ldap.matches(SourceType::Smtp));
    }

    #[tokio::test]
    async fn test_local_source_is_builtin() {
        let services = AuthServices::in_memory(AuthConfig::default());
        let source = get_source_by_id(&services, 0).await.unwrap();
        assert!(source.is_active);
        assert!(matches!(source.cfg, SourceConfig::Db(_)));

        let err = get_source_by_id(&services, 99).await.unwrap_err();
        assert!(matches!(err, AuthError::SourceNotExist { id: 99 }));
    }

    #[tokio::test]
    async fn test_create_source_validation() {
        let services = AuthServices::in_memory(AuthConfig::default());
        let created = create_source(&services, smtp_source()).await.unwrap();
        assert!(created.id > 0);

        let dup = create_source(&services, smtp_source()).await.unwrap_err();
        assert!(matches!(dup, AuthError::SourceAlreadyExists { .. }));

        let mismatched = Source::new(
            "pam",
            SourceConfig::default_for(SourceType::Smtp),
            SourceType::Pam,
        );
        let err = create_source(&services, mismatched).await.unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_delete_source_in_use() {
        let services = AuthServices::in_memory(AuthConfig::default());
        let source = create_source(&services, smtp_source()).await.unwrap();
        create_user(
            &services,
            NewUser {
                name: "mailer".into(),
                email: "mailer@example.com".into(),
                login_type: SourceType::Smtp,
                login_source: source.id,
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
        .unwrap();

        let err = delete_source(&services, source.id).await.unwrap_err();
        assert!(matches!(err, AuthError::SourceInUse { users: 1, .. }));

        let unused = create_source(
            &services,
            Source::new("pam", SourceConfig::default_for(SourceType::Pam), SourceType::Pam),
        )
        .await
        .unwrap();
        delete_source(&services, unused.id).await.unwrap();
        assert!(services.sources.find_by_id(unused.id).await.unwrap().is_none());
    }
}
