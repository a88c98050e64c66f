//! Directory-backed source configurations (LDAP and SSPI).
//!
//! These configs are persisted so an administrator can manage them, but no
//! authenticator for them ships in this crate.

use serde::{Deserialize, Serialize};

/// Transport security for LDAP connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProtocol {
    #[default]
    Unencrypted,
    Ldaps,
    StartTls,
}

/// LDAP source configuration, shared by bind-DN and simple-auth sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LdapConfig {
    pub host: String,
    pub port: u16,
    pub security_protocol: SecurityProtocol,
    pub skip_verify: bool,
    pub bind_dn: String,
    pub bind_password: String,
    pub user_base: String,
    pub user_dn: String,
    pub filter: String,
    pub admin_filter: String,
    pub attribute_username: String,
    pub attribute_name: String,
    pub attribute_surname: String,
    pub attribute_mail: String,
}

/// SPNEGO/SSPI source configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SspiConfig {
    pub auto_create_users: bool,
    pub auto_activate_users: bool,
    pub strip_domain_names: bool,
    pub separator_replacement: String,
    pub default_language: String,
}
