//! In-memory storage backend.
//!
//! All tables live behind a single lock, so every operation is atomic with
//! respect to the others. Ids are assigned from one counter per table,
//! starting at 1.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::AuthResult;
use crate::error::AuthError;
use crate::source::Source;
use crate::storage::{
    AccessTokenStorage, AuthTokenStorage, EmailAddressStorage, ExternalLoginStorage,
    SourceStorage, UserStorage, WebAuthnCredentialStorage,
};
use crate::types::{
    AccessToken, AuthToken, EmailAddress, ExternalLoginUser, User, WebAuthnCredential, now_unix,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    emails: BTreeMap<i64, EmailAddress>,
    sources: BTreeMap<i64, Source>,
    auth_tokens: HashMap<String, AuthToken>,
    access_tokens: BTreeMap<i64, AccessToken>,
    /// Keyed by `(login_source_id, external_id)`.
    external_logins: BTreeMap<(i64, String), ExternalLoginUser>,
    webauthn: BTreeMap<i64, WebAuthnCredential>,
    next_id: HashMap<&'static str, i64>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let counter = self.next_id.entry(table).or_insert(0);
        *counter += 1;
        *counter
    }

    fn check_user_free(&self, user: &User) -> AuthResult<()> {
        if self.users.values().any(|u| u.lower_name == user.lower_name) {
            return Err(AuthError::UserAlreadyExists {
                name: user.name.clone(),
            });
        }
        Ok(())
    }

    fn check_email_free(&self, address: &EmailAddress) -> AuthResult<()> {
        if self
            .emails
            .values()
            .any(|e| e.lower_email == address.lower_email)
        {
            return Err(AuthError::EmailAddressAlreadyUsed {
                email: address.email.clone(),
            });
        }
        Ok(())
    }

    fn insert_user(&mut self, user: &User) -> User {
        let now = now_unix();
        let mut created = user.clone();
        created.id = self.next_id("user");
        created.created_unix = now;
        created.updated_unix = now;
        self.users.insert(created.id, created.clone());
        created
    }

    fn insert_email(&mut self, address: &EmailAddress) -> EmailAddress {
        let mut created = address.clone();
        created.id = self.next_id("email");
        self.emails.insert(created.id, created.clone());
        created
    }
}

/// Storage backed by process memory.
#[derive(Default)]
pub struct MemoryAuthStorage {
    tables: RwLock<Tables>,
}

impl MemoryAuthStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserStorage for MemoryAuthStorage {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_by_lower_name(&self, lower_name: &str) -> AuthResult<Option<User>> {
        Ok(self
            .tables
            .read()
            .users
            .values()
            .find(|u| u.lower_name == lower_name)
            .cloned())
    }

    async fn create(&self, user: &User) -> AuthResult<User> {
        let mut tables = self.tables.write();
        tables.check_user_free(user)?;
        Ok(tables.insert_user(user))
    }

    async fn create_with_email(
        &self,
        user: &User,
        address: &EmailAddress,
    ) -> AuthResult<(User, EmailAddress)> {
        let mut tables = self.tables.write();
        tables.check_user_free(user)?;
        tables.check_email_free(address)?;
        let created = tables.insert_user(user);
        let email = tables.insert_email(&EmailAddress {
            uid: created.id,
            ..address.clone()
        });
        Ok((created, email))
    }

    async fn update_password(&self, id: i64, passwd: &str) -> AuthResult<()> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AuthError::user_not_exist(format!("uid {id}")))?;
        user.passwd = Some(passwd.to_string());
        user.updated_unix = now_unix();
        Ok(())
    }

    async fn set_active(&self, id: i64, is_active: bool) -> AuthResult<()> {
        let mut tables = self.tables.write();
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| AuthError::user_not_exist(format!("uid {id}")))?;
        user.is_active = is_active;
        user.updated_unix = now_unix();
        Ok(())
    }

    async fn count_by_login_source(&self, source_id: i64) -> AuthResult<u64> {
        let tables = self.tables.read();
        Ok(tables
            .users
            .values()
            .filter(|u| u.login_source == source_id)
            .count() as u64)
    }
}

#[async_trait]
impl EmailAddressStorage for MemoryAuthStorage {
    async fn find_by_lower_email(&self, lower_email: &str) -> AuthResult<Option<EmailAddress>> {
        Ok(self
            .tables
            .read()
            .emails
            .values()
            .find(|e| e.lower_email == lower_email)
            .cloned())
    }

    async fn create(&self, address: &EmailAddress) -> AuthResult<EmailAddress> {
        let mut tables = self.tables.write();
        tables.check_email_free(address)?;
        Ok(tables.insert_email(address))
    }
}

// =============================================================================
// Sources
// =============================================================================

#[async_trait]
impl SourceStorage for MemoryAuthStorage {
    async fn find_by_id(&self, id: i64) -> AuthResult<Option<Source>> {
        Ok(self.tables.read().sources.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> AuthResult<Option<Source>> {
        Ok(self
            .tables
            .read()
            .sources
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn list(&self, active_only: bool) -> AuthResult<Vec<Source>> {
        Ok(self
            .tables
            .read()
            .sources
            .values()
            .filter(|s| !active_only || s.is_active)
            .cloned()
            .collect())
    }

    async fn create(&self, source: &Source) -> AuthResult<Source> {
        let mut tables = self.tables.write();
        if tables.sources.values().any(|s| s.name == source.name) {
            return Err(AuthError::SourceAlreadyExists {
                name: source.name.clone(),
            });
        }
        let now = now_unix();
        let mut created = source.clone();
        created.id = tables.next_id("source");
        created.created_unix = now;
        created.updated_unix = now;
        tables.sources.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update(&self, source: &Source) -> AuthResult<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .sources
            .get_mut(&source.id)
            .ok_or(AuthError::SourceNotExist { id: source.id })?;
        *stored = Source {
            created_unix: stored.created_unix,
            updated_unix: now_unix(),
            ..source.clone()
        };
        Ok(())
    }

    async fn delete(&self, id: i64) -> AuthResult<()> {
        self.tables.write().sources.remove(&id);
        Ok(())
    }
}

// =============================================================================
// Tokens
// =============================================================================

#[async_trait]
impl AuthTokenStorage for MemoryAuthStorage {
    async fn insert(&self, token: &AuthToken) -> AuthResult<()> {
        self.tables
            .write()
            .auth_tokens
            .insert(token.id.clone(), token.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> AuthResult<Option<AuthToken>> {
        Ok(self.tables.read().auth_tokens.get(id).cloned())
    }

    async fn update(&self, token: &AuthToken) -> AuthResult<bool> {
        let mut tables = self.tables.write();
        match tables.auth_tokens.get_mut(&token.id) {
            Some(stored) => {
                stored.clone_from(token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_by_id(&self, id: &str) -> AuthResult<()> {
        self.tables.write().auth_tokens.remove(id);
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: i64) -> AuthResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.auth_tokens.len();
        tables.auth_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tables.auth_tokens.len()) as u64)
    }

    async fn delete_expired(&self, now: i64) -> AuthResult<u64> {
        let mut tables = self.tables.write();
        let before = tables.auth_tokens.len();
        tables.auth_tokens.retain(|_, t| !t.is_expired_at(now));
        Ok((before - tables.auth_tokens.len()) as u64)
    }
}

#[async_trait]
impl AccessTokenStorage for MemoryAuthStorage {
    async fn create(&self, token: &AccessToken) -> AuthResult<AccessToken> {
        let mut tables = self.tables.write();
        let now = now_unix();
        let mut created = token.clone();
        created.id = tables.next_id("access_token");
        created.created_unix = now;
        created.updated_unix = now;
        tables.access_tokens.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_last_eight(&self, last_eight: &str) -> AuthResult<Vec<AccessToken>> {
        Ok(self
            .tables
            .read()
            .access_tokens
            .values()
            .filter(|t| t.token_last_eight == last_eight)
            .cloned()
            .collect())
    }

    async fn touch(&self, id: i64, now: i64) -> AuthResult<()> {
        if let Some(token) = self.tables.write().access_tokens.get_mut(&id) {
            token.updated_unix = now;
        }
        Ok(())
    }

    async fn delete(&self, id: i64, uid: i64) -> AuthResult<bool> {
        let mut tables = self.tables.write();
        if tables.access_tokens.get(&id).is_some_and(|t| t.uid == uid) {
            tables.access_tokens.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}

// =============================================================================
// External Logins
// =============================================================================

#[async_trait]
impl ExternalLoginStorage for MemoryAuthStorage {
    async fn upsert(&self, link: &ExternalLoginUser) -> AuthResult<()> {
        self.tables.write().external_logins.insert(
            (link.login_source_id, link.external_id.clone()),
            link.clone(),
        );
        Ok(())
    }

    async fn list_by_source(&self, source_id: i64) -> AuthResult<Vec<ExternalLoginUser>> {
        Ok(self
            .tables
            .read()
            .external_logins
            .range((source_id, String::new())..)
            .take_while(|((id, _), _)| *id == source_id)
            .map(|(_, link)| link.clone())
            .collect())
    }

    async fn update_tokens(&self, link: &ExternalLoginUser) -> AuthResult<()> {
        let mut tables = self.tables.write();
        if let Some(stored) = tables
            .external_logins
            .get_mut(&(link.login_source_id, link.external_id.clone()))
        {
            stored.access_token.clone_from(&link.access_token);
            stored.refresh_token.clone_from(&link.refresh_token);
            stored.expires_at = link.expires_at;
        }
        Ok(())
    }

    async fn count_by_source(&self, source_id: i64) -> AuthResult<u64> {
        Ok(self.list_by_source(source_id).await?.len() as u64)
    }
}

// =============================================================================
// WebAuthn
// =============================================================================

#[async_trait]
impl WebAuthnCredentialStorage for MemoryAuthStorage {
    async fn create(&self, credential: &WebAuthnCredential) -> AuthResult<WebAuthnCredential> {
        let mut tables = self.tables.write();
        let lower_name = credential.name.to_lowercase();
        if tables
            .webauthn
            .values()
            .any(|c| c.user_id == credential.user_id && c.lower_name == lower_name)
        {
            return Err(AuthError::WebAuthnCredentialExists {
                name: credential.name.clone(),
            });
        }
        let now = now_unix();
        let mut created = credential.clone();
        created.id = tables.next_id("webauthn");
        created.lower_name = lower_name;
        created.created_unix = now;
        created.updated_unix = now;
        tables.webauthn.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> AuthResult<Option<WebAuthnCredential>> {
        Ok(self
            .tables
            .read()
            .webauthn
            .values()
            .find(|c| c.credential_id == credential_id)
            .cloned())
    }

    async fn list_by_user(&self, user_id: i64) -> AuthResult<Vec<WebAuthnCredential>> {
        Ok(self
            .tables
            .read()
            .webauthn
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn update_sign_count(
        &self,
        id: i64,
        sign_count: u32,
        clone_warning: bool,
    ) -> AuthResult<()> {
        let mut tables = self.tables.write();
        let credential = tables
            .webauthn
            .get_mut(&id)
            .ok_or(AuthError::WebAuthnCredentialNotExist)?;
        credential.sign_count = sign_count;
        credential.clone_warning = clone_warning;
        credential.updated_unix = now_unix();
        Ok(())
    }

    async fn delete(&self, id: i64, user_id: i64) -> AuthResult<bool> {
        let mut tables = self.tables.write();
        if tables.webauthn.get(&id).is_some_and(|c| c.user_id == user_id) {
            tables.webauthn.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }
}
