//! Local database password authentication.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::error::AuthError;
use crate::password::{hash_password, needs_rehash, verify_password};
use crate::services::AuthServices;
use crate::source::{PasswordAuthenticator, Source};
use crate::types::User;

/// Configuration of the local database source. Carries no settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbConfig {}

#[async_trait]
impl PasswordAuthenticator for DbConfig {
    async fn authenticate(
        &self,
        services: &AuthServices,
        _source: &Source,
        user: Option<User>,
        login: &str,
        password: &str,
    ) -> AuthResult<User> {
        let mut user = user.ok_or_else(|| AuthError::user_not_exist(login))?;

        let Some(hash) = user.passwd.clone().filter(|h| !h.is_empty()) else {
            return Err(AuthError::UserPasswordNotSet {
                uid: user.id,
                name: user.name,
            });
        };
        if !verify_password(password, &hash) {
            return Err(AuthError::UserPasswordInvalid {
                uid: user.id,
                name: user.name,
            });
        }

        if needs_rehash(&hash) {
            let upgraded = hash_password(password)?;
            services.users.update_password(user.id, &upgraded).await?;
            tracing::debug!(uid = user.id, "upgraded password hash");
            user.passwd = Some(upgraded);
        }

        if user.prohibit_login || !user.is_individual() {
            return Err(AuthError::UserProhibitLogin {
                uid: user.id,
                name: user.name,
            });
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::provision::create_user;
    use crate::source::SourceType;
    use crate::types::{NewUser, UserType};
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    async fn setup(password: Option<&str>) -> (AuthServices, User) {
        let services = AuthServices::in_memory(AuthConfig::default());
        let user = create_user(
            &services,
            NewUser {
                name: "dan".into(),
                email: "dan@example.com".into(),
                password: password.map(str::to_string),
                login_type: SourceType::Plain,
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
        .unwrap();
        (services, user)
    }

    #[tokio::test]
    async fn test_missing_user() {
        let (services, _) = setup(Some("pw")).await;
        let err = DbConfig::default()
            .authenticate(&services, &Source::local(), None, "ghost", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotExist { .. }));
    }

    #[tokio::test]
    async fn test_valid_password() {
        let (services, user) = setup(Some("pw")).await;
        let authed = DbConfig::default()
            .authenticate(&services, &Source::local(), Some(user.clone()), "dan", "pw")
            .await
            .unwrap();
        assert_eq!(authed.id, user.id);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unset_password() {
        let (services, user) = setup(Some("pw")).await;
        let err = DbConfig::default()
            .authenticate(&services, &Source::local(), Some(user), "dan", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserPasswordInvalid { .. }));

        let (services, user) = setup(None).await;
        let err = DbConfig::default()
            .authenticate(&services, &Source::local(), Some(user), "dan", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserPasswordNotSet { .. }));
    }

    #[tokio::test]
    async fn test_prohibited_and_organization_rejected() {
        let (services, mut user) = setup(Some("pw")).await;
        user.prohibit_login = true;
        let err = DbConfig::default()
            .authenticate(&services, &Source::local(), Some(user.clone()), "dan", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserProhibitLogin { .. }));

        user.prohibit_login = false;
        user.user_type = UserType::Organization;
        let err = DbConfig::default()
            .authenticate(&services, &Source::local(), Some(user), "dan", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserProhibitLogin { .. }));
    }

    #[tokio::test]
    async fn test_outdated_hash_is_upgraded() {
        let (services, mut user) = setup(None).await;
        let weak = argon2::Argon2::new(
            argon2::Algorithm::Argon2i,
            argon2::Version::V0x13,
            argon2::Params::new(1024, 1, 1, None).unwrap(),
        );
        let salt = SaltString::generate(&mut OsRng);
        user.passwd = Some(weak.hash_password(b"pw", &salt).unwrap().to_string());

        let authed = DbConfig::default()
            .authenticate(&services, &Source::local(), Some(user.clone()), "dan", "pw")
            .await
            .unwrap();
        let upgraded = authed.passwd.unwrap();
        assert!(upgraded.starts_with("$argon2id$"));

        let stored = services.users.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.passwd.as_deref(), Some(upgraded.as_str()));
    }
}
