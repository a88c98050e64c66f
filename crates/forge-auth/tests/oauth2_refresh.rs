//! OAuth2 token refresh against a mocked token endpoint.

use std::sync::Arc;

use forge_auth::source::oauth2::{HttpTokenRefresher, OAuth2Config, RefreshError, TokenRefresher};
use forge_auth::source::{Source, SourceConfig, SourceType, create_source};
use forge_auth::types::{ExternalLoginUser, NewUser};
use forge_auth::{AuthConfig, AuthServices, provision::create_user, sync_external_users};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> OAuth2Config {
    OAuth2Config {
        provider: "gitea".into(),
        client_id: "forge".into(),
        client_secret: "s3cret".into(),
        token_url: format!("{}/login/oauth/access_token", server.uri()),
        ..OAuth2Config::default()
    }
}

#[tokio::test]
async fn test_refresh_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(header("accept", "application/json"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .and(body_string_contains("client_id=forge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-access",
            "refresh_token": "new-refresh",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = HttpTokenRefresher::default()
        .refresh(&config(&server), "old-refresh")
        .await
        .unwrap();
    assert_eq!(token.access_token, "new-access");
    assert_eq!(token.refresh_token.as_deref(), Some("new-refresh"));
    assert_eq!(token.expires_in, Some(3600));
}

#[tokio::test]
async fn test_refresh_invalid_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .mount(&server)
        .await;

    let err = HttpTokenRefresher::default()
        .refresh(&config(&server), "revoked")
        .await
        .unwrap_err();
    assert!(matches!(err, RefreshError::InvalidGrant(ref msg) if msg == "refresh token revoked"));
}

#[tokio::test]
async fn test_refresh_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = HttpTokenRefresher::default()
        .refresh(&config(&server), "whatever")
        .await
        .unwrap_err();
    assert!(matches!(err, RefreshError::Other(_)));
}

#[tokio::test]
async fn test_sync_deactivates_user_on_revoked_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let services = AuthServices::in_memory(AuthConfig::default())
        .with_token_refresher(Arc::new(HttpTokenRefresher::default()));
    let source = create_source(
        &services,
        Source::new("gitea", SourceConfig::OAuth2(config(&server)), SourceType::OAuth2)
            .with_sync_enabled(true),
    )
    .await
    .unwrap();
    let user = create_user(
        &services,
        NewUser {
            name: "petra".into(),
            email: "petra@example.com".into(),
            login_type: SourceType::OAuth2,
            login_source: source.id,
            is_active: true,
            ..NewUser::default()
        },
    )
    .await
    .unwrap();
    services
        .external_logins
        .upsert(&ExternalLoginUser {
            external_id: "42".into(),
            user_id: user.id,
            login_source_id: source.id,
            provider: "gitea".into(),
            email: user.email.clone(),
            access_token: "expired".into(),
            refresh_token: "revoked".into(),
            expires_at: Some(1),
        })
        .await
        .unwrap();

    sync_external_users(&services, &CancellationToken::new(), true)
        .await
        .unwrap();

    let user = services.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(!user.is_active);
    let links = services.external_logins.list_by_source(source.id).await.unwrap();
    assert_eq!(links[0].refresh_token, "");
    assert_eq!(links[0].access_token, "");
    assert_eq!(links[0].expires_at, None);
}
