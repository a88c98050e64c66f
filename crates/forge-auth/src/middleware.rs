//! axum integration: request authentication and error responses.
//!
//! [`authenticate`] opens the request's session, runs the configured
//! [`Group`] and exposes the outcome to handlers through request
//! extensions:
//!
//! - [`SignedInUser`] when a method identified the caller
//! - [`RequestAuth`] always, with the winning method and token scope
//! - [`Session`] always, the open session store
//!
//! The session is released and its cookie set after the handler ran.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use forge_auth::middleware::{AuthLayerState, authenticate};
//!
//! let state = AuthLayerState::new(services, provider, group);
//! let app = Router::new()
//!     .route("/api/v1/user", get(handler))
//!     .layer(middleware::from_fn_with_state(state, authenticate));
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use forge_session::{Provider, RawStore, generate_sid, is_valid_sid};
use serde_json::json;

use crate::error::AuthError;
use crate::method::{Group, Method, RequestAuth};
use crate::services::AuthServices;
use crate::signin::handle_sign_in;
use crate::types::User;

/// Message shared by every rejected credential.
const AUTHENTICATION_FAILED: &str = "authentication failed";

// =============================================================================
// Error Responses
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);
        if status.is_server_error() {
            tracing::error!(error = %self, "authentication error");
        }

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"forge\""),
            );
        }

        (status, headers, Json(json!({ "message": message }))).into_response()
    }
}

/// Maps an error to its status and the message shown to the client.
///
/// Credential failures share one message so the response does not reveal
/// which part of a credential was wrong or whether it ever existed.
fn error_details(error: &AuthError) -> (StatusCode, String) {
    if error.is_credential_error() {
        return (StatusCode::UNAUTHORIZED, AUTHENTICATION_FAILED.to_string());
    }
    if error.is_forbidden() {
        return (StatusCode::FORBIDDEN, error.to_string());
    }
    match error {
        AuthError::UserAlreadyExists { .. }
        | AuthError::EmailAddressAlreadyUsed { .. }
        | AuthError::SourceAlreadyExists { .. }
        | AuthError::SourceInUse { .. }
        | AuthError::WebAuthnCredentialExists { .. } => (StatusCode::CONFLICT, error.to_string()),
        AuthError::SourceNotExist { .. } | AuthError::WebAuthnCredentialNotExist => {
            (StatusCode::NOT_FOUND, error.to_string())
        }
        AuthError::InvalidUserName { .. } | AuthError::InvalidScope { .. } => {
            (StatusCode::BAD_REQUEST, error.to_string())
        }
        AuthError::External { .. } => (
            StatusCode::BAD_GATEWAY,
            "authentication service unavailable".to_string(),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
        ),
    }
}

// =============================================================================
// Request Extensions
// =============================================================================

/// The user identified for the current request.
#[derive(Debug, Clone)]
pub struct SignedInUser(pub User);

/// The session opened for the current request.
#[derive(Clone)]
pub struct Session(pub Arc<dyn RawStore>);

// =============================================================================
// Middleware
// =============================================================================

/// State for [`authenticate`].
#[derive(Clone)]
pub struct AuthLayerState {
    pub services: AuthServices,
    pub provider: Arc<dyn Provider>,
    pub group: Arc<Group>,
}

impl AuthLayerState {
    #[must_use]
    pub fn new(services: AuthServices, provider: Arc<dyn Provider>, group: Group) -> Self {
        Self {
            services,
            provider,
            group: Arc::new(group),
        }
    }
}

/// Authenticates the request with the configured method group.
///
/// # Errors
///
/// Responds with the [`AuthError`] of the first failing method when no
/// method identified a user, and with a server error if the session
/// backend fails.
pub async fn authenticate(
    State(state): State<AuthLayerState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let session_config = &state.services.config.session;
    let incoming_sid = jar
        .get(&session_config.cookie_name)
        .map(|c| c.value().to_string())
        .filter(|sid| is_valid_sid(sid));
    let sid = incoming_sid.clone().unwrap_or_else(generate_sid);
    let mut session: Arc<dyn RawStore> = Arc::from(state.provider.read(&sid).await?);

    let (mut parts, body) = request.into_parts();
    let mut request_auth = RequestAuth::default();
    let user = state
        .group
        .verify(&parts, Some(&*session), &mut request_auth)
        .await?;

    let mut jar = jar;
    if let Some(user) = &user {
        tracing::debug!(
            uid = user.id,
            method = request_auth.method.unwrap_or_default(),
            "request authenticated"
        );
        if let Some(remember) = request_auth.remember_token.take() {
            session = Arc::from(handle_sign_in(&*state.provider, &*session, user).await?);
            jar = jar.add(remember_cookie(&state.services, remember));
        }
        parts.extensions.insert(SignedInUser(user.clone()));
    }
    parts.extensions.insert(request_auth);
    parts.extensions.insert(Session(session.clone()));

    let response = next.run(Request::from_parts(parts, body)).await;

    session.release().await?;
    if incoming_sid.as_deref() != Some(session.id()) {
        jar = jar.add(session_cookie(&state.services, session.id()));
    }
    Ok((jar, response).into_response())
}

fn session_cookie(services: &AuthServices, sid: &str) -> Cookie<'static> {
    let config = &services.config.session;
    Cookie::build((config.cookie_name.clone(), sid.to_string()))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

fn remember_cookie(services: &AuthServices, value: String) -> Cookie<'static> {
    let config = &services.config;
    let max_age = time::Duration::seconds(
        i64::try_from(config.remember_duration.as_secs()).unwrap_or(i64::MAX),
    );
    Cookie::build((config.remember_cookie_name.clone(), value))
        .http_only(true)
        .secure(config.session.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::method::{AccessTokenMethod, AuthTokenMethod, SessionMethod};
    use crate::provision::create_user;
    use crate::signin::SESSION_KEY_UID;
    use crate::token::{create_access_token, create_auth_token};
    use crate::types::NewUser;
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use axum::{Router, middleware, routing::get};
    use forge_session::{MemoryProvider, SessionValue};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn whoami(request: Request) -> String {
        let method = request
            .extensions()
            .get::<RequestAuth>()
            .and_then(|auth| auth.method)
            .unwrap_or_default();
        match request.extensions().get::<SignedInUser>() {
            Some(SignedInUser(user)) => format!("{}:{method}", user.name),
            None => "anonymous".to_string(),
        }
    }

    async fn setup() -> (Router, AuthServices, Arc<MemoryProvider>, User) {
        let services = AuthServices::in_memory(AuthConfig::default());
        let user = create_user(
            &services,
            NewUser {
                name: "olga".into(),
                email: "olga@example.com".into(),
                is_active: true,
                ..NewUser::default()
            },
        )
        .await
        .unwrap();

        let provider = Arc::new(MemoryProvider::new(Duration::from_secs(600)));
        let group = Group::new()
            .with(AccessTokenMethod::new(services.clone()))
            .with(SessionMethod::new(services.clone()))
            .with(AuthTokenMethod::new(services.clone()));
        let state = AuthLayerState::new(services.clone(), provider.clone(), group);
        let app = Router::new()
            .route("/api/v1/user", get(whoami))
            .route("/", get(whoami))
            .layer(middleware::from_fn_with_state(state, authenticate));
        (app, services, provider, user)
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_credential_errors_share_one_message() {
        for error in [
            AuthError::AuthTokenInvalidFormat,
            AuthError::AuthTokenInvalidHash,
            AuthError::AuthTokenExpired,
            AuthError::user_not_exist("ghost"),
        ] {
            let response = error.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
            let json: serde_json::Value =
                serde_json::from_str(&body_string(response).await).unwrap();
            assert_eq!(json["message"], AUTHENTICATION_FAILED);
        }
    }

    #[tokio::test]
    async fn test_error_statuses() {
        assert_eq!(
            AuthError::AuthSourceNotActivated.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::invalid_scope("read:x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        let response = AuthError::storage("connection refused on 10.0.0.3").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_string(response).await.contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn test_anonymous_request_gets_session_cookie() {
        let (app, _, _, _) = setup().await;
        let response = app
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).iter().any(|c| c.starts_with("i_like_forge=")));
        assert_eq!(body_string(response).await, "anonymous");
    }

    #[tokio::test]
    async fn test_bearer_token_authenticates() {
        let (app, services, _, user) = setup().await;
        let (_, token) = create_access_token(&services, user.id, "ci", "read:user")
            .await
            .unwrap();
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/v1/user")
                    .header(header::AUTHORIZATION, format!("token {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(body_string(response).await, "olga:access_token");
    }

    #[tokio::test]
    async fn test_existing_session_authenticates() {
        let (app, _, provider, user) = setup().await;
        let sid = generate_sid();
        let session = provider.read(&sid).await.unwrap();
        session.set(SESSION_KEY_UID, SessionValue::Int(user.id));
        session.release().await.unwrap();

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(header::COOKIE, format!("i_like_forge={sid}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(set_cookies(&response).is_empty());
        assert_eq!(body_string(response).await, "olga:session");
    }

    #[tokio::test]
    async fn test_remember_cookie_signs_in_and_rotates() {
        let (app, services, provider, user) = setup().await;
        let (_, plaintext) = create_auth_token(&services, user.id).await.unwrap();

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(header::COOKIE, format!("forge_incredible={plaintext}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let cookies = set_cookies(&response);
        let remember = cookies
            .iter()
            .find(|c| c.starts_with("forge_incredible="))
            .unwrap();
        assert!(!remember.contains(&plaintext));
        let sid = cookies
            .iter()
            .find_map(|c| c.strip_prefix("i_like_forge="))
            .and_then(|c| c.split(';').next())
            .unwrap()
            .to_string();
        assert_eq!(body_string(response).await, "olga:auth_token");

        let session = provider.read(&sid).await.unwrap();
        assert_eq!(session.get(SESSION_KEY_UID), Some(SessionValue::Int(user.id)));
    }

    #[tokio::test]
    async fn test_tampered_remember_cookie_is_rejected() {
        let (app, services, _, user) = setup().await;
        let (token, _) = create_auth_token(&services, user.id).await.unwrap();
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(header::COOKIE, format!("forge_incredible={}:forged", token.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
