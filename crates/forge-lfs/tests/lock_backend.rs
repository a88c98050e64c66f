//! HTTP lock backend against a mocked internal locks API.

use forge_lfs::{
    ClientConfig, HttpLockBackend, InternalClient, LfsError, Lock, LockBackend, UNKNOWN_OWNER,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LOCKS: &str = "/api/internal/repo/mia/assets.git/info/lfs/locks";

fn backend(server: &MockServer) -> HttpLockBackend {
    let url = Url::parse(&format!("{}/api/internal/repo", server.uri())).unwrap();
    let config = ClientConfig::new(url, "mia/assets")
        .with_auth_token("Bearer user-token")
        .with_internal_token("internal-secret");
    HttpLockBackend::new(InternalClient::new(&config).unwrap())
}

fn api_lock(id: u32, owner: Option<&str>) -> serde_json::Value {
    let mut lock = json!({
        "id": id.to_string(),
        "path": format!("assets/file-{id}.psd"),
        "locked_at": "2026-05-04T10:00:00Z",
    });
    if let Some(name) = owner {
        lock["owner"] = json!({ "name": name });
    }
    lock
}

#[tokio::test]
async fn test_create_sends_auth_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOCKS))
        .and(header("authorization", "Bearer user-token"))
        .and(header("x-forge-internal-auth", "internal-secret"))
        .and(header("accept", "application/vnd.git-lfs+json"))
        .and(header("content-type", "application/vnd.git-lfs+json"))
        .and(body_json(json!({ "path": "assets/file-1.psd" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "lock": api_lock(1, Some("mia")) })))
        .expect(1)
        .mount(&server)
        .await;

    let lock = backend(&server)
        .create("assets/file-1.psd", None)
        .await
        .unwrap();
    assert_eq!(lock.id, "1");
    assert_eq!(lock.owner, "mia");
    assert_eq!(lock.formatted_timestamp(), "2026-05-04T10:00:00Z");
}

#[tokio::test]
async fn test_create_without_lock_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOCKS))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .mount(&server)
        .await;

    let err = backend(&server).create("a.bin", None).await.unwrap_err();
    assert!(matches!(err, LfsError::NilLock));
    assert_eq!(err.to_string(), "api returned nil lock");
}

#[tokio::test]
async fn test_create_maps_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOCKS))
        .and(body_json(json!({ "path": "taken.bin" })))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOCKS))
        .and(body_json(json!({ "path": "secret.bin" })))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(LOCKS))
        .and(body_json(json!({ "path": "broken.bin" })))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let backend = backend(&server);
    assert!(matches!(
        backend.create("taken.bin", None).await,
        Err(LfsError::Conflict { lock: None })
    ));
    assert!(matches!(
        backend.create("secret.bin", None).await,
        Err(LfsError::Forbidden)
    ));
    let err = backend.create("broken.bin", None).await.unwrap_err();
    assert_eq!(err.to_string(), "server returned status 503");
}

#[tokio::test]
async fn test_create_forwards_refname() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(LOCKS))
        .and(body_json(json!({ "path": "a.bin", "ref": { "name": "refs/heads/main" } })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "lock": api_lock(3, None) })))
        .expect(1)
        .mount(&server)
        .await;

    let lock = backend(&server)
        .create("a.bin", Some("refs/heads/main"))
        .await
        .unwrap();
    assert_eq!(lock.owner, UNKNOWN_OWNER);
}

#[tokio::test]
async fn test_range_paginates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LOCKS))
        .and(query_param("limit", "2"))
        .and(query_param_is_missing("cursor"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "locks": [api_lock(1, Some("mia")), api_lock(2, Some("mia"))],
            "next_cursor": "c2",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LOCKS))
        .and(query_param("limit", "2"))
        .and(query_param("cursor", "c2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "locks": [api_lock(3, Some("mia")), api_lock(4, None)],
            "next_cursor": "c4",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LOCKS))
        .and(query_param("limit", "2"))
        .and(query_param("cursor", "c4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "locks": [api_lock(5, Some("noah"))],
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let mut seen: Vec<Lock> = Vec::new();
    let mut cursors = Vec::new();
    let mut cursor = String::new();
    loop {
        let mut visit = |lock: Lock| {
            seen.push(lock);
            Ok(())
        };
        cursor = backend.range(&cursor, 2, &mut visit).await.unwrap();
        cursors.push(cursor.clone());
        if cursor.is_empty() {
            break;
        }
    }

    assert_eq!(cursors, vec!["c2", "c4", ""]);
    let ids: Vec<&str> = seen.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
    assert_eq!(seen[3].owner, UNKNOWN_OWNER);
}

#[tokio::test]
async fn test_range_visitor_error_stops_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LOCKS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "locks": [api_lock(1, None), api_lock(2, None)],
            "next_cursor": "c2",
        })))
        .mount(&server)
        .await;

    let mut visited = 0;
    let mut visit = |_: Lock| {
        visited += 1;
        Err(LfsError::Forbidden)
    };
    let result = backend(&server).range("", 2, &mut visit).await;
    assert!(matches!(result, Err(LfsError::Forbidden)));
    assert_eq!(visited, 1);
}

#[tokio::test]
async fn test_from_path_and_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LOCKS))
        .and(query_param("path", "assets/file-2.psd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "locks": [api_lock(2, Some("mia"))] })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LOCKS))
        .and(query_param("id", "9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "locks": [] })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let lock = backend.from_path("assets/file-2.psd").await.unwrap();
    assert_eq!(lock.id, "2");
    assert!(matches!(backend.from_id("9").await, Err(LfsError::NotFound)));
}

#[tokio::test]
async fn test_unlock() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{LOCKS}/4/unlock")))
        .and(body_json(json!({ "force": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "lock": api_lock(4, Some("mia")) })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{LOCKS}/5/unlock")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let backend = backend(&server);
    backend.unlock("4", false).await.unwrap();
    assert!(matches!(
        backend.unlock("5", true).await,
        Err(LfsError::Forbidden)
    ));
}
