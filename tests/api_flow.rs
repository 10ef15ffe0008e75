// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-to-end flows through the full router.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    extract::Form,
    http::{Method, Request, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::Url;

use polaris_auth_server::{
    api::router,
    auth::{DeviceClaims, OAuthConfig, OAuthProvider, SessionClaims, SessionConfig, StaticKeyResolver, TokenCodec},
    state::AppState,
    storage::CredentialStore,
};

const SESSION_KEY: &[u8] = b"integration-session-signing-key-0001";
const KEY_D1: &[u8] = b"key-for-device-d1-in-org-o1-00000";
const KEY_D2: &[u8] = b"key-for-device-d2-in-org-o1-00000";

struct TestApp {
    app: Router,
    store: Arc<CredentialStore>,
    _dir: TempDir,
}

fn build(session: SessionConfig, identity: Option<OAuthProvider>) -> TestApp {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(CredentialStore::open(&dir.path().join("credentials.redb")).unwrap());
    store.provision_device("d1", "o1", KEY_D1, 1_700_000_000).unwrap();
    store.provision_device("d2", "o1", KEY_D2, 1_700_000_001).unwrap();

    let mut state = AppState::new(store.clone(), session);
    if let Some(provider) = identity {
        state = state.with_identity_provider(provider);
    }
    TestApp {
        app: router(state),
        store,
        _dir: dir,
    }
}

fn test_app() -> TestApp {
    build(SessionConfig::new(SESSION_KEY.to_vec()), None)
}

fn device_token(device_id: &str, org_id: &str, key: &[u8]) -> String {
    let claims = DeviceClaims {
        device_id: device_id.into(),
        org_id: org_id.into(),
        iat: None,
        exp: None,
    };
    TokenCodec::device().sign(&claims, key).unwrap()
}

fn session_claims(token: &str) -> SessionClaims {
    TokenCodec::session()
        .parse(token, &StaticKeyResolver::new(SESSION_KEY))
        .unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    authorization: Option<String>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header("Authorization", value);
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn spawn_identity_provider() -> OAuthProvider {
    let provider = Router::new()
        .route(
            "/login/oauth/access_token",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                let token = match form.get("code").map(String::as_str) {
                    Some("code-alice") => "token-alice",
                    Some("code-stranger") => "token-stranger",
                    _ => return Json(json!({"error": "bad_verification_code"})),
                };
                Json(json!({"access_token": token, "token_type": "bearer"}))
            }),
        )
        .route(
            "/user/emails",
            get(|headers: axum::http::HeaderMap| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let email = match auth.as_str() {
                    "Bearer token-alice" => "Alice@Example.com",
                    "Bearer token-stranger" => "stranger@example.com",
                    _ => return (StatusCode::UNAUTHORIZED, Json(json!({"message": "Bad credentials"}))),
                };
                (
                    StatusCode::OK,
                    Json(json!([
                        {"email": "noise@example.com", "verified": true, "primary": false, "visibility": null},
                        {"email": email, "verified": true, "primary": true, "visibility": "private"}
                    ])),
                )
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, provider).await.unwrap();
    });

    OAuthProvider::new(OAuthConfig {
        client_id: "client-id".into(),
        client_secret: "client-secret".into(),
        token_url: Url::parse(&format!("http://{addr}/login/oauth/access_token")).unwrap(),
        emails_url: Url::parse(&format!("http://{addr}/user/emails")).unwrap(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

// =============================================================================
// Device flows
// =============================================================================

#[tokio::test]
async fn device_signed_with_own_key_is_accepted_and_foreign_key_rejected() {
    let t = test_app();

    let own = device_token("d1", "o1", KEY_D1);
    let (status, body) = send(&t.app, Method::POST, "/v1/device/o1/waiting_room", Some(format!("Bearer {own}")), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["device_id"], "d1");
    assert_eq!(body["newly_joined"], true);

    // d1's identity, d2's key
    let forged = device_token("d1", "o1", KEY_D2);
    let (status, body) = send(&t.app, Method::POST, "/v1/device/o1/waiting_room", Some(format!("Bearer {forged}")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "unauthorized");
}

#[tokio::test]
async fn unknown_device_and_bad_signature_look_the_same() {
    let t = test_app();

    let unknown = device_token("ghost", "o1", KEY_D1);
    let bad_sig = device_token("d1", "o1", b"wrong-key");

    let unknown_resp = send(&t.app, Method::GET, "/v1/device/o1/profile", Some(unknown), None).await;
    let bad_sig_resp = send(&t.app, Method::GET, "/v1/device/o1/profile", Some(bad_sig), None).await;
    assert_eq!(unknown_resp.0, StatusCode::FORBIDDEN);
    assert_eq!(unknown_resp, bad_sig_resp);
}

#[tokio::test]
async fn missing_device_token_is_401() {
    let t = test_app();
    let (status, body) = send(&t.app, Method::GET, "/v1/device/o1/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "unauthenticated");
}

#[tokio::test]
async fn device_cannot_act_under_another_org_path() {
    let t = test_app();
    t.store.provision_device("d1", "o2", b"other-org-key", 0).unwrap();

    let token = device_token("d1", "o1", KEY_D1);
    let (status, _) = send(&t.app, Method::POST, "/v1/device/o2/waiting_room", Some(token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(t.store.get_device("d1", "o2").unwrap().unwrap().joined_at.is_none());
}

#[tokio::test]
async fn undecodable_org_path_is_rejected() {
    let t = test_app();

    let token = device_token("d1", "o1", KEY_D1);
    let (status, body) = send(&t.app, Method::POST, "/v1/device/%FF/waiting_room", Some(token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "unauthorized");
    assert!(t.store.get_device("d1", "o1").unwrap().unwrap().joined_at.is_none());
}

#[tokio::test]
async fn onboarding_lifecycle() {
    let t = test_app();
    let token = format!("Bearer {}", device_token("d1", "o1", KEY_D1));

    let (status, _) = send(&t.app, Method::POST, "/v1/device/o1/waiting_room", Some(token.clone()), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&t.app, Method::POST, "/v1/device/o1/waiting_room", Some(token.clone()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newly_joined"], false);

    let (status, body) = send(&t.app, Method::GET, "/v1/device/o1/profile", Some(token.clone()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile_url"], Value::Null);
    assert!(t.store.get_device("d1", "o1").unwrap().unwrap().last_seen.is_some());

    t.store.assign_device_profile("d1", "o1", "https://profiles/p1").unwrap();
    let (status, body) = send(&t.app, Method::GET, "/v1/device/o1/profile", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile_url"], "https://profiles/p1");
}

#[tokio::test]
async fn waiting_room_listing_requires_user_and_filters() {
    let t = test_app();
    t.store.assign_device_profile("d2", "o1", "https://profiles/p2").unwrap();

    let device = device_token("d1", "o1", KEY_D1);
    let (status, _) = send(&t.app, Method::GET, "/v1/device/o1/waiting_room", Some(device), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.store.insert_user("admin@example.com", 0).unwrap();
    let issued = polaris_auth_server::auth::SessionIssuer::new(t.store.clone(), SessionConfig::new(SESSION_KEY.to_vec()))
        .issue("admin@example.com")
        .unwrap();
    let auth = Some(format!("Bearer {}", issued.access_token));

    let (status, body) = send(&t.app, Method::GET, "/v1/device/o1/waiting_room", auth.clone(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["devices"].as_array().unwrap().len(), 2);
    assert!(body["devices"][0].get("device_key").is_none());

    let (status, body) = send(&t.app, Method::GET, "/v1/device/o1/waiting_room?unprofiled=true", auth, None).await;
    assert_eq!(status, StatusCode::OK);
    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0]["device_id"], "d1");
    assert_eq!(devices[0]["state"], "unclaimed");
}

// =============================================================================
// User session flows
// =============================================================================

#[tokio::test]
async fn join_login_refresh_and_revoke() {
    let provider = spawn_identity_provider().await;
    let t = build(SessionConfig::new(SESSION_KEY.to_vec()), Some(provider));

    let (status, body) = send(&t.app, Method::POST, "/v1/device/auth/join", None, Some(json!({"email": "ALICE@example.com"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], "alice@example.com");

    let (status, _) = send(&t.app, Method::POST, "/v1/device/auth/join", None, Some(json!({"email": "alice@example.com"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, pair) = send(&t.app, Method::GET, "/v1/device/auth/token?code=code-alice", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session_claims(pair["access_token"].as_str().unwrap()).sub, "alice@example.com");
    assert!(t.store.get_user("alice@example.com").unwrap().unwrap().last_login.is_some());

    let (status, me) = send(&t.app, Method::GET, "/v1/users/me", Some(format!("Bearer {}", pair["access_token"].as_str().unwrap())), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["user_id"], "alice@example.com");

    let refresh_body = json!({"refresh_token": pair["refresh_token"]});
    let (status, renewed) = send(&t.app, Method::POST, "/v1/device/auth/token/refresh", None, Some(refresh_body)).await;
    assert_eq!(status, StatusCode::OK);
    let renewed_refresh = renewed["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = send(&t.app, Method::POST, "/v1/device/auth/token/revoke", None, Some(json!({"refresh_token": renewed_refresh}))).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = send(&t.app, Method::POST, "/v1/device/auth/token/refresh", None, Some(json!({"refresh_token": renewed_refresh}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "invalid credentials");
}

#[tokio::test]
async fn account_can_be_created_through_query_string() {
    let t = test_app();

    let (status, body) = send(&t.app, Method::GET, "/v1/device/auth/join?email=Bob%40Example.com", None, None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user_id"], "bob@example.com");
    assert!(t.store.get_user("bob@example.com").unwrap().is_some());

    let (status, _) = send(&t.app, Method::GET, "/v1/device/auth/join?email=bob@example.com", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_without_account_is_forbidden() {
    let provider = spawn_identity_provider().await;
    let t = build(SessionConfig::new(SESSION_KEY.to_vec()), Some(provider));

    let (status, body) = send(&t.app, Method::GET, "/v1/device/auth/token?code=code-stranger", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "unauthorized");
}

#[tokio::test]
async fn login_with_rejected_code_is_forbidden() {
    let provider = spawn_identity_provider().await;
    let t = build(SessionConfig::new(SESSION_KEY.to_vec()), Some(provider));

    let (status, _) = send(&t.app, Method::GET, "/v1/device/auth/token?code=nope", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn login_without_configured_provider_is_bad_gateway() {
    let t = test_app();
    let (status, body) = send(&t.app, Method::GET, "/v1/device/auth/token?code=anything", None, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_code"], "upstream_unavailable");
}

#[tokio::test]
async fn stale_refresh_token_keeps_working_after_rotation() {
    let t = test_app();
    let issuer = polaris_auth_server::auth::SessionIssuer::new(t.store.clone(), SessionConfig::new(SESSION_KEY.to_vec()));
    let pair = issuer.issue("user@example.com").unwrap();
    let first_refresh = json!({"refresh_token": pair.refresh_token});

    let (status, renewed) = send(&t.app, Method::POST, "/v1/device/auth/token/refresh", None, Some(first_refresh.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(
        session_claims(renewed["refresh_token"].as_str().unwrap()).tid,
        session_claims(&pair.refresh_token).tid
    );

    // Old record not deleted synchronously: the first refresh token still rotates
    let (status, _) = send(&t.app, Method::POST, "/v1/device/auth/token/refresh", None, Some(first_refresh)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn revoke_on_rotation_rejects_stale_refresh_token() {
    let mut session = SessionConfig::new(SESSION_KEY.to_vec());
    session.revoke_on_rotation = true;
    let t = build(session.clone(), None);
    let pair = polaris_auth_server::auth::SessionIssuer::new(t.store.clone(), session)
        .issue("user@example.com")
        .unwrap();
    let first_refresh = json!({"refresh_token": pair.refresh_token});

    let (status, _) = send(&t.app, Method::POST, "/v1/device/auth/token/refresh", None, Some(first_refresh.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&t.app, Method::POST, "/v1/device/auth/token/refresh", None, Some(first_refresh)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn access_token_is_not_accepted_for_refresh() {
    let t = test_app();
    let pair = polaris_auth_server::auth::SessionIssuer::new(t.store.clone(), SessionConfig::new(SESSION_KEY.to_vec()))
        .issue("user@example.com")
        .unwrap();

    let (status, _) = send(&t.app, Method::POST, "/v1/device/auth/token/refresh", None, Some(json!({"refresh_token": pair.access_token}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_and_docs_are_public() {
    let t = test_app();
    let (status, body) = send(&t.app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["store"], "ok");

    let (status, body) = send(&t.app, Method::GET, "/api-doc/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"].get("/v1/device/{org_id}/profile").is_some());
}
