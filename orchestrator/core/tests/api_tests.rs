// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP surface: session gate, status mapping and a full first-run flow.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::Harness;
use homeport_core::presentation::api::router;

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn setup_admin(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/setup",
        None,
        Some(json!({ "username": "admin", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public() {
    let h = Harness::new().await;
    let app = router(h.api_state());

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let h = Harness::new().await;
    let app = router(h.api_state());

    let (status, _) = send(&app, Method::GET, "/api/apps", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/apps", Some("not-a-session"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_first_run_setup_then_install() {
    let h = Harness::new().await;
    h.share("media", &["plex"]).await;
    let app = router(h.api_state());

    let (_, status_body) = send(&app, Method::GET, "/api/auth/status", None, None).await;
    assert_eq!(status_body["needs_setup"], true);

    let token = setup_admin(&app).await;

    // Setup only works once
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/setup",
        None,
        Some(json!({ "username": "mallory", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/apps/container",
        Some(&token),
        Some(json!({
            "id": "plex",
            "name": "Plex",
            "image": "linuxserver/plex",
            "ports": [{ "host": 32400, "container": 32400 }],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["mounted_shares"], json!(["media"]));
    assert_eq!(body["app"]["type"], "container");

    let (status, body) = send(&app, Method::GET, "/api/apps", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["apps"][0]["id"], "plex");
    assert_eq!(body["apps"][0]["status"], "running");

    let (status, body) = send(&app, Method::DELETE, "/api/apps/plex", Some(&token), None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["teardown_scheduled"], true);
    assert!(h.repos.apps.find("plex").await.unwrap().is_none());
}

#[tokio::test]
async fn test_status_codes_follow_error_kinds() {
    let h = Harness::new().await;
    let app = router(h.api_state());
    let admin_token = setup_admin(&app).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/users",
        Some(&admin_token),
        Some(json!({ "username": "alice", "password": "wonderland" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wonderland" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let alice_token = body["token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::GET, "/api/users", Some(&alice_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/apps/plex/actions/explode",
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, "/api/apps/ghost", Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.runtime.fail_next_run("pull access denied");
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/apps/container",
        Some(&admin_token),
        Some(json!({ "id": "private", "name": "Private", "image": "acme/private" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["output"], "pull access denied");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({ "username": "alice", "password": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_invalidates_token() {
    let h = Harness::new().await;
    let app = router(h.api_state());
    let token = setup_admin(&app).await;

    let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "admin");

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
