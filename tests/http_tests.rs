// HTTP control API tests
//
// The router is driven in-process with tower's oneshot; the live session
// behind it uses the scripted transport and devices.

mod common;

use astra_live::{create_router, AppState, LiveSession, LiveStatus, TransportEvent};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use common::*;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Router, AppState, FakeTransport, FakeDevices) {
    let transport = FakeTransport::default();
    let devices = FakeDevices::default();
    let live = LiveSession::new(
        test_config(),
        Arc::new(transport.clone()),
        Arc::new(devices.clone()),
    );
    let state = AppState::new(live);
    (create_router(state.clone()), state, transport, devices)
}

async fn call(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _, _) = app();

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_status_when_offline() {
    let (app, _, _, _) = app();

    let (status, body) = call(&app, "GET", "/live/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OFFLINE");
    assert_eq!(body["stats"]["frames_sent"], 0);
    assert!(body["stats"]["session_id"].is_null());
}

#[tokio::test]
async fn test_disconnect_when_offline_is_ok() {
    let (app, _, transport, _) = app();

    let (status, body) = call(&app, "POST", "/live/disconnect").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OFFLINE");
    assert_eq!(transport.closes(), 0);
}

#[tokio::test]
async fn test_connect_and_disconnect() {
    let (app, state, transport, devices) = app();

    let (status, body) = call(&app, "POST", "/live/connect").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONNECTING");
    assert!(body["stats"]["session_id"]
        .as_str()
        .unwrap()
        .starts_with("live-"));

    transport.emit(TransportEvent::Open);
    wait_for("listening", || state.live.status() == LiveStatus::Listening).await;

    let (_, body) = call(&app, "GET", "/live/status").await;
    assert_eq!(body["status"], "LISTENING");

    let (status, body) = call(&app, "POST", "/live/disconnect").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OFFLINE");
    assert!(!devices.is_capturing());
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_connect_denied_microphone() {
    let (app, _, transport, devices) = app();
    devices.deny_microphone.store(true, Ordering::SeqCst);

    let (status, body) = call(&app, "POST", "/live/connect").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "OFFLINE");
    assert!(body["error"].as_str().unwrap().contains("permission denied"));
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_connect_transport_refused() {
    let (app, _, transport, _) = app();
    transport.state.fail_connect.store(true, Ordering::SeqCst);

    let (status, body) = call(&app, "POST", "/live/connect").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["status"], "OFFLINE");
}
