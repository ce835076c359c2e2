//! Task-side decision listener.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use approval_gate::watcher::listener::{router, ListenerState, Terminator};

struct ChannelExit(mpsc::UnboundedSender<i32>);

impl Terminator for ChannelExit {
    fn terminate(&self, code: i32) {
        let _ = self.0.send(code);
    }
}

fn listener(path: &str) -> (Router, mpsc::UnboundedReceiver<i32>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = ListenerState::new(Duration::from_millis(50), Arc::new(ChannelExit(tx)));
    (router(path, state), rx)
}

async fn put(app: &Router, path: &str, body: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn exit_code(rx: &mut mpsc::UnboundedReceiver<i32>) -> Option<i32> {
    tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_approved_exits_zero_after_delay() {
    let (app, mut rx) = listener("/");
    let (status, body) = put(&app, "/", r#"{"decision":"Approved"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"decision": "Approved", "response": "Approval accepted. Exit the server."})
    );
    // the response is sent before the exit fires
    assert!(rx.try_recv().is_err());
    assert_eq!(exit_code(&mut rx).await, Some(0));
}

#[tokio::test]
async fn test_rejected_exits_non_zero() {
    let (app, mut rx) = listener("/gate");
    let (status, body) = put(&app, "/gate", r#"{"decision":"Rejected"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Reject accepted. Exit the server.");
    assert_eq!(exit_code(&mut rx).await, Some(1));
}

#[tokio::test]
async fn test_unknown_decision_keeps_running() {
    let (app, mut rx) = listener("/");
    let (status, body) = put(&app, "/", r#"{"decision":"Maybe"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"], "Unknown");
    assert_eq!(body["response"], "Decision Unknown: Maybe");
    assert_eq!(exit_code(&mut rx).await, None);
}

#[tokio::test]
async fn test_malformed_payload_is_400_and_keeps_running() {
    let (app, mut rx) = listener("/");
    let (status, body) = put(&app, "/", r#"{"verdict": 1"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "malformed_payload");
    assert_eq!(exit_code(&mut rx).await, None);

    // still serving
    let (status, _) = put(&app, "/", r#"{"decision":"Approved"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exit_code(&mut rx).await, Some(0));
}

#[tokio::test]
async fn test_redelivered_decision_exits_once() {
    let (app, mut rx) = listener("/");
    put(&app, "/", r#"{"decision":"Approved"}"#).await;
    put(&app, "/", r#"{"decision":"Approved"}"#).await;

    assert_eq!(exit_code(&mut rx).await, Some(0));
    assert_eq!(exit_code(&mut rx).await, None);
}

#[tokio::test]
async fn test_only_put_on_access_path() {
    let (app, _rx) = listener("/gate");
    let resp = app
        .clone()
        .oneshot(Request::builder().method("GET").uri("/gate").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let resp = app
        .oneshot(Request::builder().method("PUT").uri("/other").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
