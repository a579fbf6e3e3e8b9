mod common;

use axum::{http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{analysis, memory_store, FakeAnalysis, FakeCapture};
use lockin_lib::{
    AnalysisClient, AppState, CaptureRecord, Frame, HttpAnalysisClient, LockInConfig, LockInError,
};

/// Serves `router` on an ephemeral port and returns its base URL.
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn recent() -> Vec<CaptureRecord> {
    vec![CaptureRecord {
        timestamp: 1_000,
        description: "opened the report draft".to_string(),
        goal: Some("write report".to_string()),
        nudge: None,
    }]
}

#[tokio::test]
async fn posts_frame_goal_and_history() {
    let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
    let captured = seen.clone();
    let router = Router::new().route(
        "/analyze-screenshot",
        post(move |Json(body): Json<Value>| {
            let captured = captured.clone();
            async move {
                *captured.lock().unwrap() = Some(body);
                Json(json!({
                    "imageDescription": "user editing a document",
                    "nudge": "Stay focused on your report",
                    "timestamp": 1_700_000_000_000_i64
                }))
            }
        }),
    );
    let base = serve(router).await;
    let client =
        HttpAnalysisClient::new(format!("{}/analyze-screenshot", base), Duration::from_secs(5)).unwrap();

    let frame = Frame::new(b"png".to_vec());
    let history = recent();
    let analysis = client.analyze(&frame, Some("write report"), &history).await.unwrap();

    assert_eq!(analysis.description, "user editing a document");
    assert_eq!(analysis.nudge.as_deref(), Some("Stay focused on your report"));
    assert_eq!(analysis.timestamp, Some(1_700_000_000_000));

    let body = seen.lock().unwrap().clone().unwrap();
    assert_eq!(body["screenshot"], "data:image/png;base64,cG5n");
    assert_eq!(body["currentGoal"], "write report");
    assert_eq!(body["recentDescriptions"][0]["timestamp"], 1_000);
    assert_eq!(body["recentDescriptions"][0]["description"], "opened the report draft");
}

#[tokio::test]
async fn literal_null_nudge_means_on_track() {
    let router = Router::new().route(
        "/analyze-screenshot",
        post(|| async { Json(json!({ "imageDescription": "writing", "nudge": "null", "timestamp": 5 })) }),
    );
    let base = serve(router).await;
    let client =
        HttpAnalysisClient::new(format!("{}/analyze-screenshot", base), Duration::from_secs(5)).unwrap();

    let analysis = client.analyze(&Frame::new(vec![1]), None, &[]).await.unwrap();
    assert_eq!(analysis.nudge, None);
}

#[tokio::test]
async fn server_error_is_a_transport_failure() {
    let router = Router::new().route(
        "/analyze-screenshot",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model unavailable") }),
    );
    let base = serve(router).await;
    let client =
        HttpAnalysisClient::new(format!("{}/analyze-screenshot", base), Duration::from_secs(5)).unwrap();

    let err = client.analyze(&Frame::new(vec![1]), None, &[]).await.unwrap_err();
    assert!(matches!(err, LockInError::Transport(ref msg) if msg.contains("500")));
}

#[tokio::test]
async fn malformed_body_is_a_transport_failure() {
    let router = Router::new().route(
        "/analyze-screenshot",
        post(|| async { Json(json!({ "unexpected": true })) }),
    );
    let base = serve(router).await;
    let client =
        HttpAnalysisClient::new(format!("{}/analyze-screenshot", base), Duration::from_secs(5)).unwrap();

    let err = client.analyze(&Frame::new(vec![1]), None, &[]).await.unwrap_err();
    assert!(matches!(err, LockInError::Transport(_)));
}

#[tokio::test]
async fn unreachable_endpoint_fails_and_reports_disconnected() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        HttpAnalysisClient::new(format!("http://{}/analyze-screenshot", addr), Duration::from_secs(2)).unwrap();
    assert!(!client.test_connection().await);

    let err = client.analyze(&Frame::new(vec![1]), None, &[]).await.unwrap_err();
    assert!(matches!(err, LockInError::Transport(_)));
}

#[tokio::test]
async fn reachable_endpoint_reports_connected() {
    let router = Router::new().route("/analyze-screenshot", post(|| async { "ok" }));
    let base = serve(router).await;
    let client =
        HttpAnalysisClient::new(format!("{}/analyze-screenshot", base), Duration::from_secs(5)).unwrap();

    // the origin has no GET route, but something answered
    assert!(client.test_connection().await);
}

#[tokio::test]
async fn app_checks_the_endpoint_it_was_started_with() {
    let router = Router::new().route("/analyze-screenshot", post(|| async { "ok" }));
    let base = serve(router).await;

    let live = LockInConfig {
        analysis_endpoint: format!("{}/analyze-screenshot", base),
        ..LockInConfig::default()
    };
    let app = AppState::from_parts(
        live,
        memory_store().await,
        FakeCapture::working(),
        FakeAnalysis::always(Ok(analysis("unused", None))),
    );
    assert!(app.check_connection().await.unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead = listener.local_addr().unwrap();
    drop(listener);
    let app = AppState::from_parts(
        LockInConfig {
            analysis_endpoint: format!("http://{}/analyze-screenshot", dead),
            ..LockInConfig::default()
        },
        memory_store().await,
        FakeCapture::working(),
        FakeAnalysis::always(Ok(analysis("unused", None))),
    );
    assert!(!app.check_connection().await.unwrap());
}
