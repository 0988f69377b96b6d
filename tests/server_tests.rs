//! HTTP-level tests for the relay endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use chat_relay::config::{Config, DEFAULT_SYSTEM_PROMPT};
use chat_relay::relay::{Message, Role};
use chat_relay::server::routes::{build_router, AppState};
use chat_relay::server::streaming::{WirePayload, WireStatus};
use chat_relay::upstream::mock::ScriptedBackend;

fn test_config() -> Config {
    let mut config = Config::default();
    config.relay.pacing_delay_ms = 0;
    config
}

fn router_with(backend: ScriptedBackend) -> Router {
    let state = Arc::new(AppState::new(Arc::new(test_config()), Arc::new(backend)));
    build_router(state).unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Payloads of the unnamed `data:` records, in order.
fn payloads(body: &str) -> Vec<WirePayload> {
    body.split("\n\n")
        .filter(|record| !record.is_empty() && !record.starts_with("event:"))
        .map(|record| {
            let json = record.strip_prefix("data: ").expect("data record");
            serde_json::from_str(json).unwrap()
        })
        .collect()
}

fn payload(status: WireStatus, data: &str) -> WirePayload {
    WirePayload {
        status,
        data: data.to_string(),
    }
}

fn post_chat(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_ask_query_streams_prompt_reply() {
    let backend = ScriptedBackend::fragments(["Hi", " there", "!"]);
    let app = router_with(backend.clone());

    let response = app
        .oneshot(
            Request::get("/ask_query?prompt=Hello")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
    assert_eq!(response.headers()[header::CONNECTION], "keep-alive");

    let body = body_string(response).await;
    assert_eq!(
        payloads(&body),
        vec![
            payload(WireStatus::Processing, "Hi"),
            payload(WireStatus::Processing, " there"),
            payload(WireStatus::Processing, "!"),
            payload(WireStatus::Complete, ""),
        ]
    );
    assert!(body.ends_with(
        "data: {\"status\":\"complete\",\"data\":\"\"}\n\n\
         event: complete\ndata: {\"status\":\"complete\",\"data\":\"\"}\n\n"
    ));

    let sent = backend.received();
    assert_eq!(
        sent[0].messages,
        vec![Message::system(DEFAULT_SYSTEM_PROMPT), Message::user("Hello")]
    );
}

#[tokio::test]
async fn test_ask_query_decodes_prompt() {
    let backend = ScriptedBackend::fragments(["ok"]);
    let app = router_with(backend.clone());

    let response = app
        .oneshot(
            Request::get("/ask_query?prompt=%EC%95%88%EB%85%95%0Ahi%20there")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    body_string(response).await;

    assert_eq!(backend.received()[0].messages[1].content, "안녕\nhi there");
}

#[tokio::test]
async fn test_chat_with_empty_upstream_completes() {
    let backend = ScriptedBackend::fragments(Vec::<String>::new());
    let app = router_with(backend.clone());

    let response = app
        .oneshot(post_chat(r#"{"messages":[{"role":"user","content":"Hi"}]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert_eq!(payloads(&body), vec![payload(WireStatus::Complete, "")]);

    let sent = backend.received();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].messages.len(), 2);
    assert_eq!(sent[0].messages[0].role, Role::System);
    assert_eq!(sent[0].messages[0].content, DEFAULT_SYSTEM_PROMPT);
    assert_eq!(sent[0].messages[1], Message::user("Hi"));
}

#[tokio::test]
async fn test_chat_auth_failure_is_error_event() {
    let app = router_with(ScriptedBackend::failing_auth("Incorrect API key provided"));

    let response = app
        .oneshot(post_chat(r#"{"messages":[{"role":"user","content":"Hi"}]}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert_eq!(
        payloads(&body),
        vec![payload(
            WireStatus::Error,
            "Authentication failed: Incorrect API key provided"
        )]
    );
    assert!(!body.contains("event: complete"));
}

#[tokio::test]
async fn test_empty_request_rejected_before_streaming() {
    let backend = ScriptedBackend::fragments(["never"]);
    let app = router_with(backend.clone());

    let response = app.oneshot(post_chat(r#"{"messages":[]}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_ne!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("messages"));
    assert!(backend.received().is_empty());
}

#[tokio::test]
async fn test_missing_prompt_rejected() {
    let backend = ScriptedBackend::fragments(["never"]);
    let app = router_with(backend.clone());

    let response = app
        .oneshot(Request::get("/ask_query").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(backend.received().is_empty());
}

#[tokio::test]
async fn test_chat_accepts_prompt_body() {
    let backend = ScriptedBackend::fragments(["ok"]);
    let app = router_with(backend.clone());

    let response = app.oneshot(post_chat(r#"{"prompt":"Hello"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_string(response).await;

    assert_eq!(backend.received()[0].messages[1], Message::user("Hello"));
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let app = router_with(ScriptedBackend::default());

    let response = app.oneshot(post_chat("{not json")).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_cors_allows_configured_origin() {
    let app = router_with(ScriptedBackend::default());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/chat")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn test_cors_rejects_other_origins() {
    let app = router_with(ScriptedBackend::default());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/chat")
                .header(header::ORIGIN, "http://evil.example")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // The configured origin is always echoed; the browser rejects the mismatch.
    let allowed = &response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN];
    assert_eq!(allowed, "http://localhost:5173");
    assert_ne!(allowed, "http://evil.example");
}

#[tokio::test]
async fn test_keep_alive_stream_still_ends() {
    let mut config = test_config();
    config.server.keep_alive_secs = 15;
    let state = Arc::new(AppState::new(
        Arc::new(config),
        Arc::new(ScriptedBackend::fragments(["Hi"])),
    ));
    let app = build_router(state).unwrap();

    let response = app
        .oneshot(Request::get("/ask_query?prompt=Hello").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

    let body = body_string(response).await;
    assert_eq!(
        payloads(&body),
        vec![
            payload(WireStatus::Processing, "Hi"),
            payload(WireStatus::Complete, ""),
        ]
    );
    assert!(body.ends_with(
        "event: complete\ndata: {\"status\":\"complete\",\"data\":\"\"}\n\n"
    ));
}

#[tokio::test]
async fn test_health() {
    let app = router_with(ScriptedBackend::default());

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "scripted");
    assert_eq!(body["model"], "gpt-3.5-turbo");
}

#[test]
fn test_invalid_cors_origin_fails_router() {
    let mut config = test_config();
    config.server.cors_origin = "bad\norigin".to_string();
    let state = Arc::new(AppState::new(
        Arc::new(config),
        Arc::new(ScriptedBackend::default()),
    ));
    assert!(build_router(state).is_err());
}
