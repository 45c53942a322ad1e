use crate::test_config;
use outbound::pipeline::{FailureKind, HttpTransport, RequestDescriptor, Sender};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> HttpTransport {
    HttpTransport::from_config(&test_config("")).expect("client should build")
}

fn get(server: &MockServer, route: &str) -> RequestDescriptor {
    RequestDescriptor::get(Url::parse(&format!("{}{}", server.uri(), route)).unwrap())
}

#[tokio::test]
async fn test_success_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .and(header("user-agent", "TestBot/1.0.0 (+https://example.com/contact; test@example.com)"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("hi there")
                .insert_header("content-type", "text/plain"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let envelope = transport()
        .send(&get(&server, "/hello"), &CancellationToken::new())
        .await;

    assert!(envelope.is_success());
    assert_eq!(envelope.status(), 200);
    assert!(envelope.error().is_none());

    let body = envelope.payload().unwrap();
    assert_eq!(body.body, "hi there");
    assert_eq!(body.content_type.as_deref(), Some("text/plain"));
    assert!(!body.is_html());
}

#[tokio::test]
async fn test_not_found_is_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let envelope = transport()
        .send(&get(&server, "/missing"), &CancellationToken::new())
        .await;

    assert!(!envelope.is_success());
    assert!(envelope.payload().is_none());
    assert_eq!(envelope.status(), 404);
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Status));
    assert!(envelope.error().unwrap().contains("404"));
}

#[tokio::test]
async fn test_server_error_is_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let envelope = transport()
        .send(&get(&server, "/busy"), &CancellationToken::new())
        .await;

    assert_eq!(envelope.status(), 503);
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Status));
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let request = RequestDescriptor::get(Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap());

    let envelope = transport().send(&request, &CancellationToken::new()).await;

    assert!(!envelope.is_success());
    assert_eq!(envelope.status(), 0);
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Transport));
    assert!(envelope.error().is_some());
}

#[tokio::test]
async fn test_timeout_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let envelope = transport()
        .send(&get(&server, "/slow"), &CancellationToken::new())
        .await;

    assert_eq!(envelope.status(), 0);
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Transport));
    assert_eq!(envelope.error(), Some("Request timeout"));
}

#[tokio::test]
async fn test_cancellation_interrupts_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let envelope = transport().send(&get(&server, "/slow"), &cancel).await;

    assert!(envelope.is_cancelled());
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Cancelled));
    assert!(started.elapsed() < Duration::from_millis(700));
}

#[tokio::test]
async fn test_post_sends_json_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"name": "lamp"})))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id": 7}"#))
        .expect(1)
        .mount(&server)
        .await;

    let request = RequestDescriptor::post(Url::parse(&format!("{}/items", server.uri())).unwrap())
        .with_json(&serde_json::json!({"name": "lamp"}))
        .unwrap();
    let envelope = transport().send(&request, &CancellationToken::new()).await;

    assert!(envelope.is_success());
    assert_eq!(envelope.status(), 201);
    let created: serde_json::Value = envelope.payload().unwrap().json().unwrap();
    assert_eq!(created["id"], 7);
}
