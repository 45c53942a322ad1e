use crate::test_config;
use outbound::config::Config;
use outbound::pipeline::{FailureKind, Pipeline, RequestDescriptor, ResponseCache};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pipeline(config: &Config) -> Pipeline {
    let cache = Arc::new(ResponseCache::from_config(&config.cache));
    Pipeline::from_config(config, cache).expect("pipeline should build")
}

fn get(server: &MockServer, route: &str) -> RequestDescriptor {
    RequestDescriptor::get(Url::parse(&format!("{}{}", server.uri(), route)).unwrap())
}

#[derive(Debug, Deserialize)]
struct Forecast {
    city: String,
    temp: f64,
}

#[tokio::test]
async fn test_repeated_request_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(ResponseTemplate::new(200).set_body_string("payload"))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&test_config(""));
    let cancel = CancellationToken::new();

    let first = pipeline.send(&get(&server, "/cached"), &cancel).await;
    let second = pipeline.send(&get(&server, "/cached"), &cancel).await;

    assert!(first.is_success());
    assert!(!first.from_cache());
    assert!(second.from_cache());
    assert_eq!(second.payload().unwrap().body, "payload");
    assert_eq!(pipeline.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("once")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&test_config(""));
    let cancel = CancellationToken::new();

    let calls = (0..5).map(|_| {
        let pipeline = pipeline.clone();
        let request = get(&server, "/shared");
        let cancel = cancel.clone();
        async move { pipeline.send(&request, &cancel).await }
    });
    let envelopes = futures::future::join_all(calls).await;

    assert!(envelopes.iter().all(|e| e.is_success()));
    assert!(envelopes
        .iter()
        .all(|e| e.payload().map(|b| b.body.as_str()) == Some("once")));
}

#[tokio::test]
async fn test_transient_status_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("recovered"))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = pipeline(&test_config(""))
        .send(&get(&server, "/flaky"), &CancellationToken::new())
        .await;

    assert!(envelope.is_success());
    assert_eq!(envelope.attempts(), 3);
    assert_eq!(envelope.payload().unwrap().body, "recovered");
    assert!(envelope.elapsed().is_some());
}

#[tokio::test]
async fn test_retries_exhausted_and_failure_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .expect(6)
        .mount(&server)
        .await;

    let pipeline = pipeline(&test_config(""));
    let cancel = CancellationToken::new();

    let first = pipeline.send(&get(&server, "/down"), &cancel).await;
    let second = pipeline.send(&get(&server, "/down"), &cancel).await;

    for envelope in [&first, &second] {
        assert!(!envelope.is_success());
        assert_eq!(envelope.status(), 503);
        assert_eq!(envelope.attempts(), 3);
        assert!(!envelope.from_cache());
    }
    assert!(pipeline.cache().is_empty());
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let envelope = pipeline(&test_config(""))
        .send(&get(&server, "/gone"), &CancellationToken::new())
        .await;

    assert_eq!(envelope.status(), 404);
    assert_eq!(envelope.attempts(), 1);
}

#[tokio::test]
async fn test_service_endpoint_typed_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/weather"))
        .and(query_param("q", "Oslo"))
        .and(query_param("appid", "secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"city": "Oslo", "temp": -3.5}"#)
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(&format!(
        r#"
[services.weather]
base-url = "{}/v1/"
api-key = "secret"
api-key-param = "appid"
"#,
        server.uri()
    ));
    let weather = pipeline(&config).service("weather").unwrap();

    let envelope = weather
        .get_json::<Forecast>("weather?q=Oslo", &CancellationToken::new())
        .await;

    assert!(envelope.is_success());
    let forecast = envelope.into_payload().unwrap();
    assert_eq!(forecast.city, "Oslo");
    assert_eq!(forecast.temp, -3.5);
}

#[tokio::test]
async fn test_undecodable_json_is_internal_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let config = test_config(&format!("[services.weather]\nbase-url = \"{}/v1/\"\n", server.uri()));
    let envelope = pipeline(&config)
        .service("weather")
        .unwrap()
        .get_json::<Forecast>("weather", &CancellationToken::new())
        .await;

    assert!(!envelope.is_success());
    assert!(envelope.payload().is_none());
    assert_eq!(envelope.failure_kind(), Some(FailureKind::Internal));
    assert!(envelope.error().is_some());
}

#[tokio::test]
async fn test_cancelled_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = pipeline(&test_config(""));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let envelope = pipeline.send(&get(&server, "/slow"), &cancel).await;

    assert!(envelope.is_cancelled());
    assert_eq!(envelope.attempts(), 1);
}
