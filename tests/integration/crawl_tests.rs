use crate::test_config;
use outbound::crawler::{CrawlStatus, Crawler};
use outbound::pipeline::{Pipeline, ResponseCache};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn crawler() -> Crawler<Pipeline> {
    let config = test_config("");
    let cache = Arc::new(ResponseCache::from_config(&config.cache));
    Crawler::new(Pipeline::from_config(&config, cache).expect("pipeline should build"))
}

async fn mount_html(server: &MockServer, route: &str, title: &str, links: &[&str], hits: u64) {
    let anchors: String = links
        .iter()
        .map(|l| format!(r#"<a href="{}">{}</a>"#, l, l))
        .collect();

    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(
                    format!(
                        "<html><head><title>{}</title></head><body>{}</body></html>",
                        title, anchors
                    ),
                    "text/html; charset=utf-8",
                ),
        )
        .expect(hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let server = MockServer::start().await;
    let base = server.uri();
    let page1 = format!("{}/page1", base);

    mount_html(
        &server,
        "/",
        "Home",
        &[page1.as_str(), "/page2", "https://elsewhere.example/x"],
        1,
    )
    .await;
    mount_html(&server, "/page1", "Page 1", &["/page3", "/", "#top"], 1).await;
    mount_html(&server, "/page2", "Page 2", &["/page1/", "mailto:a@b.test"], 1).await;
    Mock::given(method("GET"))
        .and(path("/page3"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let report = crawler()
        .crawl(&format!("{}/", base), 20, 3, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.results.len(), 4);
    assert_eq!(report.dispatched, 4);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 1);

    let home = report.result_for(&format!("{}/", base)).unwrap();
    assert_eq!(home.title(), Some("Home"));
    assert_eq!(home.sequence(), 1);
    assert_eq!(home.links().len(), 2);

    let missing = report.result_for(&format!("{}/page3", base)).unwrap();
    assert_eq!(missing.envelope().status(), 404);
    assert_eq!(missing.envelope().attempts(), 1);
}

#[tokio::test]
async fn test_crawl_stops_at_budget() {
    let server = MockServer::start().await;

    mount_html(&server, "/", "Home", &["/a", "/b"], 1).await;
    mount_html(&server, "/a", "A", &["/c"], 1).await;
    mount_html(&server, "/b", "B", &[], 1).await;
    mount_html(&server, "/c", "C", &[], 0).await;

    let report = crawler()
        .crawl(&format!("{}/", server.uri()), 3, 2, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, CrawlStatus::BudgetExhausted);
    assert_eq!(report.results.len(), 3);
    assert!(report.result_for(&format!("{}/c", server.uri())).is_none());
}

#[tokio::test]
async fn test_non_html_pages_are_not_parsed() {
    let server = MockServer::start().await;

    mount_html(&server, "/", "Home", &["/data.json"], 1).await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"href": "<a href=\"/hidden\">x</a>"}"#)
                .insert_header("content-type", "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let report = crawler()
        .crawl(&format!("{}/", server.uri()), 10, 2, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(report.results.len(), 2);

    let data = report
        .result_for(&format!("{}/data.json", server.uri()))
        .unwrap();
    assert!(data.is_success());
    assert!(data.links().is_empty());
}

#[tokio::test]
async fn test_streamed_crawl_matches_report() {
    let server = MockServer::start().await;

    mount_html(&server, "/", "Home", &["/a", "/b"], 1).await;
    mount_html(&server, "/a", "A", &["/b"], 1).await;
    mount_html(&server, "/b", "B", &["/a"], 1).await;

    let mut stream = crawler()
        .stream(&format!("{}/", server.uri()), 10, 2, &CancellationToken::new())
        .unwrap();

    let mut seen = Vec::new();
    while let Some(result) = stream.next().await {
        seen.push(result.url().path().to_string());
    }
    seen.sort();

    let report = stream.report().await.unwrap();
    assert_eq!(report.status, CrawlStatus::Completed);
    assert_eq!(seen, vec!["/", "/a", "/b"]);
}
