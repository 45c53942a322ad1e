//! Integration tests for the outbound pipeline and crawler
//!
//! These tests use wiremock to create mock HTTP servers and exercise the
//! real reqwest transport end-to-end.

mod crawl_tests;
mod executor_tests;
mod pipeline_tests;
mod transport_tests;

use outbound::config::{parse_config, Config};

/// Test configuration with fast retries and the given extra TOML appended
pub fn test_config(extra: &str) -> Config {
    let toml = format!(
        r#"
[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[http]
timeout-secs = 1
connect-timeout-secs = 1

[retry]
max-attempts = 3
initial-backoff-ms = 10
max-backoff-ms = 50
backoff-factor = 2.0

{}
"#,
        extra
    );
    parse_config(&toml).expect("test config should be valid")
}
