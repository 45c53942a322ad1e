//! HTTP transport
//!
//! This module performs the single physical call at the bottom of the
//! pipeline:
//! - Building HTTP clients with proper user agent strings
//! - Racing the request against the caller's cancellation token
//! - Classifying network errors and non-success statuses into envelopes

use crate::config::{Config, HttpConfig, UserAgentConfig};
use crate::pipeline::{RequestDescriptor, ResultEnvelope, Sender};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Maximum redirect hops followed per request
const MAX_REDIRECTS: usize = 10;

/// Body of a successful HTTP response
#[derive(Debug, Clone)]
pub struct HttpBody {
    /// Final URL after redirects
    pub final_url: String,
    /// Content-Type header value, if present
    pub content_type: Option<String>,
    /// Response body as text
    pub body: String,
}

impl HttpBody {
    /// True when the response declares (or omits) an HTML content type
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(true, |ct| ct.contains("text/html") || ct.contains("application/xhtml"))
    }

    /// Deserializes the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use outbound::config::{HttpConfig, UserAgentConfig};
/// use outbound::pipeline::build_http_client;
///
/// let ua = UserAgentConfig {
///     crawler_name: "Outbound".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&ua, &HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    http: &HttpConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(http.timeout())
        .connect_timeout(http.connect_timeout())
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs exactly one physical HTTP call per `send`
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(&config.user_agent, &config.http)?))
    }

    async fn execute(&self, request: &RequestDescriptor) -> ResultEnvelope<HttpBody> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone());

        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return ResultEnvelope::transport_failure(classify_error(&e)),
        };

        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return ResultEnvelope::failure(format!("HTTP {}", status), status.as_u16());
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.text().await {
            Ok(body) => ResultEnvelope::success(
                HttpBody {
                    final_url,
                    content_type,
                    body,
                },
                status.as_u16(),
            ),
            Err(e) => {
                ResultEnvelope::transport_failure(format!("Failed to read body: {}", classify_error(&e)))
            }
        }
    }
}

#[async_trait]
impl Sender<HttpBody> for HttpTransport {
    async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<HttpBody> {
        if cancel.is_cancelled() {
            return ResultEnvelope::cancelled();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("Request to {} cancelled", request.url());
                ResultEnvelope::cancelled()
            }
            envelope = self.execute(request) => envelope,
        }
    }
}

/// Maps a reqwest error to a short, stable description
fn classify_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection refused: {}", e)
    } else if e.is_redirect() {
        format!("Redirect error: {}", e)
    } else {
        e.to_string()
    }
}
