use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for Outbound
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// External APIs keyed by name ("weather", "trivia", "github", ...)
    #[serde(default)]
    pub services: BTreeMap<String, ServiceConfig>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the client
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the client
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the client
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Transport timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout (seconds)
    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Retry layer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total physical attempts per logical request, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "initial-backoff-ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for any single retry delay (milliseconds)
    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: u64,

    /// Multiplicative growth factor between retries
    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,

    /// HTTP statuses treated as transient
    #[serde(rename = "retryable-statuses")]
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            backoff_factor: 2.0,
            retryable_statuses: vec![408, 429, 503],
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Default time-to-live for cached success responses (seconds)
    #[serde(rename = "ttl-secs")]
    pub ttl_secs: u64,

    /// Optional cap on stored entries
    #[serde(rename = "max-entries")]
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of page fetches per crawl run
    #[serde(rename = "page-budget")]
    pub page_budget: usize,

    /// Maximum number of page fetches in flight at once
    #[serde(rename = "concurrency")]
    pub concurrency: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            page_budget: 100,
            concurrency: 4,
        }
    }
}

/// One external API reachable through the pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL that relative request paths are resolved against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// API key appended as a query parameter, if the service needs one
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    /// Name of the query parameter carrying the API key
    #[serde(rename = "api-key-param", default = "default_api_key_param")]
    pub api_key_param: String,

    /// Per-service cache TTL override (seconds)
    #[serde(rename = "cache-ttl-secs", default)]
    pub cache_ttl_secs: Option<u64>,
}

fn default_api_key_param() -> String {
    "api_key".to_string()
}
