//! Outbound: a resilient outbound HTTP pipeline and a bounded site crawler
//!
//! Every outbound call goes through one decorator stack
//! (caching → retry → telemetry → transport) that always answers with a
//! [`ResultEnvelope`](pipeline::ResultEnvelope). The crawler walks a domain's
//! link graph on top of that stack, deduplicating pages and honouring a page
//! budget.

pub mod config;
pub mod crawler;
pub mod executor;
pub mod pipeline;
pub mod url;

use thiserror::Error;

/// Main error type for setup-time operations
///
/// Requests themselves never fail with this type; their outcome is carried
/// by the envelope.
#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for setup-time operations
pub type Result<T> = std::result::Result<T, OutboundError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlReport, CrawlResult, CrawlStatus, Crawler};
pub use executor::{Executor, TaskOutcome};
pub use pipeline::{
    Cached, HttpBody, HttpTransport, Pipeline, RequestDescriptor, ResponseCache, ResultEnvelope,
    Retry, RetryPolicy, Sender, Telemetry,
};
pub use crate::url::{normalize_url, same_domain};
