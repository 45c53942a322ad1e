//! Configuration module for Outbound
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use outbound::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("outbound.toml")).unwrap();
//! println!("Retry attempts: {}", config.retry.max_attempts);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, Config, CrawlerConfig, HttpConfig, RetryConfig, ServiceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::MAX_CONCURRENCY;
