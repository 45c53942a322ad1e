use crate::config::types::{
    CacheConfig, Config, CrawlerConfig, HttpConfig, RetryConfig, ServiceConfig, UserAgentConfig,
};
use crate::ConfigError;
use url::Url;

/// Upper bound for crawler concurrency
pub const MAX_CONCURRENCY: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_http_config(&config.http)?;
    validate_retry_config(&config.retry)?;
    validate_cache_config(&config.cache)?;
    validate_crawler_config(&config.crawler)?;
    for (name, service) in &config.services {
        validate_service_config(name, service)?;
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 || config.connect_timeout_secs > config.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be between 1 and timeout_secs ({}), got {}",
            config.timeout_secs, config.connect_timeout_secs
        )));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if !config.backoff_factor.is_finite() || config.backoff_factor < 1.0 {
        return Err(ConfigError::Validation(format!(
            "backoff_factor must be a finite number >= 1.0, got {}",
            config.backoff_factor
        )));
    }

    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "initial_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
            config.initial_backoff_ms, config.max_backoff_ms
        )));
    }

    if let Some(status) = config
        .retryable_statuses
        .iter()
        .find(|s| !(100..=599).contains(*s))
    {
        return Err(ConfigError::Validation(format!(
            "retryable_statuses contains an invalid HTTP status: {}",
            status
        )));
    }

    Ok(())
}

fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    if config.max_entries == Some(0) {
        return Err(ConfigError::Validation(
            "max_entries must be >= 1 when set".to_string(),
        ));
    }
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.page_budget < 1 {
        return Err(ConfigError::Validation(format!(
            "page_budget must be >= 1, got {}",
            config.page_budget
        )));
    }

    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    Ok(())
}

/// Validates one external service entry
fn validate_service_config(name: &str, config: &ServiceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url).map_err(|e| {
        ConfigError::InvalidUrl(format!(
            "Invalid base_url '{}' for service '{}': {}",
            config.base_url, name, e
        ))
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Service '{}' must use an HTTP(S) base_url, got '{}'",
            name, config.base_url
        )));
    }

    if config.api_key_param.is_empty() {
        return Err(ConfigError::Validation(format!(
            "api_key_param for service '{}' cannot be empty",
            name
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let local = parts[0];
    let domain = parts[1];

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
