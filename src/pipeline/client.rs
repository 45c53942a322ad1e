//! Composed pipeline and typed service calls

use crate::config::{Config, ServiceConfig};
use crate::pipeline::{
    Cached, HttpBody, HttpTransport, RequestDescriptor, ResponseCache, ResultEnvelope, Retry,
    RetryPolicy, Sender, Telemetry,
};
use crate::OutboundError;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// The full decorator stack behind a cheap, cloneable handle
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use outbound::pipeline::{Pipeline, ResponseCache};
/// use outbound::config::load_config;
/// use std::path::Path;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> outbound::Result<()> {
/// let config = load_config(Path::new("outbound.toml"))?;
/// let cache = Arc::new(ResponseCache::from_config(&config.cache));
/// let pipeline = Pipeline::from_config(&config, cache)?;
///
/// let weather = pipeline.service("weather")?;
/// let envelope = weather
///     .get_json::<serde_json::Value>("weather?q=Oslo", &CancellationToken::new())
///     .await;
/// println!("status {} in {:?} ms", envelope.status(), envelope.elapsed_ms());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Pipeline {
    sender: Arc<dyn Sender<HttpBody>>,
    cache: Arc<ResponseCache<HttpBody>>,
    services: Arc<BTreeMap<String, ServiceConfig>>,
}

impl Pipeline {
    /// Wraps `transport` in telemetry, retry and caching, outermost last
    pub fn compose<S>(transport: S, policy: RetryPolicy, cache: Arc<ResponseCache<HttpBody>>) -> Self
    where
        S: Sender<HttpBody> + 'static,
    {
        let stack = Cached::new(
            Retry::new(Telemetry::new(transport), policy),
            Arc::clone(&cache),
        );

        Self {
            sender: Arc::new(stack),
            cache,
            services: Arc::new(BTreeMap::new()),
        }
    }

    /// Builds the standard stack over an [`HttpTransport`]
    pub fn from_config(
        config: &Config,
        cache: Arc<ResponseCache<HttpBody>>,
    ) -> Result<Self, OutboundError> {
        let transport = HttpTransport::from_config(config)?;
        let policy = RetryPolicy::from_config(&config.retry);

        Ok(Self::compose(transport, policy, cache).with_services(config.services.clone()))
    }

    pub fn with_services(mut self, services: BTreeMap<String, ServiceConfig>) -> Self {
        self.services = Arc::new(services);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache<HttpBody>> {
        &self.cache
    }

    pub async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<HttpBody> {
        self.sender.send(request, cancel).await
    }

    /// Sends `request` and decodes a successful body as JSON
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<T> {
        self.send(request, cancel)
            .await
            .and_then(|body| body.json::<T>())
    }

    /// Handle for a service declared under `[services.NAME]`
    pub fn service(&self, name: &str) -> Result<ServiceEndpoint, OutboundError> {
        let config = self
            .services
            .get(name)
            .ok_or_else(|| OutboundError::UnknownService(name.to_string()))?;

        Ok(ServiceEndpoint {
            name: name.to_string(),
            base_url: Url::parse(&config.base_url)?,
            api_key: config.api_key.clone(),
            api_key_param: config.api_key_param.clone(),
            cache_ttl: config.cache_ttl_secs.map(Duration::from_secs),
            pipeline: self.clone(),
        })
    }
}

#[async_trait]
impl Sender<HttpBody> for Pipeline {
    async fn send(
        &self,
        request: &RequestDescriptor,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<HttpBody> {
        self.sender.send(request, cancel).await
    }
}

/// A configured external JSON API
#[derive(Clone)]
pub struct ServiceEndpoint {
    name: String,
    base_url: Url,
    api_key: Option<String>,
    api_key_param: String,
    cache_ttl: Option<Duration>,
    pipeline: Pipeline,
}

impl ServiceEndpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL and attaches the API key
    pub fn request(&self, method: Method, path: &str) -> Result<RequestDescriptor, OutboundError> {
        let mut url = self.base_url.join(path)?;
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair(&self.api_key_param, key);
        }

        let request = RequestDescriptor::new(method, url).with_header("accept", "application/json");
        Ok(match self.cache_ttl {
            Some(ttl) => request.with_cache_ttl(ttl),
            None => request,
        })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<T> {
        match self.request(Method::GET, path) {
            Ok(request) => self.pipeline.send_json(&request, cancel).await,
            Err(e) => self.invalid_request(e),
        }
    }

    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> ResultEnvelope<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = match self.request(Method::POST, path) {
            Ok(request) => request,
            Err(e) => return self.invalid_request(e),
        };

        match request.with_json(body) {
            Ok(request) => self.pipeline.send_json(&request, cancel).await,
            Err(e) => self.invalid_request(e),
        }
    }

    fn invalid_request<T>(&self, e: impl std::fmt::Display) -> ResultEnvelope<T> {
        tracing::error!("Could not build request for service {}: {}", self.name, e);
        ResultEnvelope::internal(format!("invalid request for {}: {}", self.name, e))
    }
}
