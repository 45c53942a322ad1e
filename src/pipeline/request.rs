//! Request descriptors and the cache keys derived from them

use reqwest::Method;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Immutable description of one logical outbound call
///
/// The descriptor is built once and then only read; every pipeline layer
/// receives it by reference.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    body: Option<Arc<[u8]>>,
    headers: BTreeMap<String, String>,
    cache_ttl: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            body: None,
            headers: BTreeMap::new(),
            cache_ttl: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Attaches `payload` serialized as JSON and sets the content type
    pub fn with_json<T: Serialize + ?Sized>(self, payload: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(self
            .with_body(bytes)
            .with_header("content-type", "application/json"))
    }

    /// Attaches a raw request body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(Arc::from(body.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Overrides the cache TTL for this request; zero disables caching
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn no_cache(self) -> Self {
        self.with_cache_ttl(Duration::ZERO)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    /// Derives the cache identity: method, URL and payload digest
    pub fn cache_key(&self) -> CacheKey {
        let digest = self.body.as_deref().map(|bytes| {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize())
        });

        CacheKey {
            method: self.method.clone(),
            url: self.url.to_string(),
            digest,
            payload: self.body.clone(),
        }
    }
}

/// Identity of a logical request for caching and single-flight
///
/// Hashing uses the payload digest; equality additionally compares the
/// payload bytes, so a digest collision can never merge two requests.
#[derive(Debug, Clone)]
pub struct CacheKey {
    method: Method,
    url: String,
    digest: Option<String>,
    payload: Option<Arc<[u8]>>,
}

impl CacheKey {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Hex SHA-256 of the payload, if there is one
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
            && self.url == other.url
            && self.digest == other.digest
            && self.payload.as_deref() == other.payload.as_deref()
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method.as_str().hash(state);
        self.url.hash(state);
        self.digest.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)?;
        if let Some(digest) = &self.digest {
            write!(f, " #{}", &digest[..12.min(digest.len())])?;
        }
        Ok(())
    }
}
