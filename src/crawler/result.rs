//! Crawl results and the final report

use crate::crawler::CrawlStatus;
use crate::pipeline::{HttpBody, ResultEnvelope};
use std::time::Duration;
use url::Url;

/// Outcome of fetching one page
///
/// Built once when the fetch completes and only read afterwards.
#[derive(Debug, Clone)]
pub struct CrawlResult {
    url: Url,
    envelope: ResultEnvelope<HttpBody>,
    links: Vec<Url>,
    title: Option<String>,
    sequence: u64,
}

impl CrawlResult {
    pub(crate) fn new(
        url: Url,
        envelope: ResultEnvelope<HttpBody>,
        links: Vec<Url>,
        title: Option<String>,
        sequence: u64,
    ) -> Self {
        Self {
            url,
            envelope,
            links,
            title,
            sequence,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn envelope(&self) -> &ResultEnvelope<HttpBody> {
        &self.envelope
    }

    /// Same-domain links found on the page, deduplicated, in page order
    pub fn links(&self) -> &[Url] {
        &self.links
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// 1-based dispatch order of this page within its run
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_success(&self) -> bool {
        self.envelope.is_success()
    }
}

/// Everything a finished crawl run produced
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub status: CrawlStatus,
    /// Results in completion order
    pub results: Vec<CrawlResult>,
    pub dispatched: u64,
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Looks up the result for `url`, if it was fetched
    pub fn result_for(&self, url: &str) -> Option<&CrawlResult> {
        self.results.iter().find(|r| r.url.as_str() == url)
    }
}
