//! Crawler coordinator - main crawl orchestration logic
//!
//! One orchestrating future owns the [`CrawlState`] for a run. Page fetches
//! are dispatched through the [`Executor`], each with its own task, and report
//! back over an mpsc channel; only the orchestrator mutates state, so dedup
//! and budget decisions need no locks.

use crate::config::CrawlerConfig;
use crate::config::MAX_CONCURRENCY;
use crate::crawler::links::{parse_html, same_domain_links};
use crate::crawler::{CrawlReport, CrawlResult, CrawlState, CrawlStatus};
use crate::executor::Executor;
use crate::pipeline::{HttpBody, RequestDescriptor, ResultEnvelope, Sender};
use crate::url::normalize_url;
use crate::OutboundError;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Bounded, deduplicating crawler over any [`Sender`]
///
/// # Example
///
/// ```no_run
/// use outbound::{Crawler, Pipeline, ResponseCache};
/// use outbound::config::load_config;
/// use std::path::Path;
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> outbound::Result<()> {
/// let config = load_config(Path::new("outbound.toml"))?;
/// let cache = Arc::new(ResponseCache::from_config(&config.cache));
/// let crawler = Crawler::new(Pipeline::from_config(&config, cache)?);
///
/// let report = crawler
///     .crawl("https://example.com/", 50, 4, &CancellationToken::new())
///     .await?;
/// println!("{}: {} pages", report.status, report.results.len());
/// # Ok(())
/// # }
/// ```
pub struct Crawler<S> {
    sender: Arc<S>,
    executor: Executor,
    defaults: CrawlerConfig,
}

impl<S> Crawler<S>
where
    S: Sender<HttpBody> + 'static,
{
    pub fn new(sender: S) -> Self {
        Self::from_shared(Arc::new(sender))
    }

    pub fn from_shared(sender: Arc<S>) -> Self {
        Self {
            sender,
            executor: Executor::new(),
            defaults: CrawlerConfig::default(),
        }
    }

    /// Dispatches page fetches through `executor` instead of a private one
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Budget and width used by [`Crawler::crawl_with_defaults`]
    pub fn with_defaults(mut self, defaults: CrawlerConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Runs one crawl to completion and returns everything it collected
    ///
    /// Only an unusable seed is an error. Fetch failures, budget exhaustion
    /// and cancellation all produce a report holding the results gathered so
    /// far.
    pub async fn crawl(
        &self,
        seed: &str,
        budget: usize,
        width: usize,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, OutboundError> {
        let seed = normalize_url(seed)?;
        Ok(self.run(seed, budget, width, cancel.clone(), None).await)
    }

    pub async fn crawl_with_defaults(
        &self,
        seed: &str,
        cancel: &CancellationToken,
    ) -> Result<CrawlReport, OutboundError> {
        self.crawl(seed, self.defaults.page_budget, self.defaults.concurrency, cancel)
            .await
    }

    /// Starts a crawl in the background and yields results as pages finish
    ///
    /// Must be called from within a tokio runtime.
    pub fn stream(
        &self,
        seed: &str,
        budget: usize,
        width: usize,
        cancel: &CancellationToken,
    ) -> Result<CrawlStream, OutboundError> {
        let seed = normalize_url(seed)?;
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = oneshot::channel();

        let run = Self {
            sender: Arc::clone(&self.sender),
            executor: self.executor.clone(),
            defaults: self.defaults.clone(),
        };
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let report = run.run(seed, budget, width, cancel, Some(results_tx)).await;
            // The consumer may have stopped listening
            let _ = report_tx.send(report);
        });

        Ok(CrawlStream {
            results: UnboundedReceiverStream::new(results_rx),
            report: report_rx,
        })
    }

    async fn run(
        &self,
        seed: Url,
        budget: usize,
        width: usize,
        cancel: CancellationToken,
        observer: Option<mpsc::UnboundedSender<CrawlResult>>,
    ) -> CrawlReport {
        let started = Instant::now();
        let width = width.clamp(1, MAX_CONCURRENCY);

        // Fetches still running when this future is dropped get cancelled
        let run_cancel = cancel.child_token();
        let _abort_on_drop = run_cancel.clone().drop_guard();

        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut state = CrawlState::new(seed.clone(), budget as u64);
        let mut status = CrawlStatus::Idle.begin(run_cancel.is_cancelled());
        let mut in_flight = 0usize;
        let mut results = Vec::new();

        if status == CrawlStatus::Running {
            tracing::info!(
                "Starting crawl of {} (budget {}, width {})",
                seed,
                budget,
                width
            );
        } else {
            tracing::info!("Crawl of {} cancelled before it started", seed);
        }

        loop {
            if status == CrawlStatus::Running && run_cancel.is_cancelled() {
                status = CrawlStatus::Cancelled;
            }

            if status == CrawlStatus::Running {
                while in_flight < width {
                    let Some((url, sequence)) = state.next_dispatch() else {
                        break;
                    };
                    self.dispatch(url, sequence, &seed, &run_cancel, &done_tx);
                    in_flight += 1;
                }
            }

            if in_flight == 0 {
                break;
            }

            tokio::select! {
                biased;
                _ = run_cancel.cancelled(), if status == CrawlStatus::Running => {
                    tracing::info!("Crawl of {} cancelled, draining {} in-flight pages", seed, in_flight);
                    status = CrawlStatus::Cancelled;
                }
                received = done_rx.recv() => {
                    let Some(result) = received else { break };
                    in_flight -= 1;

                    let fresh = result
                        .links()
                        .iter()
                        .filter(|link| state.discover((*link).clone()))
                        .count();

                    tracing::debug!(
                        url = %result.url(),
                        sequence = result.sequence(),
                        status = result.envelope().status(),
                        new_links = fresh,
                        "Page finished"
                    );

                    if let Some(observer) = &observer {
                        let _ = observer.send(result.clone());
                    }
                    results.push(result);
                }
            }
        }

        let status = match status {
            CrawlStatus::Cancelled => CrawlStatus::Cancelled,
            _ if state.is_budget_exhausted() && state.has_unfetched() => CrawlStatus::BudgetExhausted,
            _ => CrawlStatus::Completed,
        };

        let report = CrawlReport {
            status,
            results,
            dispatched: state.dispatched(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            "Crawl of {} {}: {} pages fetched ({} ok, {} failed), {} left unfetched, {:.2}s",
            seed,
            report.status,
            report.results.len(),
            report.succeeded(),
            report.failed(),
            state.pending() + state.overflow(),
            report.elapsed.as_secs_f64()
        );

        report
    }

    /// Launches one page fetch; its result always comes back on `done`
    fn dispatch(
        &self,
        url: Url,
        sequence: u64,
        site: &Url,
        cancel: &CancellationToken,
        done: &mpsc::UnboundedSender<CrawlResult>,
    ) {
        let ticket = PageTicket::new(url.clone(), sequence, done.clone());
        let sender = Arc::clone(&self.sender);
        let site = site.clone();
        let token = cancel.clone();

        self.executor
            .spawn(format!("crawl page #{}", sequence), Some(cancel.clone()), async move {
                let request = RequestDescriptor::get(url.clone());
                let envelope = sender.send(&request, &token).await;
                let (title, links) = page_links(&envelope, &url, &site);
                ticket.complete(CrawlResult::new(url, envelope, links, title, sequence))
            });
    }
}

/// Title and same-domain links of a successfully fetched HTML page
fn page_links(
    envelope: &ResultEnvelope<HttpBody>,
    url: &Url,
    site: &Url,
) -> (Option<String>, Vec<Url>) {
    match envelope.payload() {
        Some(body) if body.is_html() => {
            let base = Url::parse(&body.final_url).unwrap_or_else(|_| url.clone());
            let page = parse_html(&body.body, &base);
            let links = same_domain_links(&page, site);
            (page.title, links)
        }
        _ => (None, Vec::new()),
    }
}

/// Guarantees exactly one result per dispatched page
///
/// If the fetch task is cancelled or aborted before completing, dropping
/// the ticket reports a cancelled result in its place, timed from dispatch.
struct PageTicket {
    url: Url,
    sequence: u64,
    dispatched_at: Instant,
    done: Option<mpsc::UnboundedSender<CrawlResult>>,
}

impl PageTicket {
    fn new(url: Url, sequence: u64, done: mpsc::UnboundedSender<CrawlResult>) -> Self {
        Self {
            url,
            sequence,
            dispatched_at: Instant::now(),
            done: Some(done),
        }
    }

    fn complete(mut self, result: CrawlResult) -> anyhow::Result<()> {
        let done = self
            .done
            .take()
            .ok_or_else(|| anyhow::anyhow!("page #{} already reported", self.sequence))?;
        done.send(result)
            .map_err(|_| anyhow::anyhow!("crawl run ended before page {} was reported", self.url))
    }
}

impl Drop for PageTicket {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            let mut envelope = ResultEnvelope::cancelled();
            envelope.record_elapsed_since(self.dispatched_at);
            let result = CrawlResult::new(
                self.url.clone(),
                envelope,
                Vec::new(),
                None,
                self.sequence,
            );
            let _ = done.send(result);
        }
    }
}

/// Results of a background crawl, in completion order
///
/// The stream ends when the run terminates; [`CrawlStream::report`] then
/// yields the final report.
pub struct CrawlStream {
    results: UnboundedReceiverStream<CrawlResult>,
    report: oneshot::Receiver<CrawlReport>,
}

impl CrawlStream {
    /// Waits for the run to finish
    ///
    /// Returns `None` only if the run task died without reporting.
    pub async fn report(self) -> Option<CrawlReport> {
        self.report.await.ok()
    }
}

impl Stream for CrawlStream {
    type Item = CrawlResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.results).poll_next(cx)
    }
}
