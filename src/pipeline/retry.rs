//! Retry decorator and backoff policy
//!
//! [`Retry`] re-invokes the inner layer while the failure is retryable and
//! attempts remain. Delays come from a [`BackoffPolicy`]: retry `n`
//! (0-indexed) waits `first × factor^n`, clamped to `max`.
//!
//! ```
//! use std::time::Duration;
//! use outbound::pipeline::BackoffPolicy;
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(1),
//!     factor: 2.0,
//! };
//! assert_eq!(backoff.next(0), Duration::from_millis(100));
//! assert_eq!(backoff.next(1), Duration::from_millis(200));
//! assert_eq!(backoff.next(10), Duration::from_secs(1));
//! ```

use crate::config::RetryConfig;
use crate::pipeline::{FailureKind, RequestDescriptor, ResultEnvelope, Sender};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Statuses retried when no other set is configured
pub const DEFAULT_RETRYABLE_STATUSES: &[u16] = &[408, 429, 503];

/// Delay growth between retries
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub first: Duration,
    /// Cap for any single delay
    pub max: Duration,
    /// Multiplicative growth factor (`1.0` means constant delay)
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(200),
            max: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay between retries
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
        }
    }

    /// Delay before retry number `retry` (0-indexed)
    pub fn next(&self, retry: u32) -> Duration {
        let exponent = retry.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exponent);

        if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Decides whether a failure with this kind and status should be retried
pub type RetryPredicate = Arc<dyn Fn(FailureKind, u16) -> bool + Send + Sync>;

/// Default retry decision
///
/// Transport failures are retried, status failures only when the status is
/// in `transient`. Cancellation and internal defects never are.
pub fn is_transient(transient: &[u16], kind: FailureKind, status: u16) -> bool {
    match kind {
        FailureKind::Transport => true,
        FailureKind::Status => transient.contains(&status),
        FailureKind::Cancelled | FailureKind::Internal => false,
    }
}

/// Attempt budget, backoff and retry predicate
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffPolicy,
    retryable: RetryPredicate,
}

impl RetryPolicy {
    /// Policy retrying the default transient statuses
    pub fn new(max_attempts: u32, backoff: BackoffPolicy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable: Arc::new(|kind, status| {
                is_transient(DEFAULT_RETRYABLE_STATUSES, kind, status)
            }),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let backoff = BackoffPolicy {
            first: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
            factor: config.backoff_factor,
        };
        Self::new(config.max_attempts, backoff)
            .with_retryable_statuses(config.retryable_statuses.clone())
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, BackoffPolicy::fixed(Duration::ZERO))
    }

    pub fn with_retryable_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.retryable = Arc::new(move |kind, status| is_transient(&statuses, kind, status));
        self
    }

    /// Replaces the retry decision entirely
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(FailureKind, u16) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    pub fn is_retryable<P>(&self, envelope: &ResultEnvelope<P>) -> bool {
        match envelope.failure_kind() {
            Some(kind) => (self.retryable)(kind, envelope.status()),
            None => false,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, BackoffPolicy::default())
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

pub struct Retry<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retry<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S, P> Sender<P> for Retry<S>
where
    S: Sender<P>,
    P: Send + 'static,
{
    async fn send(&self, request: &RequestDescriptor, cancel: &CancellationToken) -> ResultEnvelope<P> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let mut envelope = self.inner.send(request, cancel).await;
            envelope.set_attempts(attempt);

            if envelope.is_success() {
                return envelope;
            }

            if !self.policy.is_retryable(&envelope) {
                return envelope;
            }

            if attempt >= self.policy.max_attempts {
                tracing::warn!(
                    url = %request.url(),
                    attempts = attempt,
                    "Giving up: {}",
                    envelope.error().unwrap_or_default()
                );
                return envelope;
            }

            let delay = self.policy.backoff.next(attempt - 1);
            tracing::warn!(
                url = %request.url(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Retrying after failure: {}",
                envelope.error().unwrap_or_default()
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let mut cancelled = ResultEnvelope::cancelled();
                    cancelled.set_attempts(attempt);
                    cancelled.record_elapsed_since(started);
                    return cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
