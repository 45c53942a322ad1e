//! Telemetry decorator
//!
//! Wraps the raw transport call. It measures the physical call, stamps the
//! envelope with elapsed time and completion timestamp, and turns a panic
//! escaping the inner layer into an internal failure envelope.

use crate::executor::panic_message;
use crate::pipeline::{RequestDescriptor, ResultEnvelope, Sender};
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub struct Telemetry<S> {
    inner: S,
}

impl<S> Telemetry<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S, P> Sender<P> for Telemetry<S>
where
    S: Sender<P>,
    P: Send + 'static,
{
    async fn send(&self, request: &RequestDescriptor, cancel: &CancellationToken) -> ResultEnvelope<P> {
        let started = Instant::now();
        let outcome = AssertUnwindSafe(self.inner.send(request, cancel))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        let mut envelope = match outcome {
            Ok(envelope) => envelope,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    method = %request.method(),
                    url = %request.url(),
                    "Request panicked: {}",
                    message
                );
                ResultEnvelope::internal(format!("unexpected failure: {}", message))
            }
        };

        envelope.record_timing(elapsed, Utc::now());

        tracing::debug!(
            method = %request.method(),
            url = %request.url(),
            status = envelope.status(),
            success = envelope.is_success(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Request completed"
        );

        envelope
    }
}
