//! Outbound request pipeline
//!
//! Every layer implements [`Sender`] and holds the next layer by value:
//!
//! ```text
//! Cached -> Retry -> Telemetry -> HttpTransport
//! ```
//!
//! A `send` never fails with `Err`; the outcome, including cancellation and
//! defects caught in lower layers, is always a [`ResultEnvelope`].

mod cache;
mod client;
mod envelope;
mod request;
mod retry;
mod telemetry;
mod transport;

pub use cache::{CacheEntry, CacheStats, Cached, ResponseCache};
pub use client::{Pipeline, ServiceEndpoint};
pub use envelope::{
    FailureKind, ResultEnvelope, CANCELLED_MESSAGE, SERVICE_UNAVAILABLE, TRANSPORT_FAILURE_STATUS,
};
pub use request::{CacheKey, RequestDescriptor};
pub use retry::{
    is_transient, BackoffPolicy, Retry, RetryPolicy, RetryPredicate, DEFAULT_RETRYABLE_STATUSES,
};
pub use telemetry::Telemetry;
pub use transport::{build_http_client, HttpBody, HttpTransport};

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The call contract shared by the transport and every decorator
#[async_trait]
pub trait Sender<P>: Send + Sync {
    /// Performs the logical call described by `request`
    ///
    /// Implementations observe `cancel` at every suspension point and answer
    /// with a cancelled envelope once it fires.
    async fn send(&self, request: &RequestDescriptor, cancel: &CancellationToken) -> ResultEnvelope<P>;
}

#[async_trait]
impl<P, S> Sender<P> for Arc<S>
where
    P: 'static,
    S: Sender<P> + ?Sized,
{
    async fn send(&self, request: &RequestDescriptor, cancel: &CancellationToken) -> ResultEnvelope<P> {
        (**self).send(request, cancel).await
    }
}
