//! Result envelope returned by every pipeline layer
//!
//! An envelope is the only way a request outcome travels back to callers.
//! Constructors enforce that a failure never carries a payload and always
//! carries an error message. Every layer that returns an envelope it did not
//! get from the layer below stamps its own timing before returning it.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::{Duration, Instant};

/// Status recorded when no HTTP response was ever received
pub const TRANSPORT_FAILURE_STATUS: u16 = 0;

/// Status used for failures that originate from unexpected faults
pub const SERVICE_UNAVAILABLE: u16 = 503;

/// Message carried by cancelled envelopes
pub const CANCELLED_MESSAGE: &str = "request cancelled";

/// Why a request failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Network-level failure: connect, DNS, timeout, body read
    Transport,
    /// The server answered with a non-success status
    Status,
    /// The caller cancelled the request
    Cancelled,
    /// An internal defect (panic, decode failure, bad descriptor)
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transport => "transport",
            Self::Status => "status",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Outcome, payload, timing and diagnostics for one logical request
#[derive(Debug, Clone)]
pub struct ResultEnvelope<T> {
    success: bool,
    status: u16,
    payload: Option<T>,
    error: Option<String>,
    failure: Option<FailureKind>,
    elapsed: Option<Duration>,
    completed_at: Option<DateTime<Utc>>,
    attempts: u32,
    from_cache: bool,
}

impl<T> ResultEnvelope<T> {
    /// A successful outcome carrying `payload`
    pub fn success(payload: T, status: u16) -> Self {
        Self {
            success: true,
            status,
            payload: Some(payload),
            error: None,
            failure: None,
            elapsed: None,
            completed_at: None,
            attempts: 1,
            from_cache: false,
        }
    }

    /// A failed outcome
    ///
    /// A status of [`TRANSPORT_FAILURE_STATUS`] classifies the failure as a
    /// transport failure, anything else as a status failure.
    pub fn failure(message: impl Into<String>, status: u16) -> Self {
        let kind = if status == TRANSPORT_FAILURE_STATUS {
            FailureKind::Transport
        } else {
            FailureKind::Status
        };
        Self::failed(kind, message.into(), status)
    }

    /// A network-level failure with no HTTP status
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::failed(
            FailureKind::Transport,
            message.into(),
            TRANSPORT_FAILURE_STATUS,
        )
    }

    /// A caller-requested cancellation
    pub fn cancelled() -> Self {
        Self::failed(
            FailureKind::Cancelled,
            CANCELLED_MESSAGE.to_string(),
            TRANSPORT_FAILURE_STATUS,
        )
    }

    /// A cancellation observed before any physical attempt was made
    pub fn cancelled_before_attempt() -> Self {
        let mut envelope = Self::cancelled();
        envelope.attempts = 0;
        envelope
    }

    /// An unexpected internal fault, reported as service unavailable
    pub fn internal(message: impl Into<String>) -> Self {
        Self::failed(FailureKind::Internal, message.into(), SERVICE_UNAVAILABLE)
    }

    fn failed(kind: FailureKind, mut message: String, status: u16) -> Self {
        if message.is_empty() {
            message = format!("{} failure", kind);
        }
        Self {
            success: false,
            status,
            payload: None,
            error: Some(message),
            failure: Some(kind),
            elapsed: None,
            completed_at: None,
            attempts: 1,
            from_cache: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// HTTP status, or [`TRANSPORT_FAILURE_STATUS`] when none was received
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure == Some(FailureKind::Cancelled)
    }

    /// Time spent in the physical call, if a telemetry layer measured it
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    pub fn elapsed_ms(&self) -> Option<u64> {
        self.elapsed.map(|d| d.as_millis() as u64)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Number of physical attempts behind this outcome
    ///
    /// Zero only for a cancellation that happened before any attempt.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True when the envelope was served from the response cache
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Stamps the measured duration and completion time
    pub fn record_timing(&mut self, elapsed: Duration, completed_at: DateTime<Utc>) {
        self.elapsed = Some(elapsed);
        self.completed_at = Some(completed_at);
    }

    /// Stamps the time spent since `started`, completing now
    pub fn record_elapsed_since(&mut self, started: Instant) {
        self.record_timing(started.elapsed(), Utc::now());
    }

    pub fn set_attempts(&mut self, attempts: u32) {
        self.attempts = attempts.max(1);
    }

    pub fn mark_from_cache(&mut self) {
        self.from_cache = true;
    }

    /// Converts the payload, keeping every other field
    pub fn map<U, F>(self, f: F) -> ResultEnvelope<U>
    where
        F: FnOnce(T) -> U,
    {
        ResultEnvelope {
            success: self.success,
            status: self.status,
            payload: self.payload.map(f),
            error: self.error,
            failure: self.failure,
            elapsed: self.elapsed,
            completed_at: self.completed_at,
            attempts: self.attempts,
            from_cache: self.from_cache,
        }
    }

    /// Converts the payload with a fallible step
    ///
    /// A conversion error turns the envelope into an internal failure; the
    /// timing and attempt metadata survive either way.
    pub fn and_then<U, E, F>(self, f: F) -> ResultEnvelope<U>
    where
        F: FnOnce(T) -> Result<U, E>,
        E: fmt::Display,
    {
        let ResultEnvelope {
            success,
            status,
            payload,
            error,
            failure,
            elapsed,
            completed_at,
            attempts,
            from_cache,
        } = self;

        let (success, payload, error, failure) = match payload.map(f) {
            Some(Ok(value)) => (success, Some(value), error, failure),
            Some(Err(e)) => (
                false,
                None,
                Some(format!("failed to convert payload: {}", e)),
                Some(FailureKind::Internal),
            ),
            None => (success, None, error, failure),
        };

        ResultEnvelope {
            success,
            status,
            payload,
            error,
            failure,
            elapsed,
            completed_at,
            attempts,
            from_cache,
        }
    }
}
