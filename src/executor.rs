//! Fire-and-forget task executor
//!
//! Background work is launched with [`Executor::spawn`] and never awaited by
//! its caller. Each task's outcome is logged exactly once: failures with the
//! whole error chain, panics with the panic message, cancellation at info
//! and success at debug. Nothing escapes the task silently.
//!
//! ```no_run
//! use outbound::Executor;
//!
//! # async fn run() {
//! let executor = Executor::new();
//! executor.spawn("refresh-feed", None, async {
//!     // ... outbound calls ...
//!     Ok(())
//! });
//! executor.shutdown().await;
//! # }
//! ```

use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How a spawned task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    /// Work returned an error; holds the rendered error chain
    Failed(String),
    /// Work panicked; holds the panic message
    Panicked(String),
    /// The cancellation token fired first
    Cancelled,
}

impl TaskOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::Completed => write!(f, "completed"),
            TaskOutcome::Failed(e) => write!(f, "failed: {}", e),
            TaskOutcome::Panicked(msg) => write!(f, "panicked: {}", msg),
            TaskOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Spawns observed background tasks on the current tokio runtime
#[derive(Debug, Clone, Default)]
pub struct Executor {
    tracker: TaskTracker,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launches `work` and returns immediately
    ///
    /// The handle may be dropped; the task keeps running and still logs its
    /// outcome.
    pub fn spawn<F>(
        &self,
        name: impl Into<String>,
        cancel: Option<CancellationToken>,
        work: F,
    ) -> JoinHandle<TaskOutcome>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();

        self.tracker.spawn(async move {
            let guarded = AssertUnwindSafe(work).catch_unwind();

            let outcome = match cancel {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => TaskOutcome::Cancelled,
                        result = guarded => into_outcome(result),
                    }
                }
                None => into_outcome(guarded.await),
            };

            log_outcome(&name, &outcome);
            outcome
        })
    }

    /// Number of spawned tasks that have not finished
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting new work and waits for running tasks to finish
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

fn into_outcome(result: std::thread::Result<anyhow::Result<()>>) -> TaskOutcome {
    match result {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(e)) => TaskOutcome::Failed(error_chain(&e)),
        Err(panic) => TaskOutcome::Panicked(panic_message(panic.as_ref())),
    }
}

fn log_outcome(name: &str, outcome: &TaskOutcome) {
    match outcome {
        TaskOutcome::Completed => tracing::debug!(task = name, "Background task completed"),
        TaskOutcome::Failed(e) => tracing::error!(task = name, "Background task failed: {}", e),
        TaskOutcome::Panicked(msg) => {
            tracing::error!(task = name, "Background task panicked: {}", msg)
        }
        TaskOutcome::Cancelled => tracing::info!(task = name, "Background task cancelled"),
    }
}

/// Renders an error and all of its sources on one line
fn error_chain(e: &anyhow::Error) -> String {
    e.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

/// Extracts the message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
