use outbound::executor::{Executor, TaskOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// A log line captured from the executor
#[derive(Debug, Clone)]
struct Captured {
    level: Level,
    task: Option<String>,
    message: String,
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureLayer {
    fn for_task(&self, task: &str) -> Vec<Captured> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.task.as_deref() == Some(task))
            .cloned()
            .collect()
    }
}

#[derive(Default)]
struct FieldVisitor {
    task: Option<String>,
    message: String,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "task" => self.task = Some(value.to_string()),
            "message" => self.message = value.to_string(),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "task" => self.task = Some(format!("{:?}", value).trim_matches('"').to_string()),
            "message" => self.message = format!("{:?}", value),
            _ => {}
        }
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            task: visitor.task,
            message: visitor.message,
        });
    }
}

/// Runs `f` on a current-thread runtime with the capture layer installed
fn with_capture<F, Fut>(f: F) -> CaptureLayer
where
    F: FnOnce(Executor) -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let executor = Executor::new();
        f(executor.clone()).await;
        executor.shutdown().await;
    });

    layer
}

#[test]
fn test_success_logs_once_at_debug() {
    let logs = with_capture(|executor| async move {
        executor.spawn("sync-feed", None, async { Ok(()) });
    });

    let events = logs.for_task("sync-feed");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::DEBUG);
}

#[test]
fn test_failure_logs_error_chain_once() {
    let logs = with_capture(|executor| async move {
        let handle = executor.spawn("import", None, async {
            let inner = anyhow::anyhow!("disk full");
            Err(inner.context("writing snapshot"))
        });
        assert!(matches!(handle.await.unwrap(), TaskOutcome::Failed(_)));
    });

    let events = logs.for_task("import");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::ERROR);
    assert!(events[0].message.contains("writing snapshot: disk full"));
}

#[test]
fn test_panic_logs_error_once() {
    let logs = with_capture(|executor| async move {
        executor.spawn("explode", None, async {
            if true {
                panic!("index out of range");
            }
            Ok(())
        });
    });

    let events = logs.for_task("explode");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::ERROR);
    assert!(events[0].message.contains("index out of range"));
}

#[test]
fn test_cancellation_logs_info_once() {
    let logs = with_capture(|executor| async move {
        let cancel = CancellationToken::new();
        let handle = executor.spawn("long-poll", Some(cancel.clone()), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), TaskOutcome::Cancelled);
    });

    let events = logs.for_task("long-poll");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].level, Level::INFO);
}
