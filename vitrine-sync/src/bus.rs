//! Lifecycle event bus.
//!
//! Record mutations publish their [`LifecycleEvent`] to a bus holding an
//! ordered list of registered handlers. Every handler runs for every event;
//! a failing handler never stops the others and never undoes the mutation.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use vitrine_core::{LifecycleEvent, VitrineError, VitrineResult};

/// Reacts to committed record mutations.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    /// Short name used in logs and warnings.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &LifecycleEvent) -> VitrineResult<()>;
}

/// A handler that failed for a published event.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerFailure {
    pub handler: &'static str,
    pub error: VitrineError,
}

impl fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.handler, self.error)
    }
}

/// Outcome of publishing one event.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishReport {
    pub event: LifecycleEvent,
    pub failures: Vec<HandlerFailure>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Operator-facing summary of the failures, if any.
    pub fn warning(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        let parts: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        Some(format!("{} not fully propagated: {}", self.event, parts.join("; ")))
    }
}

/// Ordered list of lifecycle handlers.
#[derive(Clone, Default)]
pub struct LifecycleBus {
    handlers: Vec<Arc<dyn LifecycleHandler>>,
}

impl fmt::Debug for LifecycleBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&'static str> = self.handlers.iter().map(|h| h.name()).collect();
        f.debug_struct("LifecycleBus").field("handlers", &names).finish()
    }
}

impl LifecycleBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, handler: Arc<dyn LifecycleHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn register(&mut self, handler: Arc<dyn LifecycleHandler>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler for `event`, in registration order.
    pub async fn publish(&self, event: LifecycleEvent) -> PublishReport {
        let mut failures = Vec::new();
        for handler in &self.handlers {
            if let Err(error) = handler.handle(&event).await {
                tracing::warn!(
                    event = %event,
                    handler = handler.name(),
                    error = %error,
                    "lifecycle handler failed; mutation stands"
                );
                failures.push(HandlerFailure {
                    handler: handler.name(),
                    error,
                });
            }
        }
        PublishReport { event, failures }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vitrine_core::{QueueError, RecordId};

    struct Recorder {
        seen: Mutex<Vec<LifecycleEvent>>,
    }

    #[async_trait]
    impl LifecycleHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        async fn handle(&self, event: &LifecycleEvent) -> VitrineResult<()> {
            self.seen.lock().expect("lock").push(*event);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl LifecycleHandler for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn handle(&self, _event: &LifecycleEvent) -> VitrineResult<()> {
            Err(QueueError::Closed.into())
        }
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_handlers() {
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let bus = LifecycleBus::new()
            .with_handler(Arc::new(Failing))
            .with_handler(recorder.clone());

        let event = LifecycleEvent::Updated(RecordId::new(3));
        let report = bus.publish(event).await;

        assert!(!report.is_clean());
        assert_eq!(report.failures[0].handler, "failing");
        assert_eq!(*recorder.seen.lock().expect("lock"), vec![event]);
        let warning = report.warning().expect("warning");
        assert!(warning.contains("failing"));
    }

    #[tokio::test]
    async fn test_empty_bus_is_clean() {
        let report = LifecycleBus::new()
            .publish(LifecycleEvent::Created(RecordId::new(1)))
            .await;
        assert!(report.is_clean());
        assert_eq!(report.warning(), None);
    }
}
