//! Cancellable execution context
//!
//! A `CancelSource` owns one side of a watch channel; every `ExecContext`
//! cloned from it observes the cancel signal. Workers and carrier traversal
//! check the context at their natural checkpoints rather than being
//! interrupted mid-operation.

use std::sync::Arc;

use tokio::sync::watch;

/// The cancelling side of an execution context
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

impl CancelSource {
    /// Create a source and its first context
    pub fn new() -> (Self, ExecContext) {
        let (tx, rx) = watch::channel(false);
        let ctx = ExecContext {
            rx,
            _keepalive: None,
        };
        (Self { tx }, ctx)
    }

    /// Signal cancellation to all contexts; idempotent
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Derive another context observing this source
    pub fn context(&self) -> ExecContext {
        ExecContext {
            rx: self.tx.subscribe(),
            _keepalive: None,
        }
    }
}

/// A cancellation-observing handle passed into handlers and workers
#[derive(Debug, Clone)]
pub struct ExecContext {
    rx: watch::Receiver<bool>,
    // Keeps the sender alive for detached contexts
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl ExecContext {
    /// A context that is never cancelled
    pub fn detached() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    /// Check for cancellation without blocking
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancellation is signalled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                // Source dropped without cancelling; treat as never-cancelled
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_observed_by_all_contexts() {
        let (source, ctx) = CancelSource::new();
        let other = source.context();
        assert!(!ctx.is_cancelled());
        assert!(!other.is_cancelled());

        source.cancel();
        assert!(ctx.is_cancelled());
        assert!(other.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let (source, ctx) = CancelSource::new();
        let waiter = tokio::spawn(async move { ctx.cancelled().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        source.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should observe cancellation")
            .unwrap();
    }

    #[test]
    fn test_detached_never_cancelled() {
        let ctx = ExecContext::detached();
        assert!(!ctx.is_cancelled());
    }
}
