//! Per-release dispatch: one worker actor per release key
//!
//! Every `(namespace, name)` key gets a lazily created worker task that owns
//! the key's apply pipeline. The worker consumes a bounded mailbox of desired
//! state snapshots, coalesces triggers whose meaningful fields are unchanged,
//! and retries failed applies with exponential backoff up to a bounded number
//! of attempts. Applies for one key are strictly serialized; unrelated keys
//! run fully in parallel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use stevedore_core::Release;

use crate::context::{CancelSource, ExecContext};
use crate::error::{KubeError, Result};

/// The apply step invoked by workers
#[async_trait]
pub trait Applier: Send + Sync + 'static {
    /// Reconcile one release snapshot; must be idempotent
    async fn apply(&self, ctx: &ExecContext, release: &Release) -> Result<()>;
}

/// Tuning knobs for release workers
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Mailbox depth per release key
    pub mailbox_capacity: usize,
    /// Total apply attempts per trigger (first try included)
    pub max_attempts: u32,
    /// First retry delay; doubles per subsequent attempt
    pub base_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 64,
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

/// Identity of a release worker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseKey {
    pub namespace: String,
    pub name: String,
}

impl ReleaseKey {
    /// The key of a release
    pub fn of(release: &Release) -> Self {
        Self {
            namespace: release.namespace.clone(),
            name: release.name.clone(),
        }
    }
}

impl std::fmt::Display for ReleaseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Whether two snapshots ask for the same outcome
///
/// Compares the meaningful spec fields: config, template, suspend, and the
/// rollback target. Snapshots equal on all four are coalesced.
fn same_intent(a: &Release, b: &Release) -> bool {
    a.spec.config == b.spec.config
        && a.spec.template == b.spec.template
        && a.spec.suspend == b.spec.suspend
        && a.spec.rollback_to == b.spec.rollback_to
}

/// Handle to one release's worker task
pub struct ReleaseWorker {
    key: ReleaseKey,
    tx: mpsc::Sender<Release>,
    closed: Arc<AtomicBool>,
    cancel: CancelSource,
    handle: JoinHandle<()>,
}

impl ReleaseWorker {
    /// Spawn the worker task for a key
    pub fn spawn(key: ReleaseKey, applier: Arc<dyn Applier>, config: DispatcherConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity);
        let (cancel, ctx) = CancelSource::new();
        let handle = tokio::spawn(worker_loop(key.clone(), rx, ctx, applier, config));

        Self {
            key,
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            cancel,
            handle,
        }
    }

    /// Push a desired-state snapshot to the worker
    pub async fn enqueue(&self, release: Release) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(self.closed_error());
        }
        self.tx
            .send(release)
            .await
            .map_err(|_| self.closed_error())
    }

    /// Stop the worker after it finishes its current item; idempotent
    pub fn stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Whether the worker task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn closed_error(&self) -> KubeError {
        KubeError::HandlerClosed {
            name: self.key.name.clone(),
            namespace: self.key.namespace.clone(),
        }
    }
}

/// The worker loop: coalesce triggers, serialize applies, retry with backoff
///
/// `target` has exactly one writer (this task) and one reader (this task),
/// so no lock is involved; the retry schedule is a deadline on the select
/// loop rather than a shared queue.
async fn worker_loop(
    key: ReleaseKey,
    mut rx: mpsc::Receiver<Release>,
    ctx: ExecContext,
    applier: Arc<dyn Applier>,
    config: DispatcherConfig,
) {
    let mut target: Option<Release> = None;
    let mut attempts: u32 = 0;
    let mut next_attempt: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,

            received = rx.recv() => match received {
                None => break,
                Some(snapshot) => {
                    if target.as_ref().is_some_and(|t| same_intent(t, &snapshot)) {
                        tracing::debug!(release = %key, "trigger coalesced: no meaningful change");
                    } else {
                        target = Some(snapshot);
                        attempts = 0;
                        next_attempt = Some(Instant::now());
                    }
                }
            },

            _ = tokio::time::sleep_until(next_attempt.unwrap_or_else(Instant::now)),
                if next_attempt.is_some() =>
            {
                next_attempt = None;
                let Some(release) = target.as_ref() else { continue };

                match applier.apply(&ctx, release).await {
                    Ok(()) => {
                        attempts = 0;
                    }
                    Err(err) => {
                        attempts += 1;
                        if attempts >= config.max_attempts {
                            tracing::warn!(
                                release = %key,
                                error = %err,
                                attempts,
                                "reconciliation dropped after repeated failures"
                            );
                        } else {
                            let backoff = config.base_backoff * 2u32.pow(attempts - 1);
                            tracing::debug!(
                                release = %key,
                                error = %err,
                                attempt = attempts,
                                backoff_ms = backoff.as_millis() as u64,
                                "reconciliation failed, scheduling retry"
                            );
                            next_attempt = Some(Instant::now() + backoff);
                        }
                    }
                }
            }
        }
    }

    tracing::debug!(release = %key, "release worker exited");
}

/// Keyed supervisor of release workers
///
/// The worker map is the only shared state and is locked for create, stop,
/// and lookup only; applies never run under the lock.
pub struct DispatcherManager {
    applier: Arc<dyn Applier>,
    config: DispatcherConfig,
    workers: Mutex<HashMap<ReleaseKey, ReleaseWorker>>,
}

impl DispatcherManager {
    /// Create a manager with default worker tuning
    pub fn new(applier: Arc<dyn Applier>) -> Self {
        Self::with_config(applier, DispatcherConfig::default())
    }

    /// Create a manager with explicit worker tuning
    pub fn with_config(applier: Arc<dyn Applier>, config: DispatcherConfig) -> Self {
        Self {
            applier,
            config,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Route a release snapshot to its worker, creating the worker if absent
    pub async fn trigger(&self, release: Release) -> Result<()> {
        let key = ReleaseKey::of(&release);

        let (tx, closed) = {
            let mut workers = self.workers.lock().unwrap();
            let worker = workers.entry(key.clone()).or_insert_with(|| {
                ReleaseWorker::spawn(key.clone(), self.applier.clone(), self.config.clone())
            });
            (worker.tx.clone(), worker.closed.clone())
        };

        if closed.load(Ordering::SeqCst) {
            return Err(KubeError::HandlerClosed {
                name: key.name.clone(),
                namespace: key.namespace.clone(),
            });
        }

        tx.send(release).await.map_err(|_| KubeError::HandlerClosed {
            name: key.name,
            namespace: key.namespace,
        })
    }

    /// Stop and remove the worker for a key
    ///
    /// Calling this for an unknown key indicates a coordination bug upstream
    /// and is reported as an error.
    pub fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        let key = ReleaseKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
        };

        let removed = self.workers.lock().unwrap().remove(&key);
        match removed {
            Some(worker) => {
                worker.stop();
                Ok(())
            }
            None => {
                tracing::error!(release = %key, "delete requested for unknown release worker");
                Err(KubeError::Coordination(format!(
                    "no worker registered for release '{}'",
                    key
                )))
            }
        }
    }

    /// Stop every worker
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock().unwrap();
        for worker in workers.values() {
            worker.stop();
        }
        workers.clear();
    }

    /// Number of live workers
    pub fn worker_count(&self) -> usize {
        self.workers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use stevedore_core::{ReleaseSpec, ReleaseStatus, Values};

    fn release(name: &str, config_json: &str) -> Release {
        Release {
            name: name.to_string(),
            namespace: "demo".to_string(),
            uid: format!("uid-{}", name),
            spec: ReleaseSpec {
                template: b"tpl".to_vec(),
                config: Values::from_json(config_json).unwrap(),
                rollback_to: None,
                suspend: false,
            },
            status: ReleaseStatus::default(),
        }
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            mailbox_capacity: 8,
            max_attempts: 3,
            base_backoff: Duration::from_millis(5),
        }
    }

    /// Counts applies; optionally fails every attempt and tracks concurrency
    struct CountingApplier {
        calls: AtomicUsize,
        fail: bool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl CountingApplier {
        fn new() -> Arc<Self> {
            Self::build(false, Duration::ZERO)
        }

        fn failing() -> Arc<Self> {
            Self::build(true, Duration::ZERO)
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Self::build(false, delay)
        }

        fn build(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn max_concurrency(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Applier for CountingApplier {
        async fn apply(&self, _ctx: &ExecContext, _release: &Release) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                Err(KubeError::Render("always fails".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(80)).await;
    }

    #[tokio::test]
    async fn test_identical_triggers_are_coalesced() {
        let applier = CountingApplier::new();
        let manager = DispatcherManager::with_config(applier.clone(), fast_config());

        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        settle().await;

        assert_eq!(applier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_changed_spec_schedules_again() {
        let applier = CountingApplier::new();
        let manager = DispatcherManager::with_config(applier.clone(), fast_config());

        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        settle().await;
        manager.trigger(release("web", r#"{"a": 2}"#)).await.unwrap();
        settle().await;

        assert_eq!(applier.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_apply_is_retried_three_times_total() {
        let applier = CountingApplier::failing();
        let manager = DispatcherManager::with_config(applier.clone(), fast_config());

        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        settle().await;

        // First attempt plus exactly two retries, then dropped
        assert_eq!(applier.call_count(), 3);
    }

    #[tokio::test]
    async fn test_new_trigger_after_drop_reschedules() {
        let applier = CountingApplier::failing();
        let manager = DispatcherManager::with_config(applier.clone(), fast_config());

        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        settle().await;
        assert_eq!(applier.call_count(), 3);

        manager.trigger(release("web", r#"{"a": 2}"#)).await.unwrap();
        settle().await;
        assert_eq!(applier.call_count(), 6);
    }

    #[tokio::test]
    async fn test_applies_serialized_per_key_parallel_across_keys() {
        let applier = CountingApplier::slow(Duration::from_millis(30));
        let manager = DispatcherManager::with_config(applier.clone(), fast_config());

        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        manager.trigger(release("api", r#"{"a": 1}"#)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Two keys applied concurrently
        assert_eq!(applier.max_concurrency(), 2);
        assert_eq!(manager.worker_count(), 2);

        // Distinct specs on one key never overlap; the second trigger lands
        // while the first apply is still in flight
        let serial = CountingApplier::slow(Duration::from_millis(30));
        let manager = DispatcherManager::with_config(serial.clone(), fast_config());
        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.trigger(release("web", r#"{"a": 2}"#)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(serial.max_concurrency(), 1);
        assert_eq!(serial.call_count(), 2);
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_fails() {
        let applier = CountingApplier::new();
        let worker = ReleaseWorker::spawn(
            ReleaseKey {
                namespace: "demo".to_string(),
                name: "web".to_string(),
            },
            applier,
            fast_config(),
        );

        worker.stop();
        let err = worker.enqueue(release("web", r#"{"a": 1}"#)).await.unwrap_err();
        assert!(matches!(err, KubeError::HandlerClosed { .. }));

        settle().await;
        assert!(worker.is_finished());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let applier = CountingApplier::new();
        let worker = ReleaseWorker::spawn(
            ReleaseKey {
                namespace: "demo".to_string(),
                name: "web".to_string(),
            },
            applier,
            fast_config(),
        );

        worker.stop();
        worker.stop();
        settle().await;
        assert!(worker.is_finished());
    }

    #[tokio::test]
    async fn test_delete_unknown_key_is_coordination_error() {
        let manager = DispatcherManager::with_config(CountingApplier::new(), fast_config());
        let err = manager.delete("demo", "ghost").unwrap_err();
        assert!(matches!(err, KubeError::Coordination(_)));
    }

    #[tokio::test]
    async fn test_delete_stops_and_removes_worker() {
        let applier = CountingApplier::new();
        let manager = DispatcherManager::with_config(applier.clone(), fast_config());

        manager.trigger(release("web", r#"{"a": 1}"#)).await.unwrap();
        settle().await;
        assert_eq!(manager.worker_count(), 1);

        manager.delete("demo", "web").unwrap();
        assert_eq!(manager.worker_count(), 0);

        // A later trigger creates a fresh worker
        manager.trigger(release("web", r#"{"a": 2}"#)).await.unwrap();
        settle().await;
        assert_eq!(manager.worker_count(), 1);
        assert_eq!(applier.call_count(), 2);
    }
}
