//! Generic operator runtime: informer/handler registries, a deduplicating
//! work queue, and the worker pool that drains it.
//!
//! Composing code registers its notification sources, starters, and kind
//! handlers before calling [`Operator::run`]. Registries are write-once at
//! startup and read-only afterwards; the queue and in-flight set are the
//! only mutable shared state.

mod event;
mod item;
mod queue;

pub use event::{Identified, NotificationSource, ResourceEvents, Starter};
pub use item::{GroupVersionKind, Item, Operation, ResourceIdentity};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::metrics;
use queue::WorkQueue;

/// Per-resource-kind reconciliation logic invoked for each dequeued item.
#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Kinds this handler owns. Each kind may be owned by exactly one
    /// handler per operator.
    fn kinds(&self) -> Vec<GroupVersionKind>;

    /// Reconcile one item. A retryable error re-enqueues the item with
    /// backoff; any other error drops it.
    async fn handle(&self, item: &Item) -> Result<()>;
}

/// Delay policy applied before redispatching an item whose reconciliation
/// failed with a retryable error.
#[derive(Clone, Debug)]
pub enum BackoffPolicy {
    Fixed(Duration),
    Exponential { base: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Delay before the given 1-based attempt number.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffPolicy::Fixed(delay) => *delay,
            BackoffPolicy::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                base.saturating_mul(1u32 << shift).min(*max)
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(5 * 60),
        }
    }
}

/// Operator tuning knobs.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    /// Number of concurrent worker loops draining the queue.
    pub workers: usize,
    pub backoff: BackoffPolicy,
    /// How long `run` waits for in-flight reconciliations after the stop
    /// signal before giving up on them.
    pub shutdown_grace: Duration,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            backoff: BackoffPolicy::default(),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct Registry {
    informers: HashMap<GroupVersionKind, Arc<dyn NotificationSource>>,
    starters: Vec<Arc<dyn Starter>>,
    handlers: HashMap<GroupVersionKind, Arc<dyn Handler>>,
}

/// Central registry and dispatch loop.
pub struct Operator {
    name: String,
    config: OperatorConfig,
    queue: Arc<WorkQueue>,
    registry: Mutex<Registry>,
    started: AtomicBool,
}

impl Operator {
    pub fn new(name: impl Into<String>, config: OperatorConfig) -> Self {
        Self {
            name: name.into(),
            config,
            queue: Arc::new(WorkQueue::new()),
            registry: Mutex::new(Registry::default()),
            started: AtomicBool::new(false),
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().expect("operator registry mutex poisoned")
    }

    fn ensure_not_started(&self) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::registration(format!(
                "operator {} already started",
                self.name
            )));
        }
        Ok(())
    }

    /// Bind a notification source to a resource kind. Each kind may be
    /// bound at most once, and only before the operator starts.
    pub fn register_informer(
        &self,
        source: Arc<dyn NotificationSource>,
        gvk: GroupVersionKind,
    ) -> Result<()> {
        self.ensure_not_started()?;
        let mut registry = self.registry();
        if registry.informers.contains_key(&gvk) {
            return Err(Error::registration(format!(
                "informer for {gvk} already registered"
            )));
        }
        source.bind(ResourceEvents::new(self.queue.clone(), gvk.clone()))?;
        registry.informers.insert(gvk, source);
        Ok(())
    }

    /// Register an object to be started when the operator runs. A start
    /// failure aborts startup.
    pub fn register_starter(&self, starter: Arc<dyn Starter>) -> Result<()> {
        self.ensure_not_started()?;
        self.registry().starters.push(starter);
        Ok(())
    }

    /// Bind a kind handler for every kind it declares. A second handler for
    /// an already-owned kind is rejected.
    pub fn register_handler(&self, handler: Arc<dyn Handler>) -> Result<()> {
        self.ensure_not_started()?;
        let mut registry = self.registry();
        let kinds = handler.kinds();
        for gvk in &kinds {
            if registry.handlers.contains_key(gvk) {
                return Err(Error::registration(format!(
                    "handler for {gvk} already registered"
                )));
            }
        }
        for gvk in kinds {
            registry.handlers.insert(gvk, handler.clone());
        }
        Ok(())
    }

    /// Thread-safe, non-blocking enqueue entry point used by notification
    /// sources (and tests).
    pub fn enqueue_item(&self, item: Item) {
        self.queue.add(item);
    }

    /// Start all registered starters, then drain the queue with a pool of
    /// workers until the stop token fires. In-flight reconciliations are
    /// given a bounded grace period to finish.
    pub async fn run(&self, stop: CancellationToken) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::registration(format!(
                "operator {} already started",
                self.name
            )));
        }

        let (starters, handlers) = {
            let mut registry = self.registry();
            let starters = std::mem::take(&mut registry.starters);
            (starters, Arc::new(registry.handlers.clone()))
        };

        for starter in &starters {
            starter.start(stop.child_token()).await?;
        }

        info!(operator = %self.name, workers = self.config.workers, "operator started");

        let mut workers = JoinSet::new();
        for _ in 0..self.config.workers {
            let queue = self.queue.clone();
            let handlers = handlers.clone();
            let backoff = self.config.backoff.clone();
            let stop = stop.clone();
            workers.spawn(async move {
                worker_loop(queue, handlers, backoff, stop).await;
            });
        }

        stop.cancelled().await;
        info!(operator = %self.name, "stop signal observed, draining workers");
        self.queue.shut_down();

        if tokio::time::timeout(self.config.shutdown_grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_err()
        {
            warn!(operator = %self.name, "shutdown grace period elapsed with workers still busy");
            workers.shutdown().await;
        }

        info!(operator = %self.name, "operator stopped");
        Ok(())
    }
}

async fn worker_loop(
    queue: Arc<WorkQueue>,
    handlers: Arc<HashMap<GroupVersionKind, Arc<dyn Handler>>>,
    backoff: BackoffPolicy,
    stop: CancellationToken,
) {
    while let Some(item) = queue.next(&stop).await {
        let gvk = item.identity().gvk.clone();
        let Some(handler) = handlers.get(&gvk) else {
            // Setup defect: a source is registered for a kind no handler owns.
            error!(%item, "no handler registered for kind, dropping item");
            queue.done(item.identity());
            continue;
        };

        metrics::RECONCILIATIONS
            .with_label_values(&[&gvk.kind])
            .inc();
        let timer = metrics::RECONCILE_DURATION
            .with_label_values(&[&gvk.kind])
            .start_timer();
        let result = handler.handle(&item).await;
        timer.observe_duration();

        match result {
            Ok(()) => {
                debug!(%item, handler = handler.name(), "reconciled");
                queue.done(item.identity());
            }
            Err(err) if err.retryable() => {
                metrics::RECONCILIATION_ERRORS
                    .with_label_values(&[&gvk.kind])
                    .inc();
                let attempt = queue.record_failure(item.identity());
                let delay = backoff.delay(attempt);
                warn!(%item, error = %err, attempt, ?delay, "reconciliation failed, scheduling retry");
                metrics::REQUEUES.with_label_values(&[&gvk.kind]).inc();

                // The identity stays owned by this timer until redispatch,
                // preserving the single-in-flight invariant.
                let queue = queue.clone();
                let stop = stop.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = stop.cancelled() => queue.abandon(item.identity()),
                        _ = tokio::time::sleep(delay) => queue.release_retry(item),
                    }
                });
            }
            Err(err) => {
                metrics::RECONCILIATION_ERRORS
                    .with_label_values(&[&gvk.kind])
                    .inc();
                error!(%item, error = %err, "reconciliation failed permanently, dropping item");
                queue.done(item.identity());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(30), Duration::from_secs(8));
    }

    #[test]
    fn fixed_backoff_ignores_attempts() {
        let policy = BackoffPolicy::Fixed(Duration::from_secs(5));
        assert_eq!(policy.delay(1), Duration::from_secs(5));
        assert_eq!(policy.delay(10), Duration::from_secs(5));
    }
}
