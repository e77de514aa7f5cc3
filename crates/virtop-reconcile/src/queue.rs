//! Work queue and reconcile worker.
//!
//! The engines perform no internal concurrency; fan-out across distinct
//! resource identities happens here. The queue deduplicates keys and hands
//! each key to at most one in-flight pass at a time: a key enqueued while
//! its pass is running is marked dirty and re-queued when the pass finishes.
//!
//! Delay is always expressed as a returned requeue hint, never an internal
//! blocking wait inside an engine; the worker turns hints into timed
//! re-enqueues. Shutdown is cooperative through a [`CancellationToken`]
//! threaded into every pass.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use virtop_core::{ResourceKey, Result};

/// Callback the worker drives for each dequeued key.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Run one pass; an `Ok(Some(delay))` asks for a timed re-enqueue.
    async fn reconcile(
        &self,
        cancel: &CancellationToken,
        key: &ResourceKey,
    ) -> Result<Option<Duration>>;
}

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<ResourceKey>,
    queued: HashSet<ResourceKey>,
    processing: HashSet<ResourceKey>,
    dirty: HashSet<ResourceKey>,
}

fn lock(mutex: &Mutex<QueueInner>) -> MutexGuard<'_, QueueInner> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Deduplicating queue of resource keys.
#[derive(Default)]
pub struct WorkQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key for reconciliation.
    ///
    /// A key already pending is dropped; a key currently being processed is
    /// re-queued once its in-flight pass completes.
    pub fn enqueue(&self, key: ResourceKey) {
        let mut inner = lock(&self.inner);
        if inner.processing.contains(&key) {
            inner.dirty.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.pending.push_back(key);
            self.notify.notify_one();
        }
    }

    /// Take the next key, marking it in-flight.
    pub fn try_next(&self) -> Option<ResourceKey> {
        let mut inner = lock(&self.inner);
        let key = inner.pending.pop_front()?;
        inner.queued.remove(&key);
        inner.processing.insert(key.clone());
        Some(key)
    }

    /// Mark a key's pass finished, re-queueing it if it went dirty while
    /// in flight.
    pub fn done(&self, key: &ResourceKey) {
        let mut inner = lock(&self.inner);
        inner.processing.remove(key);
        if inner.dirty.remove(key) && inner.queued.insert(key.clone()) {
            inner.pending.push_back(key.clone());
            self.notify.notify_one();
        }
    }

    /// Number of keys waiting (excludes in-flight keys).
    pub fn len(&self) -> usize {
        lock(&self.inner).pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until a key was enqueued.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent reconcile passes.
    pub concurrency: usize,
    /// How often to poll the queue (in milliseconds).
    pub poll_interval_ms: u64,
    /// Delay before re-queueing a key whose pass failed retryably.
    pub retry_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval_ms: 250,
            retry_delay_ms: 1000,
        }
    }
}

/// Concurrency-bounded worker draining a [`WorkQueue`] into a [`Reconciler`].
pub struct Worker<R> {
    queue: Arc<WorkQueue>,
    reconciler: Arc<R>,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl<R: Reconciler + 'static> Worker<R> {
    /// Create a new worker.
    pub fn new(queue: Arc<WorkQueue>, reconciler: Arc<R>, config: WorkerConfig) -> Self {
        Self {
            queue,
            reconciler,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelling this worker and every pass it runs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cooperative shutdown.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run until shutdown, draining the queue as keys arrive.
    #[instrument(skip(self))]
    pub async fn run(&self) {
        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval_ms,
            "Starting reconcile worker"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut poll =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("Reconcile worker shutting down");
                    return;
                }
                _ = self.queue.notified() => {}
                _ = poll.tick() => {}
            }

            while let Some(key) = self.queue.try_next() {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let queue = self.queue.clone();
                let reconciler = self.reconciler.clone();
                let cancel = self.cancel.clone();
                let retry_delay = Duration::from_millis(self.config.retry_delay_ms);

                tokio::spawn(async move {
                    let _permit = permit;
                    let result = reconciler.reconcile(&cancel, &key).await;
                    queue.done(&key);
                    match result {
                        Ok(None) => {}
                        Ok(Some(delay)) => {
                            debug!(key = %key, delay_ms = delay.as_millis() as u64, "Requeue hint");
                            enqueue_after(queue, key, delay, cancel);
                        }
                        Err(err) if err.is_retryable() => {
                            warn!(key = %key, error = %err, "Reconcile failed, will retry");
                            enqueue_after(queue, key, retry_delay, cancel);
                        }
                        Err(err) => {
                            error!(key = %key, error = %err, "Reconcile failed terminally");
                        }
                    }
                });
            }
        }
    }
}

/// Re-enqueue a key after a delay, aborting on shutdown.
fn enqueue_after(
    queue: Arc<WorkQueue>,
    key: ResourceKey,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => queue.enqueue(key),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use virtop_core::CoreError;

    struct CountingReconciler {
        count: AtomicUsize,
        hint_on_first: Option<Duration>,
        fail_on_first: bool,
    }

    impl CountingReconciler {
        fn new() -> Self {
            Self {
                count: AtomicUsize::new(0),
                hint_on_first: None,
                fail_on_first: false,
            }
        }
    }

    #[async_trait]
    impl Reconciler for CountingReconciler {
        async fn reconcile(
            &self,
            _cancel: &CancellationToken,
            _key: &ResourceKey,
        ) -> Result<Option<Duration>> {
            let seen = self.count.fetch_add(1, Ordering::SeqCst);
            if seen == 0 {
                if self.fail_on_first {
                    return Err(CoreError::provider_unavailable("first pass fails"));
                }
                return Ok(self.hint_on_first);
            }
            Ok(None)
        }
    }

    async fn wait_for_count(reconciler: &CountingReconciler, want: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while reconciler.count.load(Ordering::SeqCst) < want {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reconciler never reached expected pass count");
    }

    #[test]
    fn test_enqueue_deduplicates_pending_keys() {
        let queue = WorkQueue::new();
        let key = ResourceKey::new("default", "vm-1");
        queue.enqueue(key.clone());
        queue.enqueue(key.clone());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_next(), Some(key));
        assert_eq!(queue.try_next(), None);
    }

    #[test]
    fn test_key_enqueued_while_in_flight_goes_dirty() {
        let queue = WorkQueue::new();
        let key = ResourceKey::new("default", "vm-1");
        queue.enqueue(key.clone());

        let in_flight = queue.try_next().expect("key should be pending");
        // a second enqueue during processing must not hand the key out twice
        queue.enqueue(key.clone());
        assert_eq!(queue.try_next(), None);

        queue.done(&in_flight);
        assert_eq!(queue.try_next(), Some(key));
    }

    #[tokio::test]
    async fn test_worker_drives_reconciler() {
        let queue = Arc::new(WorkQueue::new());
        let reconciler = Arc::new(CountingReconciler::new());
        let worker = Arc::new(Worker::new(
            queue.clone(),
            reconciler.clone(),
            WorkerConfig::default(),
        ));

        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        queue.enqueue(ResourceKey::new("default", "vm-1"));
        wait_for_count(&reconciler, 1).await;

        worker.shutdown();
        handle.await.expect("worker task panicked");
    }

    #[tokio::test]
    async fn test_requeue_hint_triggers_second_pass() {
        let queue = Arc::new(WorkQueue::new());
        let reconciler = Arc::new(CountingReconciler {
            count: AtomicUsize::new(0),
            hint_on_first: Some(Duration::from_millis(10)),
            fail_on_first: false,
        });
        let worker = Arc::new(Worker::new(
            queue.clone(),
            reconciler.clone(),
            WorkerConfig::default(),
        ));

        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        queue.enqueue(ResourceKey::new("default", "vm-1"));
        wait_for_count(&reconciler, 2).await;

        worker.shutdown();
        handle.await.expect("worker task panicked");
    }

    #[tokio::test]
    async fn test_retryable_error_requeues() {
        let queue = Arc::new(WorkQueue::new());
        let reconciler = Arc::new(CountingReconciler {
            count: AtomicUsize::new(0),
            hint_on_first: None,
            fail_on_first: true,
        });
        let config = WorkerConfig {
            retry_delay_ms: 10,
            ..Default::default()
        };
        let worker = Arc::new(Worker::new(queue.clone(), reconciler.clone(), config));

        let handle = {
            let worker = worker.clone();
            tokio::spawn(async move { worker.run().await })
        };

        queue.enqueue(ResourceKey::new("default", "vm-1"));
        wait_for_count(&reconciler, 2).await;

        worker.shutdown();
        handle.await.expect("worker task panicked");
    }
}
