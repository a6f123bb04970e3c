//! # Stage: Completion Batch Sender
//!
//! ## Responsibility
//! Deliver completion events to the external record store in small batches,
//! retrying each event with exponential backoff and pausing between batches
//! so a burst of completions does not flood the store.
//!
//! ## Guarantees
//! - Non-blocking: `enqueue` never waits and never fails to the caller
//! - Bounded retries: each event is attempted at most `max_attempts` times
//! - Observable: exhausted events are published on a broadcast channel and
//!   counted; successes are counted
//! - Graceful shutdown: `stop()` is idempotent and queued events are drained
//!   before the worker exits
//!
//! ## NOT Responsible For
//! - Updating scores or ledgers (see [`super::CompletionTracker`])
//! - Durable queuing across restarts

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::ledger::CompletionEvent;
use crate::config::SenderConfig;
use crate::error::SinkError;

// ---------------------------------------------------------------------------
// Seam
// ---------------------------------------------------------------------------

/// The external record store that receives completion events.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    async fn persist_completion(&self, event: &CompletionEvent) -> Result<(), SinkError>;
}

/// An event that could not be delivered after every attempt.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub event: CompletionEvent,
    pub attempts: u32,
    pub error: SinkError,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SenderStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    pending: AtomicUsize,
}

/// Spawns the delivery worker.
pub struct BatchSender;

impl BatchSender {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(config: SenderConfig, sink: Arc<dyn CompletionSink>) -> BatchSenderHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (failures, _) = broadcast::channel(config.failure_channel_capacity.max(1));
        let stats = Arc::new(SenderStats::default());

        let worker = Worker {
            config,
            sink,
            stats: stats.clone(),
            failures: failures.clone(),
        };
        let task = tokio::spawn(worker.run(rx, shutdown_rx));

        BatchSenderHandle {
            inner: Arc::new(HandleInner {
                tx,
                shutdown: shutdown_tx,
                stopped: AtomicBool::new(false),
                stats,
                failures,
                task: Mutex::new(Some(task)),
            }),
        }
    }
}

struct Worker {
    config: SenderConfig,
    sink: Arc<dyn CompletionSink>,
    stats: Arc<SenderStats>,
    failures: broadcast::Sender<DeliveryFailure>,
}

impl Worker {
    async fn run(
        self,
        mut rx: mpsc::UnboundedReceiver<CompletionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let batch_size = self.config.batch_size.max(1);
        loop {
            let first = tokio::select! {
                biased;
                next = rx.recv() => match next {
                    Some(ev) => ev,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let mut batch = vec![first];
            while batch.len() < batch_size {
                match rx.try_recv() {
                    Ok(ev) => batch.push(ev),
                    Err(_) => break,
                }
            }
            self.deliver_batch(batch).await;

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.throttle_interval()) => {}
                _ = shutdown.changed() => {}
            }
        }

        // Drain whatever is still queued, without throttling.
        rx.close();
        let mut rest = Vec::new();
        while let Some(ev) = rx.recv().await {
            rest.push(ev);
        }
        if !rest.is_empty() {
            info!(target: "devpath::sender", remaining = rest.len(), "draining queued completions");
        }
        for chunk in rest.chunks(batch_size) {
            self.deliver_batch(chunk.to_vec()).await;
        }
        debug!(target: "devpath::sender", "sender stopped");
    }

    async fn deliver_batch(&self, batch: Vec<CompletionEvent>) {
        debug!(target: "devpath::sender", size = batch.len(), "delivering batch");
        for event in batch {
            self.deliver(event).await;
            self.stats.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    async fn deliver(&self, event: CompletionEvent) {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.sink.persist_completion(&event).await {
                Ok(()) => {
                    self.stats.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        target: "devpath::sender",
                        task_id = %event.task_id,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "completion delivery failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        target: "devpath::sender",
                        task_id = %event.task_id,
                        customer = %event.customer_id,
                        attempts = attempt,
                        error = %e,
                        "completion delivery abandoned"
                    );
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                    // No subscribers is fine; the counter still records it.
                    let _ = self.failures.send(DeliveryFailure {
                        event,
                        attempts: attempt,
                        error: e,
                    });
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

struct HandleInner {
    tx: mpsc::UnboundedSender<CompletionEvent>,
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
    stats: Arc<SenderStats>,
    failures: broadcast::Sender<DeliveryFailure>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to a running [`BatchSender`].
#[derive(Clone)]
pub struct BatchSenderHandle {
    inner: Arc<HandleInner>,
}

impl BatchSenderHandle {
    /// Queue an event for delivery. After `stop()` the event is logged and dropped.
    pub fn enqueue(&self, event: CompletionEvent) {
        if self.is_stopped() {
            warn!(
                target: "devpath::sender",
                task_id = %event.task_id,
                "sender stopped; dropping completion"
            );
            return;
        }
        self.inner.stats.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.inner.tx.send(event) {
            self.inner.stats.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(
                target: "devpath::sender",
                task_id = %e.0.task_id,
                "sender worker gone; dropping completion"
            );
        }
    }

    pub fn delivered(&self) -> u64 {
        self.inner.stats.delivered.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.inner.stats.failed.load(Ordering::Relaxed)
    }

    /// Events queued or in flight.
    pub fn pending(&self) -> usize {
        self.inner.stats.pending.load(Ordering::SeqCst)
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<DeliveryFailure> {
        self.inner.failures.subscribe()
    }

    /// Ask the worker to drain and exit. Safe to call any number of times.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            let _ = self.inner.shutdown.send(true);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stop and wait until every queued event has been handled.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(target: "devpath::sender", error = %e, "sender worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for BatchSenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSenderHandle")
            .field("stopped", &self.is_stopped())
            .field("pending", &self.pending())
            .field("delivered", &self.delivered())
            .field("failed", &self.failed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Priority;
    use crate::clock::ManualClock;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    /// Fails the first `fail_first` calls, then records events.
    struct FlakySink {
        fail_first: AtomicUsize,
        seen: AsyncMutex<Vec<String>>,
    }

    impl FlakySink {
        fn new(fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                fail_first: AtomicUsize::new(fail_first),
                seen: AsyncMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionSink for FlakySink {
        async fn persist_completion(&self, event: &CompletionEvent) -> Result<(), SinkError> {
            let left = self.fail_first.load(Ordering::SeqCst);
            if left > 0 {
                self.fail_first.store(left - 1, Ordering::SeqCst);
                return Err(SinkError::Unreachable("down".into()));
            }
            self.seen.lock().await.push(event.task_id.clone());
            Ok(())
        }
    }

    fn fast() -> SenderConfig {
        SenderConfig {
            batch_size: 2,
            max_attempts: 3,
            backoff_base_ms: 1,
            throttle_interval_ms: 5,
            failure_channel_capacity: 8,
        }
    }

    fn event(task: &str) -> CompletionEvent {
        CompletionEvent::new(
            &ManualClock::new(0),
            task,
            "c1",
            "customer-analysis",
            Priority::Medium,
        )
    }

    #[tokio::test]
    async fn test_delivers_in_order_and_drains_on_shutdown() {
        let sink = FlakySink::new(0);
        let handle = BatchSender::spawn(fast(), sink.clone());
        for i in 0..5 {
            handle.enqueue(event(&format!("t{i}")));
        }
        handle.shutdown().await;
        assert_eq!(handle.delivered(), 5);
        assert_eq!(handle.pending(), 0);
        assert_eq!(*sink.seen.lock().await, vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let sink = FlakySink::new(2);
        let handle = BatchSender::spawn(fast(), sink.clone());
        handle.enqueue(event("t"));
        handle.shutdown().await;
        assert_eq!(handle.delivered(), 1);
        assert_eq!(handle.failed(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_event_is_published() {
        let sink = FlakySink::new(100);
        let handle = BatchSender::spawn(fast(), sink);
        let mut failures = handle.subscribe_failures();
        handle.enqueue(event("doomed"));

        let failure = tokio::time::timeout(Duration::from_secs(2), failures.recv())
            .await
            .expect("failure published")
            .unwrap();
        assert_eq!(failure.event.task_id, "doomed");
        assert_eq!(failure.attempts, 3);
        handle.shutdown().await;
        assert_eq!(handle.failed(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_is_dropped() {
        let sink = FlakySink::new(0);
        let handle = BatchSender::spawn(fast(), sink.clone());
        handle.stop();
        handle.stop();
        handle.enqueue(event("late"));
        handle.shutdown().await;
        assert_eq!(handle.delivered(), 0);
        assert!(sink.seen.lock().await.is_empty());
    }
}
