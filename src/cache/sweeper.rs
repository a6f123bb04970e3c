//! Background expiry sweep for [`CacheStore`].
//!
//! Runs on the tokio runtime, deleting expired entries every interval so they
//! do not linger until the next `get`. Stop it through the returned
//! [`SweepHandle`]; stopping is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::CacheStore;

/// Spawns the periodic sweep task.
pub struct ExpirySweeper;

impl ExpirySweeper {
    /// Start sweeping `store` every `interval`. The first sweep happens one
    /// interval after spawning. Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<CacheStore>, interval: Duration) -> SweepHandle {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.purge_expired();
                        if removed > 0 {
                            debug!(target: "devpath::sweeper", removed, "expired entries swept");
                        }
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(target: "devpath::sweeper", "sweeper stopped");
        });
        SweepHandle { shutdown: tx, stopped: AtomicBool::new(false), task: Some(task) }
    }

    /// Start sweeping at the store's configured interval.
    pub fn spawn_default(store: Arc<CacheStore>) -> SweepHandle {
        let interval = store.config().sweep_interval();
        Self::spawn(store, interval)
    }
}

/// Cancellation handle for a running sweep.
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    stopped: AtomicBool,
    task: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Ask the sweep to stop. Safe to call any number of times.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            // The task may already be gone; nothing to do then.
            let _ = self.shutdown.send(true);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// `true` once the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
