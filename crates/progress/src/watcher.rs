//! Live access-status updates.
//!
//! An [`AccessWatcher`] keeps the access snapshot of one learner on one path
//! current. It follows the store's change subscription when the backend can
//! push, coalescing bursts within the debounce window, and polls otherwise.
//! Dropping the watcher stops the background task.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};
use trainpath_core::{LearnerId, ModuleId, PathId};
use trainpath_storage::{ProgressChange, ProgressSubscription};

use crate::access::{AccessSnapshot, PathAccessEngine};
use crate::config::ProgressConfig;

/// Keeps an [`AccessSnapshot`] up to date in the background.
pub struct AccessWatcher {
    rx: watch::Receiver<AccessSnapshot>,
    handle: JoinHandle<()>,
}

impl AccessWatcher {
    /// Compute the initial snapshot and start watching.
    pub async fn spawn(
        engine: PathAccessEngine,
        learner_id: LearnerId,
        path_id: PathId,
        config: &ProgressConfig,
    ) -> Self {
        // Subscribe before the first computation so no write slips between.
        let subscription = engine.progress_store().subscribe(&learner_id);
        let initial = engine.snapshot(&learner_id, path_id, None).await;
        let (tx, rx) = watch::channel(initial);

        let task = WatchTask {
            engine,
            learner_id,
            path_id,
            tx,
            debounce: config.debounce(),
        };
        let handle = match subscription {
            Some(subscription) => tokio::spawn(task.follow(subscription)),
            None => {
                info!("Progress store cannot push changes, polling every {:?}", config.poll_interval());
                tokio::spawn(task.poll(config.poll_interval()))
            }
        };

        Self { rx, handle }
    }

    /// The latest snapshot.
    pub fn current(&self) -> AccessSnapshot {
        self.rx.borrow().clone()
    }

    /// Lock state of `module_id` in the latest snapshot.
    pub fn is_module_locked(&self, module_id: ModuleId) -> bool {
        self.rx.borrow().is_module_locked(module_id)
    }

    /// Wait until a different snapshot is published.
    ///
    /// Returns `None` once the watcher has stopped.
    pub async fn changed(&mut self) -> Option<AccessSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// A receiver for callers that want to await changes themselves.
    pub fn receiver(&self) -> watch::Receiver<AccessSnapshot> {
        self.rx.clone()
    }
}

impl Drop for AccessWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct WatchTask {
    engine: PathAccessEngine,
    learner_id: LearnerId,
    path_id: PathId,
    tx: watch::Sender<AccessSnapshot>,
    debounce: Duration,
}

impl WatchTask {
    async fn follow(self, mut subscription: ProgressSubscription) {
        while let Some(change) = subscription.next().await {
            if let ProgressChange::Updated(record) = &change {
                if !self.tx.borrow().concerns(record.module_id) {
                    continue;
                }
            }

            // Coalesce everything that arrives within the debounce window.
            let deadline = Instant::now() + self.debounce;
            let mut closed = false;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    next = subscription.next() => {
                        if next.is_none() {
                            closed = true;
                            break;
                        }
                    }
                }
            }

            self.recompute().await;
            if closed {
                break;
            }
        }
        debug!(learner = %self.learner_id, path = %self.path_id, "progress subscription closed");
    }

    async fn poll(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick fires immediately; the initial snapshot is already
        // published.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.recompute().await;
        }
    }

    async fn recompute(&self) {
        let previous = self.tx.borrow().clone();
        let next = self.engine.snapshot(&self.learner_id, self.path_id, Some(&previous)).await;
        let published = self.tx.send_if_modified(|current| {
            if current.statuses == next.statuses && current.error == next.error {
                false
            } else {
                *current = next;
                true
            }
        });
        if published {
            debug!(learner = %self.learner_id, path = %self.path_id, "access snapshot updated");
        }
    }
}
