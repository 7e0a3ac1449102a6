//! Recovery loop - periodic replay of one Kind's retry queue.
//!
//! Every tick drains at most one batch and hands it to the Kind's callback once.
//! A replay that fails again is logged and dropped; nothing is re-queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::{Kind, Outcome};
use crate::ports::{Callback, Item};
use crate::queue::RetryQueue;

/// Handle to a running recovery task.
/// - dropping it (and with it `shutdown_tx`) stops the task at its next wakeup
/// - `shutdown()` stops the task and waits for it
pub struct RecoveryHandle {
    kind: Kind,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl RecoveryHandle {
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Ask the task to stop. A replay already in flight runs to completion.
    pub fn stop(&self) {
        // ignore send error: the task may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown(self) {
        self.stop();
        let _ = self.join.await;
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Queue empty, or emptied by another executor between count and pop.
    Idle,
    /// One batch was handed to the callback.
    Replayed { items: usize, outcome: Outcome },
    /// The store (or a stored batch) failed; logged, nothing replayed.
    Failed,
}

pub(crate) struct Recovery<T: Item> {
    pub(crate) kind: Kind,
    pub(crate) interval: Duration,
    pub(crate) queue: RetryQueue<T>,
    pub(crate) callback: Arc<dyn Callback<T>>,
    pub(crate) active: Arc<AtomicBool>,
}

impl<T: Item> Recovery<T> {
    pub(crate) fn spawn(self) -> RecoveryHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let kind = self.kind.clone();
        let join = tokio::spawn(self.run(shutdown_rx));
        RecoveryHandle {
            kind,
            shutdown_tx,
            join,
        }
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        // First tick one interval after start, not immediately.
        let Some(start) = Instant::now().checked_add(self.interval) else {
            error!(kind = %self.kind, interval = ?self.interval, "recovery interval out of clock range, worker not started");
            return;
        };
        self.active.store(true, Ordering::SeqCst);
        info!(kind = %self.kind, interval = ?self.interval, queue = %self.queue.key(), "recovery worker started");

        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    // Err: the handle was dropped.
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            // Outside the select: a started replay is never cut short by shutdown.
            self.tick().await;
        }

        info!(kind = %self.kind, "recovery worker stopped");
    }

    pub(crate) async fn tick(&self) -> Tick {
        let when = Utc::now();
        let queued = match self.queue.count().await {
            Ok(n) => n,
            Err(e) => {
                error!(kind = %self.kind, when = %when, error = %e, "unable to count queued batches");
                return Tick::Failed;
            }
        };
        if queued == 0 {
            return Tick::Idle;
        }

        let batch = match self.queue.drain().await {
            Ok(Some(batch)) => batch,
            Ok(None) => return Tick::Idle,
            Err(e) => {
                error!(kind = %self.kind, when = %when, error = %e, "unable to drain retry queue");
                return Tick::Failed;
            }
        };

        let items = batch.len();
        debug!(kind = %self.kind, items, queued, "replaying batch");
        let outcome = self.callback.call(batch).await;
        if outcome.is_success() {
            info!(kind = %self.kind, when = %when, items, "batch replayed");
        } else {
            warn!(
                kind = %self.kind,
                when = %when,
                items,
                reason = outcome.reason.as_deref().unwrap_or(""),
                "batch replay failed, dropping it"
            );
        }
        Tick::Replayed { items, outcome }
    }
}
