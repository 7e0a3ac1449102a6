//! Executor - per-Kind callback dispatch with deferred retry.
//!
//! # Flow
//! 1. `register(kind, interval, callback)` stores the callback and starts the
//!    Kind's recovery task
//! 2. `exec(kind, items)` calls the callback once per item, in order
//! 3. items whose call failed are pushed to the Kind's retry queue as one batch
//! 4. every `interval` the recovery task replays one queued batch, once
//!
//! The executor owns no items after `exec` returns; the retry queue lives in the
//! store, so any executor sharing the store and prefix can recover it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::recovery::{Recovery, RecoveryHandle};
use super::registry::{Registration, Registry};
use crate::config::{DEFAULT_QUEUE_PREFIX, ExecutorType, Properties};
use crate::domain::{Kind, KindState, TetherError, TetherResult};
use crate::impls;
use crate::lock::DistributedLock;
use crate::ports::{Callback, Item, KeyValueStore};
use crate::queue::RetryQueue;

/// Result of one `exec` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecReport {
    pub kind: Kind,
    /// Items handed to the callback.
    pub attempted: usize,
    /// Items whose call failed and were queued for recovery.
    pub failed: usize,
}

impl ExecReport {
    pub fn queued(&self) -> bool {
        self.failed > 0
    }
}

pub struct Executor<T: Item> {
    store: Arc<dyn KeyValueStore>,
    queue_prefix: String,
    registry: Arc<Registry<T>>,
}

impl<T: Item> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            queue_prefix: self.queue_prefix.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Item> Executor<T> {
    /// Executor over `store` with the default queue prefix.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_prefix(store, DEFAULT_QUEUE_PREFIX)
    }

    pub fn with_prefix(store: Arc<dyn KeyValueStore>, queue_prefix: impl Into<String>) -> Self {
        Self {
            store,
            queue_prefix: queue_prefix.into(),
            registry: Arc::new(Registry::new()),
        }
    }

    /// Validate `props`, connect its store and build an executor on it.
    pub async fn from_properties(props: &Properties) -> TetherResult<Self> {
        props.validate()?;
        match props.executor_type {
            ExecutorType::Cache => {
                let store = impls::connect(&props.cache).await?;
                Ok(Self::with_prefix(store, props.queue_prefix.clone()))
            }
        }
    }

    /// Bind `callback` to `kind` and start its recovery task.
    ///
    /// The first recovery tick happens one `interval` from now. The returned
    /// handle owns the task: dropping it stops recovery for this Kind, while
    /// `exec` keeps working.
    pub async fn register<C>(
        &self,
        kind: impl Into<Kind>,
        interval: Duration,
        callback: C,
    ) -> TetherResult<RecoveryHandle>
    where
        C: Callback<T> + 'static,
    {
        let kind = kind.into();
        // Two periods must fit on the clock: the ticker schedules one ahead.
        let schedulable = Instant::now().checked_add(interval.saturating_mul(2)).is_some();
        if interval.is_zero() || !schedulable {
            return Err(TetherError::InvalidDuration("recovery interval"));
        }

        let callback: Arc<dyn Callback<T>> = Arc::new(callback);
        let registration = Registration::new(Arc::clone(&callback), interval);
        let active = Arc::clone(&registration.active);
        self.registry
            .insert(kind.clone(), registration)
            .await
            .inspect_err(|e| warn!(kind = %kind, error = %e, "registration rejected"))?;
        info!(kind = %kind, interval = ?interval, "kind registered");

        let recovery = Recovery {
            queue: self.queue(&kind),
            kind,
            interval,
            callback,
            active,
        };
        Ok(recovery.spawn())
    }

    /// Run `kind`'s callback over `items`, one item per call, in order.
    ///
    /// Failed items are queued together as one batch. A callback failure is not
    /// an error; `Err` means the Kind is unknown or the batch could not be
    /// queued (those items are then lost).
    #[instrument(skip(self, kind, items), fields(kind = tracing::field::Empty, items = items.len()), err)]
    pub async fn exec(&self, kind: impl Into<Kind>, items: Vec<T>) -> TetherResult<ExecReport> {
        let kind = kind.into();
        tracing::Span::current().record("kind", tracing::field::display(&kind));
        let Some(callback) = self.registry.callback(&kind).await else {
            return Err(TetherError::NotFound(kind));
        };

        let attempted = items.len();
        let mut failed = Vec::new();
        for item in items {
            let outcome = callback.call(vec![item.clone()]).await;
            if !outcome.is_success() {
                debug!(reason = outcome.reason.as_deref().unwrap_or(""), "item failed");
                failed.push(item);
            }
        }

        if !failed.is_empty() {
            self.queue(&kind)
                .push(&failed)
                .await
                .inspect_err(|e| error!(error = %e, lost = failed.len(), "unable to queue failed items"))?;
            info!(failed = failed.len(), "failed items queued for recovery");
        }

        Ok(ExecReport {
            kind,
            attempted,
            failed: failed.len(),
        })
    }

    pub async fn state(&self, kind: &Kind) -> KindState {
        self.registry.state(kind).await
    }

    /// Registered kinds, sorted.
    pub async fn kinds(&self) -> Vec<Kind> {
        self.registry.kinds().await
    }

    /// Recovery interval of a registered Kind.
    pub async fn interval(&self, kind: &Kind) -> Option<Duration> {
        self.registry.interval(kind).await
    }

    /// `kind`'s retry queue. Valid whether or not `kind` is registered here.
    pub fn queue(&self, kind: &Kind) -> RetryQueue<T> {
        RetryQueue::new(Arc::clone(&self.store), &self.queue_prefix, kind)
    }

    /// Lock over the same store.
    pub fn lock(&self) -> DistributedLock {
        DistributedLock::new(Arc::clone(&self.store))
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn queue_prefix(&self) -> &str {
        &self.queue_prefix
    }
}
