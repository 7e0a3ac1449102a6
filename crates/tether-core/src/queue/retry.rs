//! RetryQueue: FIFO of failed-item batches for one Kind.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, error};

use super::codec::{decode_batch, encode_batch};
use crate::domain::{Kind, TetherResult};
use crate::ports::{Item, KeyValueStore};

/// Storage key of `kind`'s retry queue.
///
/// The prefix is fixed per executor, so distinct kinds always map to distinct keys.
pub fn queue_key(prefix: &str, kind: &Kind) -> String {
    format!("{prefix}{kind}")
}

/// RetryQueue stores batches of `T` as JSON arrays in one list.
///
/// Ordering is per batch: one `push` is one entry, one `drain` pops one entry.
pub struct RetryQueue<T> {
    store: Arc<dyn KeyValueStore>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for RetryQueue<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            key: self.key.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Item> RetryQueue<T> {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: &str, kind: &Kind) -> Self {
        Self {
            store,
            key: queue_key(prefix, kind),
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append `batch` as one entry.
    pub async fn push(&self, batch: &[T]) -> TetherResult<()> {
        let raw = encode_batch(batch).inspect_err(|e| {
            error!(queue = %self.key, error = %e, "unable to serialize batch, dropping it");
        })?;
        let len = self.store.push(&self.key, &[raw]).await?;
        debug!(queue = %self.key, items = batch.len(), queued = len, "batch queued");
        Ok(())
    }

    /// Pop the oldest batch.
    ///
    /// `Ok(None)` when the queue is empty. A batch that no longer decodes is
    /// already off the queue when the error is returned; it is lost.
    pub async fn drain(&self) -> TetherResult<Option<Vec<T>>> {
        let Some(raw) = self.store.pop(&self.key).await? else {
            return Ok(None);
        };
        let batch = decode_batch(&raw).inspect_err(|e| {
            error!(queue = %self.key, error = %e, raw = %raw, "unable to decode batch, dropping it");
        })?;
        Ok(Some(batch))
    }

    /// Number of queued batches.
    pub async fn count(&self) -> TetherResult<u64> {
        Ok(self.store.count(&self.key).await?)
    }
}
