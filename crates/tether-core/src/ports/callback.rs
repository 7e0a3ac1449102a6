//! Callback port - the unit of work an executor dispatches per Kind.

use std::future::Future;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::Outcome;

/// Items carried through `exec` and the retry queue.
///
/// - `Serialize + DeserializeOwned`: failed items are stored as JSON batches.
/// - `Clone`: an item is handed to the callback and kept for the failure batch.
pub trait Item: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Item for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Callback receives a sequence of items and reports one `Outcome` for all of them.
///
/// `exec` calls it with one item at a time; the recovery task calls it once with a
/// whole replayed batch.
///
/// Any `Fn(Vec<T>) -> impl Future<Output = Outcome>` closure is a callback:
/// ```ignore
/// executor
///     .register("email", Duration::from_secs(30), |mails: Vec<String>| async move {
///         send_all(&mails).await.into()
///     })
///     .await?;
/// ```
#[async_trait]
pub trait Callback<T: Item>: Send + Sync {
    async fn call(&self, items: Vec<T>) -> Outcome;
}

#[async_trait]
impl<T, F, Fut> Callback<T> for F
where
    T: Item,
    F: Fn(Vec<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    async fn call(&self, items: Vec<T>) -> Outcome {
        (self)(items).await
    }
}
