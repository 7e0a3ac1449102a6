//! Distributed mutual exclusion over a KeyValueStore.
//!
//! A lock is a string key holding its owner's token with a TTL. Acquire is one
//! set-if-absent-with-expiry; release is one compare-and-delete. Neither retries:
//! contention and foreign ownership come back as `Ok(false)`, only backend
//! failures are errors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use ulid::Ulid;

use crate::domain::{TetherError, TetherResult};
use crate::ports::KeyValueStore;

/// Opaque token identifying a lock holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Fresh, globally unique token.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Try to take `source` for `owner` until `ttl` elapses.
    ///
    /// Returns `Ok(false)` when someone already holds it. A zero `ttl` is rejected:
    /// the expiry is what frees the lock if its holder dies.
    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    pub async fn acquire(&self, source: &str, owner: &Owner, ttl: Duration) -> TetherResult<bool> {
        if ttl.is_zero() {
            return Err(TetherError::InvalidDuration("lock ttl"));
        }
        let acquired = self
            .store
            .set_if_absent(source, owner.as_str(), ttl)
            .await?;
        if acquired {
            debug!(ttl = ?ttl, "lock acquired");
        } else {
            info!("lock is held by another owner");
        }
        Ok(acquired)
    }

    /// Release `source` if and only if `owner` still holds it.
    #[instrument(skip(self, owner), fields(owner = %owner), err)]
    pub async fn release(&self, source: &str, owner: &Owner) -> TetherResult<bool> {
        let released = self.store.delete_if_equals(source, owner.as_str()).await?;
        if released {
            debug!("lock released");
        } else {
            info!("lock not released: absent or held by another owner");
        }
        Ok(released)
    }

    /// Current holder of `source`, if any.
    pub async fn holder(&self, source: &str) -> TetherResult<Option<Owner>> {
        Ok(self.store.get(source).await?.map(Owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryStore;
    use crate::ports::StoreError;

    const TTL: Duration = Duration::from_secs(30);

    fn lock() -> (Arc<InMemoryStore>, DistributedLock) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), DistributedLock::new(store))
    }

    #[tokio::test]
    async fn second_owner_cannot_acquire_held_lock() {
        let (_, lock) = lock();
        let (o1, o2) = (Owner::generate(), Owner::generate());

        assert!(lock.acquire("orders", &o1, TTL).await.unwrap());
        assert!(!lock.acquire("orders", &o2, TTL).await.unwrap());
        assert_eq!(lock.holder("orders").await.unwrap(), Some(o1));
    }

    #[tokio::test]
    async fn release_by_owner_frees_the_lock() {
        let (_, lock) = lock();
        let (o1, o2) = (Owner::generate(), Owner::generate());

        assert!(lock.acquire("orders", &o1, TTL).await.unwrap());
        assert!(lock.release("orders", &o1).await.unwrap());
        assert!(lock.acquire("orders", &o2, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn release_by_other_owner_leaves_lock_intact() {
        let (_, lock) = lock();
        let (o1, o2) = (Owner::new("o1"), Owner::new("o2"));

        assert!(lock.acquire("orders", &o1, TTL).await.unwrap());
        assert!(!lock.release("orders", &o2).await.unwrap());
        assert_eq!(lock.holder("orders").await.unwrap(), Some(o1.clone()));
        assert!(!lock.acquire("orders", &o2, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn release_of_absent_lock_is_false() {
        let (_, lock) = lock();
        assert!(!lock.release("nothing", &Owner::generate()).await.unwrap());
    }

    #[tokio::test]
    async fn locks_on_different_sources_are_independent() {
        let (_, lock) = lock();
        let owner = Owner::generate();
        assert!(lock.acquire("a", &owner, TTL).await.unwrap());
        assert!(lock.acquire("b", &Owner::generate(), TTL).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_can_be_taken_over() {
        let (_, lock) = lock();
        let (o1, o2) = (Owner::generate(), Owner::generate());

        assert!(lock.acquire("orders", &o1, Duration::from_secs(1)).await.unwrap());
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(lock.acquire("orders", &o2, TTL).await.unwrap());
        // The crashed holder's late release must not free the new owner's lock.
        assert!(!lock.release("orders", &o1).await.unwrap());
        assert_eq!(lock.holder("orders").await.unwrap(), Some(o2));
    }

    #[tokio::test]
    async fn zero_ttl_is_rejected() {
        let (_, lock) = lock();
        let err = lock
            .acquire("orders", &Owner::generate(), Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::InvalidDuration("lock ttl")));
        assert_eq!(lock.holder("orders").await.unwrap(), None);
    }

    #[tokio::test]
    async fn storage_failure_is_an_error() {
        let (store, lock) = lock();
        store.set_offline(true);

        let err = lock
            .acquire("orders", &Owner::generate(), TTL)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::Storage(StoreError::Connection(_))));

        let err = lock.release("orders", &Owner::generate()).await.unwrap_err();
        assert!(matches!(err, TetherError::Storage(_)));
    }

    #[tokio::test]
    async fn concurrent_acquires_have_one_winner() {
        let (_, lock) = lock();
        let attempts: Vec<_> = (0..16)
            .map(|_| {
                let lock = lock.clone();
                tokio::spawn(async move { lock.acquire("hot", &Owner::generate(), TTL).await })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            if attempt.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
