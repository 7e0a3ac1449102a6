//! Registry - Kind → callback table.
//!
//! Shared between `register` (writer) and `exec` (readers), so it sits behind
//! an async `RwLock`. The insert checks and stores under one write guard, which
//! is what makes concurrent registration of the same Kind yield one winner.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

use crate::domain::{Kind, KindState, TetherError, TetherResult};
use crate::ports::{Callback, Item};

pub(crate) struct Registration<T: Item> {
    pub(crate) callback: Arc<dyn Callback<T>>,
    pub(crate) interval: Duration,
    /// Set once by the recovery task when it starts.
    pub(crate) active: Arc<AtomicBool>,
}

impl<T: Item> Registration<T> {
    pub(crate) fn new(callback: Arc<dyn Callback<T>>, interval: Duration) -> Self {
        Self {
            callback,
            interval,
            active: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub(crate) struct Registry<T: Item> {
    entries: RwLock<HashMap<Kind, Registration<T>>>,
}

impl<T: Item> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Store `registration` unless `kind` already has one. Never overwrites.
    pub(crate) async fn insert(&self, kind: Kind, registration: Registration<T>) -> TetherResult<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&kind) {
            return Err(TetherError::DuplicateRegistration(kind));
        }
        entries.insert(kind, registration);
        Ok(())
    }

    pub(crate) async fn callback(&self, kind: &Kind) -> Option<Arc<dyn Callback<T>>> {
        self.entries
            .read()
            .await
            .get(kind)
            .map(|r| Arc::clone(&r.callback))
    }

    pub(crate) async fn interval(&self, kind: &Kind) -> Option<Duration> {
        self.entries.read().await.get(kind).map(|r| r.interval)
    }

    pub(crate) async fn state(&self, kind: &Kind) -> KindState {
        match self.entries.read().await.get(kind) {
            None => KindState::Unregistered,
            Some(r) if r.active.load(Ordering::SeqCst) => KindState::Active,
            Some(_) => KindState::Registered,
        }
    }

    /// Registered kinds, sorted.
    pub(crate) async fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.entries.read().await.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Outcome;

    fn registration() -> Registration<String> {
        let callback = |_items: Vec<String>| async { Outcome::success() };
        Registration::new(Arc::new(callback), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn insert_and_lookup() {
        let registry = Registry::new();
        registry.insert(Kind::new("email"), registration()).await.unwrap();

        assert!(registry.callback(&Kind::new("email")).await.is_some());
        assert!(registry.callback(&Kind::new("sms")).await.is_none());
        assert_eq!(
            registry.interval(&Kind::new("email")).await,
            Some(Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_and_keeps_first() {
        let registry = Registry::new();
        let first = registration();
        let first_cb = Arc::clone(&first.callback);
        registry.insert(Kind::new("email"), first).await.unwrap();

        let err = registry
            .insert(Kind::new("email"), registration())
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::DuplicateRegistration(k) if k.as_str() == "email"));

        let stored = registry.callback(&Kind::new("email")).await.unwrap();
        assert!(Arc::ptr_eq(&stored, &first_cb));
    }

    #[tokio::test]
    async fn state_follows_active_flag() {
        let registry = Registry::new();
        let kind = Kind::new("email");
        assert_eq!(registry.state(&kind).await, KindState::Unregistered);

        let reg = registration();
        let active = Arc::clone(&reg.active);
        registry.insert(kind.clone(), reg).await.unwrap();
        assert_eq!(registry.state(&kind).await, KindState::Registered);

        active.store(true, Ordering::SeqCst);
        assert_eq!(registry.state(&kind).await, KindState::Active);
    }

    #[tokio::test]
    async fn kinds_are_sorted() {
        let registry = Registry::new();
        for k in ["sms", "email", "push"] {
            registry.insert(Kind::new(k), registration()).await.unwrap();
        }
        let kinds: Vec<String> = registry
            .kinds()
            .await
            .into_iter()
            .map(|k| k.to_string())
            .collect();
        assert_eq!(kinds, ["email", "push", "sms"]);
    }
}
