//! InMemoryStore - process-local KeyValueStore for development and tests.
//!
//! Every operation runs inside one critical section, which is what makes
//! `set_if_absent` and `delete_if_equals` atomic here. Expired strings are
//! purged lazily on access, using tokio's clock so paused-time tests can
//! drive TTLs.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ports::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
enum Entry {
    Str {
        value: String,
        expires_at: Option<Instant>,
    },
    List(VecDeque<String>),
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Entry::Str { expires_at: Some(at), .. } if *at <= now)
    }
}

/// Deadline `ttl` from now; a ttl past the clock's range never expires.
fn expiry(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Live entry at `key`, dropping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn list_mut(&mut self, key: &str) -> Result<Option<&mut VecDeque<String>>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry::List(list)) => Ok(Some(list)),
            Some(Entry::Str { .. }) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    fn string(&mut self, key: &str) -> Result<Option<&str>, StoreError> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry::Str { value, .. }) => Ok(Some(value.as_str())),
            Some(Entry::List(_)) => Err(StoreError::WrongType(key.to_string())),
        }
    }
}

/// InMemoryStore keeps strings and lists in a single keyspace, like a one-node Redis.
///
/// `set_offline(true)` makes every call fail with `StoreError::Connection`, which
/// lets callers rehearse an unreachable backend.
pub struct InMemoryStore {
    keyspace: Mutex<Keyspace>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("in-memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    async fn push(&self, key: &str, values: &[String]) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        // Purges an expired string and rejects a live one.
        let current = keyspace.list_mut(key)?.map_or(0, |list| list.len() as u64);
        // Like Redis, never materialize an empty list.
        if values.is_empty() {
            return Ok(current);
        }
        let Entry::List(list) = keyspace
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        else {
            return Err(StoreError::WrongType(key.to_string()));
        };
        list.extend(values.iter().cloned());
        Ok(list.len() as u64)
    }

    async fn pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        let Some(list) = keyspace.list_mut(key)? else {
            return Ok(None);
        };
        let head = list.pop_front();
        // Redis semantics: an emptied list no longer exists.
        if list.is_empty() {
            keyspace.entries.remove(key);
        }
        Ok(head)
    }

    async fn count(&self, key: &str) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        Ok(keyspace.list_mut(key)?.map_or(0, |list| list.len() as u64))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        if keyspace.live(key).is_some() {
            return Ok(false);
        }
        keyspace.entries.insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: expiry(ttl),
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        let matches = match keyspace.live(key) {
            Some(Entry::Str { value: current, .. }) => current == value,
            _ => false,
        };
        if matches {
            keyspace.entries.remove(key);
        }
        Ok(matches)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        Ok(keyspace.string(key)?.map(str::to_string))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        keyspace.entries.insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: ttl.and_then(expiry),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[&str]) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        let mut removed = 0;
        for key in keys {
            if keyspace.live(key).is_some() {
                keyspace.entries.remove(*key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, keys: &[&str]) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut keyspace = self.keyspace.lock().await;
        let mut found = 0;
        for key in keys {
            if keyspace.live(key).is_some() {
                found += 1;
            }
        }
        Ok(found)
    }
}
