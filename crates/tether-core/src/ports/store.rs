//! KeyValueStore port - the list/string capability the lock and the retry queue sit on.
//!
//! Implementations: `impls::InMemoryStore` (development, tests) and
//! `impls::RedisStore` (behind the `redis` feature).

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),

    #[error("key '{0}' holds a value of the wrong type")]
    WrongType(String),
}

/// Minimal key-value capability.
///
/// Every method is a single round trip. `set_if_absent` and `delete_if_equals`
/// must be atomic on the backend side; the lock's ownership guarantees rest on them.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Append `values` to the tail of the list at `key`. Returns the new length.
    async fn push(&self, key: &str, values: &[String]) -> Result<u64, StoreError>;

    /// Remove and return the head of the list at `key`.
    async fn pop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Length of the list at `key` (0 when absent).
    async fn count(&self, key: &str) -> Result<u64, StoreError>;

    /// Set `key` to `value` with expiry `ttl` only if `key` does not exist.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    /// Delete `key` only if its current value equals `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditional set; `ttl = None` keeps the value until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete `keys`. Returns how many existed.
    async fn del(&self, keys: &[&str]) -> Result<u64, StoreError>;

    /// How many of `keys` exist.
    async fn exists(&self, keys: &[&str]) -> Result<u64, StoreError>;
}
