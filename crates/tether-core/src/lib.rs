//! tether-core
//!
//! Store-backed coordination primitives for processes sharing one KeyValueStore.
//!
//! # Modules
//! - **domain**: Kind, Outcome, errors
//! - **ports**: KeyValueStore and Callback traits
//! - **impls**: in-memory and Redis stores
//! - **lock**: DistributedLock (set-if-absent acquire, compare-and-delete release)
//! - **queue**: per-Kind RetryQueue of JSON batches
//! - **app**: Executor (register, exec, recovery loop)
//! - **config**: YAML Properties
//! - **observability**: tracing initialization

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod lock;
pub mod observability;
pub mod ports;
pub mod queue;

pub use app::{ExecReport, Executor, RecoveryHandle};
pub use domain::{Kind, KindState, Outcome, OutcomeKind, TetherError, TetherResult};
pub use lock::{DistributedLock, Owner};
pub use ports::{Callback, Item, KeyValueStore, StoreError};
pub use queue::RetryQueue;
