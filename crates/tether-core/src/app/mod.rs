//! App - executor layer.
//!
//! # Components
//! - **Executor**: `register` / `exec` over a KeyValueStore
//! - **Registry**: Kind → callback table, duplicate-rejecting
//! - **Recovery**: per-Kind periodic replay of the retry queue

pub mod executor;
pub mod recovery;
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use self::executor::{ExecReport, Executor};
pub use self::recovery::RecoveryHandle;
