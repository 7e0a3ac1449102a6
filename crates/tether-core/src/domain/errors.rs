use thiserror::Error;

use super::Kind;
use crate::ports::StoreError;

/// Errors surfaced by the lock, the retry queue and the executor.
///
/// Lock contention and per-item callback failures are not errors; they are
/// reported through return values and logs.
#[derive(Debug, Error)]
pub enum TetherError {
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("kind '{0}' is already registered")]
    DuplicateRegistration(Kind),

    #[error("no callback registered for kind '{0}'")]
    NotFound(Kind),

    #[error("batch serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0} must be non-zero and within the clock range")]
    InvalidDuration(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unsupported {what}: {value}")]
    Unsupported { what: &'static str, value: String },
}

pub type TetherResult<T> = Result<T, TetherError>;
