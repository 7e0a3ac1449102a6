use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind names a family of units of work sharing one callback and one retry queue.
///
/// The value is opaque to the executor; it is only compared, hashed and appended
/// to the queue prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Kind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<&Kind> for Kind {
    fn from(kind: &Kind) -> Self {
        kind.clone()
    }
}

impl From<String> for Kind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle of a Kind inside one executor. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindState {
    Unregistered,
    /// Callback stored, recovery task not yet running.
    Registered,
    /// Recovery task has started.
    Active,
}
