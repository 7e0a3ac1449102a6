//! Outcome model: the result a callback reports for one invocation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
}

/// Result of one callback invocation.
///
/// - `SUCCESS`: the items were handled.
/// - `FAILURE`: the items were not handled; `reason` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            reason: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            reason: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}

impl From<Result<(), String>> for Outcome {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(reason) => Self::failure(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_upper_snake() {
        let s = serde_json::to_string(&OutcomeKind::Success).unwrap();
        assert_eq!(s, "\"SUCCESS\"");

        let s = serde_json::to_string(&OutcomeKind::Failure).unwrap();
        assert_eq!(s, "\"FAILURE\"");
    }

    #[test]
    fn success_omits_reason() {
        let v = serde_json::to_value(Outcome::success()).unwrap();
        assert_eq!(v, serde_json::json!({ "kind": "SUCCESS" }));
    }

    #[test]
    fn converts_from_result() {
        assert!(Outcome::from(Ok(())).is_success());

        let failed = Outcome::from(Err("smtp down".to_string()));
        assert_eq!(failed.kind, OutcomeKind::Failure);
        assert_eq!(failed.reason.as_deref(), Some("smtp down"));
    }
}
