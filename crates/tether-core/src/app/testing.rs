//! Test callbacks.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::Outcome;
use crate::ports::Callback;

/// Records every invocation; fails any call containing one of `failing` items.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    failing: Arc<HashSet<String>>,
}

impl Recorder {
    pub(crate) fn failing_on(items: &[&str]) -> Self {
        Self {
            calls: Arc::default(),
            failing: Arc::new(items.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Callback<String> for Recorder {
    async fn call(&self, items: Vec<String>) -> Outcome {
        let failed = items.iter().find(|i| self.failing.contains(*i)).cloned();
        self.calls.lock().unwrap().push(items);
        match failed {
            Some(item) => Outcome::failure(format!("refused {item}")),
            None => Outcome::success(),
        }
    }
}
