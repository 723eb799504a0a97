use std::sync::Arc;

use dashmap::DashMap;

/// Per-stage counters keyed by `"{stage}.{outcome}"`.
///
/// Constructed once in `main` and handed to every stage; there is no global
/// registry.
#[derive(Clone, Default)]
pub struct StageMetrics {
    counters: Arc<DashMap<String, u64>>,
}

impl StageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, stage: &str, outcome: &str) {
        *self
            .counters
            .entry(format!("{stage}.{outcome}"))
            .or_insert(0) += 1;
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }

    /// All counters, sorted by key.
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut all: Vec<_> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        all.sort();
        all
    }
}
