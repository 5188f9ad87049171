//! In-process metrics counters. No exporter is wired up — these exist
//! so call sites can record notable events (`skipped_duplicate`,
//! budget breaches, dead-letters) without reaching for a global
//! mutable singleton anywhere else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

/// A single named, monotonically increasing counter.
#[derive(Default)]
struct Counter(AtomicU64);

impl Counter {
    fn incr(&self, by: u64) {
        self.0.fetch_add(by, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Process-local counter registry, held behind an `Arc` and threaded
/// through the pipeline explicitly rather than kept as a module-level
/// singleton.
#[derive(Default)]
pub struct Metrics {
    counters: RwLock<HashMap<&'static str, Counter>>,
}

impl Metrics {
    /// A fresh, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment `name` by 1.
    pub async fn incr(&self, name: &'static str) {
        self.incr_by(name, 1).await;
    }

    /// Increment `name` by `by`.
    pub async fn incr_by(&self, name: &'static str, by: u64) {
        {
            let counters = self.counters.read().await;
            if let Some(counter) = counters.get(name) {
                counter.incr(by);
                return;
            }
        }
        let mut counters = self.counters.write().await;
        counters.entry(name).or_default().incr(by);
    }

    /// Current value of `name`, or 0 if never incremented.
    pub async fn get(&self, name: &'static str) -> u64 {
        self.counters.read().await.get(name).map_or(0, Counter::get)
    }

    /// Snapshot every counter, for logging/dashboards.
    pub async fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.counters
            .read()
            .await
            .iter()
            .map(|(name, counter)| (*name, counter.get()))
            .collect()
    }
}

/// Counter names used across the pipeline.
pub mod names {
    pub const SKIPPED_DUPLICATE: &str = "skipped_duplicate";
    pub const HOOK_BUDGET_EXCEEDED: &str = "hook_budget_exceeded";
    pub const QUEUE_DEAD_LETTERED: &str = "queue_dead_lettered";
    pub const EMBEDDING_FALLBACK_PENDING: &str = "embedding_fallback_pending";
    pub const RETRIEVAL_EMPTY: &str = "retrieval_empty";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn increments_and_reads_back() {
        let metrics = Metrics::new();
        metrics.incr(names::SKIPPED_DUPLICATE).await;
        metrics.incr(names::SKIPPED_DUPLICATE).await;
        assert_eq!(metrics.get(names::SKIPPED_DUPLICATE).await, 2);
    }

    #[tokio::test]
    async fn unknown_counter_reads_zero() {
        let metrics = Metrics::new();
        assert_eq!(metrics.get(names::RETRIEVAL_EMPTY).await, 0);
    }
}
