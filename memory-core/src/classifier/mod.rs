//! Classifier: assigns a [`MemoryType`] to free-form content via an
//! ordered provider chain, each guarded by its own circuit breaker, with a
//! deterministic regex fallback as the terminal provider.
//!
//! Classification runs off the capture hot path: the storage engine
//! stores a point with the conservative default type
//! ([`MemoryType::Context`]) and enqueues a [`ClassificationTask`]; a
//! background worker drains the queue, classifies, and reports the
//! updated type back through a callback.

pub mod circuit_breaker;
pub mod rules;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{Collection, GroupId, MemoryType};
use crate::vector_store::{Filter, VectorStore};
use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

/// A classification backend in the local-model → hosted-model →
/// rule-based-default provider chain.
#[async_trait]
pub trait ClassifierProvider: Send + Sync {
    /// Human-readable provider name, for logging.
    fn name(&self) -> &str;

    /// Assign a type to `content`. Implementations should return an
    /// `Err` (counted as a circuit-breaker failure) only for transport
    /// failures, not for "I couldn't decide" — that case should map to
    /// `Ok(MemoryType::Context)`.
    async fn classify(&self, content: &str) -> Result<MemoryType>;
}

/// The terminal fallback provider: deterministic regex rules. Never
/// fails, so it never trips its own (notional) breaker.
pub struct RuleBasedProvider;

#[async_trait]
impl ClassifierProvider for RuleBasedProvider {
    fn name(&self) -> &str {
        "rule-based"
    }

    async fn classify(&self, content: &str) -> Result<MemoryType> {
        Ok(rules::classify(content).unwrap_or(MemoryType::Context))
    }
}

struct GuardedProvider {
    provider: Arc<dyn ClassifierProvider>,
    breaker: CircuitBreaker,
}

/// Tries each configured provider in order, skipping any whose breaker is
/// open, and falls through to [`RuleBasedProvider`] if every provider in
/// the chain is unavailable.
pub struct Classifier {
    chain: Vec<GuardedProvider>,
    fallback: RuleBasedProvider,
}

impl Classifier {
    /// Build a classifier from an ordered provider chain (earlier entries
    /// are tried first). The rule-based fallback is always appended
    /// implicitly and needs no breaker.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn ClassifierProvider>>) -> Self {
        Self::with_breaker_config(providers, CircuitBreakerConfig::default())
    }

    /// As [`Self::new`], with an explicit breaker configuration shared by
    /// every provider in the chain.
    #[must_use]
    pub fn with_breaker_config(
        providers: Vec<Arc<dyn ClassifierProvider>>,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        let chain = providers
            .into_iter()
            .map(|provider| GuardedProvider {
                provider,
                breaker: CircuitBreaker::new(breaker_config.clone()),
            })
            .collect();
        Self {
            chain,
            fallback: RuleBasedProvider,
        }
    }

    /// Classify `content`, walking the provider chain and falling back to
    /// regex rules if every provider is open or fails.
    pub async fn classify(&self, content: &str) -> MemoryType {
        for guarded in &self.chain {
            if !guarded.breaker.should_attempt().await {
                continue;
            }
            match guarded.provider.classify(content).await {
                Ok(memory_type) => {
                    guarded.breaker.record_success().await;
                    return memory_type;
                }
                Err(_) => {
                    guarded.breaker.record_failure().await;
                }
            }
        }
        // Fallback never errors.
        self.fallback
            .classify(content)
            .await
            .unwrap_or(MemoryType::Context)
    }
}

/// One deferred classification request: a point already persisted with
/// the conservative default type, awaiting its real type assignment.
/// Carries enough of the point's identity to re-locate it afterward —
/// `VectorStore` has no get-by-id lookup, so the write-back has to go
/// through the same `(group_id, content_hash, is_current)` filter a
/// capture itself would use.
#[derive(Debug, Clone)]
pub struct ClassificationTask {
    /// Id of the point to update.
    pub point_id: Uuid,
    /// Content to classify (the same text the point was stored with).
    pub content: String,
    /// Collection the point lives in.
    pub collection: Collection,
    /// Tenant key.
    pub group_id: GroupId,
    /// The point's content hash, used to re-locate it for write-back.
    pub content_hash: String,
}

/// Outcome of draining one [`ClassificationTask`].
#[derive(Debug, Clone)]
pub struct ClassificationResult {
    /// Id of the point that was classified.
    pub point_id: Uuid,
    /// The type the classifier assigned.
    pub memory_type: MemoryType,
    /// Collection the point lives in.
    pub collection: Collection,
    /// Tenant key.
    pub group_id: GroupId,
    /// The point's content hash, used to re-locate it for write-back.
    pub content_hash: String,
}

/// Apply a drained [`ClassificationResult`] to the store: re-locate the
/// point by its `(group_id, content_hash, is_current)` triple and
/// upsert it with the resolved type. A point already superseded or
/// deleted between capture and classification is silently skipped
/// rather than treated as an error.
pub async fn apply_classification_result(store: &dyn VectorStore, result: ClassificationResult) -> Result<()> {
    let filter = Filter::for_group(result.group_id.0.clone())
        .eq("content_hash", result.content_hash.clone())
        .eq("is_current", true);
    let mut hits = store.scroll(result.collection.name(), &filter, 8, 0).await?;
    let Some(point) = hits.iter_mut().find(|p| p.id == result.point_id) else {
        return Ok(());
    };
    point.memory_type = result.memory_type;
    store.upsert(result.collection.name(), vec![point.clone()]).await
}

/// An in-process, bounded queue of pending classification tasks plus the
/// background worker that drains it. Classification is best-effort and
/// in-memory only — a task lost to a process crash simply leaves the
/// point at its conservative default type, which is safe.
pub struct ClassificationQueue {
    sender: mpsc::Sender<ClassificationTask>,
}

impl ClassificationQueue {
    /// Spawn the worker and return a handle plus a receiver for completed
    /// results (the caller is responsible for applying them to the
    /// store, e.g. via `VectorStore::upsert`).
    #[must_use]
    pub fn spawn(
        classifier: Arc<Classifier>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ClassificationResult>) {
        let (task_tx, mut task_rx) = mpsc::channel::<ClassificationTask>(capacity);
        let (result_tx, result_rx) = mpsc::channel::<ClassificationResult>(capacity);

        tokio::spawn(async move {
            while let Some(task) = task_rx.recv().await {
                let memory_type = classifier.classify(&task.content).await;
                let result = ClassificationResult {
                    point_id: task.point_id,
                    memory_type,
                    collection: task.collection,
                    group_id: task.group_id,
                    content_hash: task.content_hash,
                };
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        });

        (Self { sender: task_tx }, result_rx)
    }

    /// Fire-and-forget enqueue; silently drops the task if the queue is
    /// full rather than blocking the capture hot path.
    pub fn enqueue(&self, task: ClassificationTask) {
        let _ = self.sender.try_send(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyProvider {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl ClassifierProvider for FlakyProvider {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn classify(&self, _content: &str) -> Result<MemoryType> {
            if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(crate::error::Error::TransportUnavailable("down".into()))
            } else {
                Ok(MemoryType::Decision)
            }
        }
    }

    #[tokio::test]
    async fn falls_back_to_rules_when_provider_errors() {
        let provider = Arc::new(FlakyProvider {
            failures_remaining: AtomicU32::new(10),
        });
        let classifier = Classifier::new(vec![provider]);
        let result = classifier.classify("port 8080 is in use").await;
        assert_eq!(result, MemoryType::Port);
    }

    #[tokio::test]
    async fn uses_provider_when_healthy() {
        let provider = Arc::new(FlakyProvider {
            failures_remaining: AtomicU32::new(0),
        });
        let classifier = Classifier::new(vec![provider]);
        let result = classifier.classify("anything at all").await;
        assert_eq!(result, MemoryType::Decision);
    }

    #[tokio::test]
    async fn rule_based_provider_defaults_to_context() {
        let provider = RuleBasedProvider;
        let result = provider.classify("nothing special here").await.unwrap();
        assert_eq!(result, MemoryType::Context);
    }

    #[tokio::test]
    async fn classification_queue_drains_tasks() {
        let classifier = Arc::new(Classifier::new(Vec::new()));
        let (queue, mut results) = ClassificationQueue::spawn(classifier, 8);
        queue.enqueue(ClassificationTask {
            point_id: Uuid::new_v4(),
            content: "we decided to use postgres".to_string(),
            collection: Collection::Discussions,
            group_id: GroupId("proj-a".to_string()),
            content_hash: "hash".to_string(),
        });
        let result = results.recv().await.expect("a result");
        assert_eq!(result.memory_type, MemoryType::Decision);
    }
}
