//! Retrieval Engine: intent-driven cascading search, decay-weighted
//! re-ranking, and token-budgeted assembly of the injected context
//! block.

mod intent;

pub use intent::Intent;

use chrono::Utc;
use std::sync::Arc;

use crate::chunker::estimate_tokens;
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::Result;
use crate::metrics::{names, Metrics};
use crate::model::{Collection, GroupId, MemoryPoint, MemoryType};
use crate::vector_store::{Filter, VectorStore};

/// One retrieval request.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    /// The natural-language query.
    pub query: String,
    /// Explicit collection override; if `None`, derived from `intent`.
    pub collection: Option<Collection>,
    /// Explicit type filter.
    pub memory_type: Option<MemoryType>,
    /// Explicit intent override; if `None`, detected from `query`.
    pub intent: Option<Intent>,
    /// Maximum results to return.
    pub limit: usize,
    /// Tenant key.
    pub group_id: GroupId,
}

/// One ranked result, carrying the sub-scores needed for score
/// attribution.
#[derive(Debug, Clone)]
pub struct RankedResult {
    /// The stored point.
    pub point: MemoryPoint,
    /// Collection the point was found in.
    pub collection: Collection,
    /// Raw cosine similarity from the store.
    pub semantic: f32,
    /// Recency decay factor, `0.5 ^ (age_days / half_life)`.
    pub temporal: f64,
    /// `0.7 * semantic + 0.3 * temporal`.
    pub final_score: f64,
}

/// Orchestrates query embedding, cascading collection search, re-ranking,
/// and token-budgeted packing.
pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingClient>,
    config: Config,
    metrics: Arc<Metrics>,
}

impl RetrievalEngine {
    /// Build the engine from its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingClient>,
        config: Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            embedding,
            config,
            metrics,
        }
    }

    /// Run one retrieval: embed the query, cascade across collections
    /// until `limit` results clear `SIMILARITY_THRESHOLD` or all three
    /// collections are exhausted, re-rank, and return the ranked list.
    /// Returns an empty vector, never an error, when the query yields
    /// nothing — an empty result set is not a failure.
    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<Vec<RankedResult>> {
        let intent = request
            .intent
            .unwrap_or_else(|| intent::detect(&request.query));
        let primary = request.collection.unwrap_or_else(|| intent.primary_collection());

        let mut order = vec![primary];
        for collection in Collection::all() {
            if collection != primary {
                order.push(collection);
            }
        }

        let vector = match self.embedding.embed_one(&request.query).await {
            Ok(vector) => vector,
            Err(_) => {
                return match request.memory_type {
                    Some(memory_type) => self.filter_only_search(request, memory_type, &order).await,
                    None => {
                        self.metrics.incr(names::RETRIEVAL_EMPTY).await;
                        Ok(Vec::new())
                    }
                };
            }
        };

        let mut collected: Vec<RankedResult> = Vec::new();
        for collection in order {
            let mut filter = Filter::for_group(group_key(collection, &request.group_id));
            if let Some(memory_type) = request.memory_type {
                filter = filter.eq("type", memory_type.as_str());
            }
            let hits = self
                .store
                .search(collection.name(), &vector, &filter, request.limit.max(1))
                .await?;

            for hit in hits {
                if hit.score < self.config.similarity_threshold && collected.len() >= request.limit {
                    continue;
                }
                let temporal = temporal_decay(&hit.point, &self.config);
                let final_score = 0.7 * f64::from(hit.score) + 0.3 * temporal;
                collected.push(RankedResult {
                    point: hit.point,
                    collection,
                    semantic: hit.score,
                    temporal,
                    final_score,
                });
            }

            let above_threshold = collected
                .iter()
                .filter(|r| r.semantic >= self.config.similarity_threshold)
                .count();
            if above_threshold >= request.limit {
                break;
            }
        }

        collected.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| b.point.stored_at.cmp(&a.point.stored_at))
        });
        collected.truncate(request.limit);
        Ok(collected)
    }

    /// Pack `results` into the `<retrieved_context>` block, greedily by
    /// descending `final_score`, stopping once the running token estimate
    /// would exceed `TOKEN_BUDGET`. Returns `None` if nothing fits (or
    /// `results` is empty) — callers should emit nothing to stdout in
    /// that case.
    #[must_use]
    pub fn assemble(&self, results: &[RankedResult]) -> Option<String> {
        if results.is_empty() {
            return None;
        }
        let mut body = String::new();
        let mut budget_used = 0usize;
        let mut included = 0usize;

        for result in results {
            let tokens = estimate_tokens(&result.point.content);
            if budget_used + tokens > self.config.token_budget && included > 0 {
                break;
            }
            body.push_str(&render_entry(result));
            budget_used += tokens;
            included += 1;
            if budget_used > self.config.token_budget {
                break;
            }
        }

        if included == 0 {
            return None;
        }
        Some(format!("<retrieved_context>\n{body}</retrieved_context>\n"))
    }

    /// Degrade to a metadata-only filter search when the embedding
    /// service is unavailable but the caller supplied a structural type
    /// filter. Ranked purely by recency decay since there is no vector
    /// to score against.
    async fn filter_only_search(
        &self,
        request: &RetrievalRequest,
        memory_type: MemoryType,
        order: &[Collection],
    ) -> Result<Vec<RankedResult>> {
        let mut collected: Vec<RankedResult> = Vec::new();
        for &collection in order {
            let filter =
                Filter::for_group(group_key(collection, &request.group_id)).eq("type", memory_type.as_str());
            let hits = self
                .store
                .scroll(collection.name(), &filter, request.limit.max(1), 0)
                .await?;
            for point in hits {
                let temporal = temporal_decay(&point, &self.config);
                collected.push(RankedResult {
                    point,
                    collection,
                    semantic: 0.0,
                    temporal,
                    final_score: temporal,
                });
            }
            if collected.len() >= request.limit {
                break;
            }
        }

        collected.sort_by(|a, b| {
            b.final_score
                .total_cmp(&a.final_score)
                .then_with(|| b.point.stored_at.cmp(&a.point.stored_at))
        });
        collected.truncate(request.limit);
        if collected.is_empty() {
            self.metrics.incr(names::RETRIEVAL_EMPTY).await;
        }
        Ok(collected)
    }
}

fn group_key(collection: Collection, group_id: &GroupId) -> String {
    if collection.is_per_project() {
        group_id.0.clone()
    } else {
        GroupId::SHARED.to_string()
    }
}

fn temporal_decay(point: &MemoryPoint, config: &Config) -> f64 {
    let half_life = config.half_life_days(point.memory_type);
    let age_days = (Utc::now() - point.stored_at).num_seconds() as f64 / 86_400.0;
    0.5_f64.powf(age_days.max(0.0) / half_life)
}

fn render_entry(result: &RankedResult) -> String {
    format!(
        "[{} / {:?} / {} / semantic={:.3} temporal={:.3} final={:.3}]\n{}\n\n",
        result.collection.name(),
        result.point.memory_type,
        result.point.stored_at.to_rfc3339(),
        result.semantic,
        result.temporal,
        result.final_score,
        result.point.content,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EmbeddingStatus;
    use std::collections::BTreeMap;
    use test_utils::{FixedEmbeddingClient, InMemoryVectorStore};
    use uuid::Uuid;

    async fn seeded_store() -> (Arc<InMemoryVectorStore>, Arc<FixedEmbeddingClient>) {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedding = Arc::new(FixedEmbeddingClient::new(4));
        (store, embedding)
    }

    fn point(content: &str, vector: Vec<f32>, days_old: i64) -> MemoryPoint {
        MemoryPoint {
            id: Uuid::new_v4(),
            vector,
            content: content.to_string(),
            content_hash: "h".into(),
            memory_type: MemoryType::Implementation,
            group_id: GroupId("proj-a".into()),
            stored_at: Utc::now() - chrono::Duration::days(days_old),
            is_current: true,
            source_hook: "post_tool_use".into(),
            file_path: None,
            embedding_status: EmbeddingStatus::Ready,
            logical_identity: None,
            chunk_index: None,
            total_chunks: None,
            document_id: None,
            extra: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn empty_store_returns_empty_results() {
        let (store, embedding) = seeded_store().await;
        let engine = RetrievalEngine::new(store, embedding, Config::default(), Arc::new(Metrics::new()));
        let request = RetrievalRequest {
            query: "how do we refresh JWTs".to_string(),
            collection: Some(Collection::CodePatterns),
            memory_type: None,
            intent: None,
            limit: 5,
            group_id: GroupId("proj-a".into()),
        };
        let results = engine.retrieve(&request).await.unwrap();
        assert!(results.is_empty());
        assert!(engine.assemble(&results).is_none());
    }

    #[tokio::test]
    async fn recent_memory_outranks_older_equal_semantic_memory() {
        let (store, embedding) = seeded_store().await;
        let vector = vec![1.0, 0.0, 0.0, 0.0];
        let recent = point("recent note", vector.clone(), 1);
        let old = point("old note", vector, 365);
        store
            .upsert(Collection::CodePatterns.name(), vec![recent.clone(), old.clone()])
            .await
            .unwrap();

        let engine = RetrievalEngine::new(store, embedding, Config::default(), Arc::new(Metrics::new()));
        let request = RetrievalRequest {
            query: "anything".to_string(),
            collection: Some(Collection::CodePatterns),
            memory_type: None,
            intent: None,
            limit: 5,
            group_id: GroupId("proj-a".into()),
        };
        let results = engine.retrieve(&request).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].point.id, recent.id);
        assert!(results[0].final_score > results[1].final_score);
    }

    #[tokio::test]
    async fn assemble_respects_token_budget() {
        let (store, embedding) = seeded_store().await;
        let mut config = Config::default();
        config.token_budget = 1;
        let engine = RetrievalEngine::new(store, embedding, config, Arc::new(Metrics::new()));
        let results = vec![RankedResult {
            point: point("x".repeat(100).as_str(), vec![0.0; 4], 0),
            collection: Collection::CodePatterns,
            semantic: 0.9,
            temporal: 1.0,
            final_score: 0.9,
        }];
        let assembled = engine.assemble(&results);
        assert!(assembled.is_some());
        assert!(assembled.unwrap().contains("<retrieved_context>"));
    }
}
