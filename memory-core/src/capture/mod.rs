//! Storage Engine: orchestrates fingerprinting, chunking, embedding,
//! near-duplicate suppression, versioning and persistence for one
//! `store()` call.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunker::{self, ChunkBudget};
use crate::classifier::{ClassificationQueue, ClassificationTask};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::fingerprint::{self, DedupOutcome};
use crate::metrics::{names, Metrics};
use crate::model::{Collection, EmbeddingStatus, GroupId, MemoryPoint, MemoryType};
use crate::queue::{PendingQueue, QueuedCapture};
use crate::vector_store::{Filter, VectorStore};

/// One capture request: content plus enough metadata to place and
/// deduplicate it.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// The textual payload to persist.
    pub content: String,
    /// Target collection.
    pub collection: Collection,
    /// Target type; must be permitted in `collection`.
    pub memory_type: MemoryType,
    /// Tenant key.
    pub group_id: GroupId,
    /// The event kind that produced this memory.
    pub source_hook: String,
    /// Optional versioning key (e.g. a file path).
    pub logical_identity: Option<String>,
    /// File path, if this capture is eligible for freshness tracking.
    pub file_path: Option<String>,
    /// Type-specific metadata merged into the stored point's `extra`.
    pub extra: crate::vector_store::Extra,
    /// Whether hashing should lowercase content before hashing (type
    /// configured — code is case-sensitive, prose is not).
    pub case_sensitive: bool,
}

/// Outcome of a [`CaptureEngine::store`] call. Never an `Err` for
/// expected degradation paths — those are represented as variants here
/// so callers branch on a closed set instead of catching.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// One or more points were written with real or pending embeddings.
    Stored {
        /// Ids of the points written, in chunk order.
        point_ids: Vec<Uuid>,
    },
    /// An exact or semantic duplicate already covers this content.
    Duplicate {
        /// Id of the point that already satisfies this write.
        existing_id: Uuid,
    },
    /// Persisted to the pending queue instead of the vector store.
    Queued {
        /// Human-readable reason.
        reason: String,
    },
}

/// Orchestrates fingerprinting, chunking, embedding and versioning for
/// one capture.
pub struct CaptureEngine {
    store: Arc<dyn VectorStore>,
    embedding: Arc<dyn EmbeddingClient>,
    queue: Arc<PendingQueue>,
    classification: Option<Arc<ClassificationQueue>>,
    config: Config,
    metrics: Arc<Metrics>,
}

impl CaptureEngine {
    /// Construct the engine from its collaborators. `classification` is
    /// `None` in contexts (e.g. tests) that don't need async type
    /// assignment; points are then left at their conservative default.
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedding: Arc<dyn EmbeddingClient>,
        queue: Arc<PendingQueue>,
        classification: Option<Arc<ClassificationQueue>>,
        config: Config,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            embedding,
            queue,
            classification,
            config,
            metrics,
        }
    }

    /// Run the full capture pipeline: fingerprint, dedup, chunk, embed,
    /// version, and persist (or queue/backfill on degradation).
    pub async fn store(&self, request: CaptureRequest) -> Result<CaptureOutcome> {
        if request.group_id.0.trim().is_empty() {
            return Err(Error::InvalidInput("group_id must not be empty".into()));
        }
        if !request.collection.permitted_types().contains(&request.memory_type) {
            return Err(Error::InvalidInput(format!(
                "type {:?} is not permitted in collection {}",
                request.memory_type,
                request.collection.name()
            )));
        }

        let normalized = fingerprint::normalize_content(&request.content, !request.case_sensitive);
        let content_hash = fingerprint::content_hash(
            request.collection,
            request.memory_type.as_str(),
            request.logical_identity.as_deref(),
            &normalized,
        );

        // Step 2: exact-hash lookup.
        let hash_filter = Filter::for_group(request.group_id.0.clone()).eq("content_hash", content_hash.clone());
        match self.store.scroll(request.collection.name(), &hash_filter, 1, 0).await {
            Ok(hits) if !hits.is_empty() => {
                return Ok(CaptureOutcome::Duplicate {
                    existing_id: hits[0].id,
                });
            }
            Ok(_) => {}
            Err(err) if err.is_recoverable() => {
                return self.enqueue(&request, &content_hash, &format!("store unavailable: {err}")).await;
            }
            Err(err) => return Err(err),
        }

        // Step 3: chunk if oversized.
        let chunks = chunker::chunk_content(&request.content, ChunkBudget::default());

        let mut point_ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            match self.store_chunk(&request, chunk, &content_hash).await? {
                ChunkOutcome::Stored(point) => point_ids.push(point),
                ChunkOutcome::Duplicate(existing_id) => {
                    return Ok(CaptureOutcome::Duplicate { existing_id });
                }
                ChunkOutcome::Queued(reason) => {
                    return Ok(CaptureOutcome::Queued { reason });
                }
            }
        }

        Ok(CaptureOutcome::Stored { point_ids })
    }

    async fn store_chunk(
        &self,
        request: &CaptureRequest,
        chunk: &chunker::Chunk,
        content_hash: &str,
    ) -> Result<ChunkOutcome> {
        // Step 4: synchronous embedding, degrading to pending/queued on
        // failure.
        let (vector, embedding_status) = match self.embedding.embed_one(&chunk.text).await {
            Ok(vector) => (vector, EmbeddingStatus::Ready),
            Err(_) if self.store.is_healthy().await => {
                self.metrics.incr(names::EMBEDDING_FALLBACK_PENDING).await;
                (vec![0.0; self.embedding.dimension()], EmbeddingStatus::Pending)
            }
            Err(err) => {
                return Ok(ChunkOutcome::Queued(format!(
                    "embedding and store both unavailable: {err}"
                )));
            }
        };

        // Step 5: near-duplicate suppression (only meaningful with a real
        // vector; a pending placeholder can't be compared).
        if embedding_status == EmbeddingStatus::Ready {
            let outcome = fingerprint::check_near_duplicate(
                self.store.as_ref(),
                request.collection,
                &request.group_id.0,
                request.memory_type.as_str(),
                &vector,
                self.config.dedup_threshold,
            )
            .await?;
            if let DedupOutcome::Duplicate { existing_id, .. } = outcome {
                return Ok(ChunkOutcome::Duplicate(existing_id));
            }
        }

        // Step 6: versioning — supersede the prior current point sharing
        // this logical identity, if any.
        if let Some(ref key) = request.logical_identity {
            let prior_filter = Filter::for_group(request.group_id.0.clone())
                .eq("logical_identity", key.clone())
                .eq("is_current", true);
            let prior = self
                .store
                .scroll(request.collection.name(), &prior_filter, 16, 0)
                .await?;
            if !prior.is_empty() {
                let mut superseded = prior;
                for point in &mut superseded {
                    point.is_current = false;
                }
                self.store.upsert(request.collection.name(), superseded).await?;
            }
        }

        let point = MemoryPoint {
            id: Uuid::new_v4(),
            vector,
            content: chunk.text.clone(),
            content_hash: content_hash.to_string(),
            memory_type: request.memory_type,
            group_id: request.group_id.clone(),
            stored_at: Utc::now(),
            is_current: true,
            source_hook: request.source_hook.clone(),
            file_path: request.file_path.clone(),
            embedding_status,
            logical_identity: request.logical_identity.clone(),
            chunk_index: Some(chunk.chunk_index),
            total_chunks: Some(chunk.total_chunks),
            document_id: Some(chunk.document_id),
            extra: request.extra.clone(),
        };

        // Step 7: upsert, degrading to the pending queue on transport
        // failure.
        if let Err(err) = self
            .store
            .upsert(request.collection.name(), vec![point.clone()])
            .await
        {
            if err.is_recoverable() {
                self.queue
                    .enqueue(QueuedCapture::from_point(request.collection, point))
                    .await?;
                return Ok(ChunkOutcome::Queued(format!("upsert deferred: {err}")));
            }
            return Err(err);
        }

        // Step 8: fire-and-forget classification.
        if let Some(queue) = &self.classification {
            queue.enqueue(ClassificationTask {
                point_id: point.id,
                content: point.content.clone(),
                collection: request.collection,
                group_id: request.group_id.clone(),
                content_hash: content_hash.to_string(),
            });
        }

        Ok(ChunkOutcome::Stored(point.id))
    }

    async fn enqueue(
        &self,
        request: &CaptureRequest,
        content_hash: &str,
        reason: &str,
    ) -> Result<CaptureOutcome> {
        let point = MemoryPoint {
            id: Uuid::new_v4(),
            vector: vec![0.0; self.embedding.dimension()],
            content: request.content.clone(),
            content_hash: content_hash.to_string(),
            memory_type: request.memory_type,
            group_id: request.group_id.clone(),
            stored_at: Utc::now(),
            is_current: true,
            source_hook: request.source_hook.clone(),
            file_path: request.file_path.clone(),
            embedding_status: EmbeddingStatus::Pending,
            logical_identity: request.logical_identity.clone(),
            chunk_index: None,
            total_chunks: None,
            document_id: None,
            extra: request.extra.clone(),
        };
        self.queue
            .enqueue(QueuedCapture::from_point(request.collection, point))
            .await?;
        Ok(CaptureOutcome::Queued {
            reason: reason.to_string(),
        })
    }
}

enum ChunkOutcome {
    Stored(Uuid),
    Duplicate(Uuid),
    Queued(String),
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{FixedEmbeddingClient, InMemoryVectorStore};

    fn request(content: &str, group: &str) -> CaptureRequest {
        CaptureRequest {
            content: content.to_string(),
            collection: Collection::CodePatterns,
            memory_type: MemoryType::Implementation,
            group_id: GroupId(group.to_string()),
            source_hook: "post_tool_use".into(),
            logical_identity: None,
            file_path: None,
            extra: Default::default(),
            case_sensitive: true,
        }
    }

    fn engine() -> CaptureEngine {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let embedding: Arc<dyn EmbeddingClient> = Arc::new(FixedEmbeddingClient::new(4));
        let queue = Arc::new(PendingQueue::in_memory());
        CaptureEngine::new(store, embedding, queue, None, Config::default(), Arc::new(Metrics::new()))
    }

    #[tokio::test]
    async fn duplicate_content_is_suppressed() {
        let engine = engine();
        let first = engine.store(request("same text", "proj-a")).await.unwrap();
        assert!(matches!(first, CaptureOutcome::Stored { .. }));
        let second = engine.store(request("same text", "proj-a")).await.unwrap();
        assert!(matches!(second, CaptureOutcome::Duplicate { .. }));
    }

    #[tokio::test]
    async fn distinct_content_is_stored_separately() {
        let engine = engine();
        engine.store(request("alpha", "proj-a")).await.unwrap();
        let second = engine.store(request("beta", "proj-a")).await.unwrap();
        assert!(matches!(second, CaptureOutcome::Stored { .. }));
    }

    #[tokio::test]
    async fn rejects_type_outside_collection_taxonomy() {
        let engine = engine();
        let mut req = request("x", "proj-a");
        req.memory_type = MemoryType::Rule;
        let err = engine.store(req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn version_supersession_keeps_one_current_point() {
        let engine = engine();
        let mut v1 = request("version one", "proj-a");
        v1.logical_identity = Some("x.py".to_string());
        v1.file_path = Some("x.py".to_string());
        engine.store(v1).await.unwrap();

        let mut v2 = request("version two", "proj-a");
        v2.logical_identity = Some("x.py".to_string());
        v2.file_path = Some("x.py".to_string());
        let outcome = engine.store(v2).await.unwrap();
        assert!(matches!(outcome, CaptureOutcome::Stored { .. }));
    }
}
