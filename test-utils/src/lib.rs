//! Test doubles shared across the workspace's test suites: an in-memory
//! [`VectorStore`] and a scripted [`EmbeddingClient`], plus small fixture
//! builders. Used only behind `[dev-dependencies]` — never shipped.

use async_trait::async_trait;
use memory_core::error::{Error, Result};
use memory_core::model::MemoryPoint;
use memory_core::vector_store::{CollectionInfo, Filter, FilterTerm, ScoredPoint, VectorStore};
use parking_lot::Mutex;
use std::collections::HashMap;

/// An in-process, non-persistent [`VectorStore`] backing every unit and
/// integration test in the workspace. Supports the same filter/search
/// semantics real implementations must, including rejecting a
/// [`Filter`] missing `group_id`.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: Mutex<HashMap<String, Vec<MemoryPoint>>>,
}

impl InMemoryVectorStore {
    /// An empty store with no collections created yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(point: &MemoryPoint, filter: &Filter) -> bool {
        let value = serde_json::to_value(point).unwrap_or(serde_json::Value::Null);
        filter.terms().iter().all(|term| match term {
            FilterTerm::Eq(field, expected) => value.get(field) == Some(expected),
            FilterTerm::Lte(field, expected) => compare(&value, field, expected) != Some(std::cmp::Ordering::Greater),
            FilterTerm::Gte(field, expected) => compare(&value, field, expected) != Some(std::cmp::Ordering::Less),
        })
    }
}

fn compare(value: &serde_json::Value, field: &str, expected: &serde_json::Value) -> Option<std::cmp::Ordering> {
    let actual = value.get(field)?;
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => actual.as_str()?.partial_cmp(expected.as_str()?),
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str, _dim: usize, _payload_indexes: &[&str]) -> Result<()> {
        self.collections.lock().entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<MemoryPoint>) -> Result<()> {
        let mut collections = self.collections.lock();
        let existing = collections.entry(name.to_string()).or_default();
        for point in points {
            if let Some(slot) = existing.iter_mut().find(|p| p.id == point.id) {
                *slot = point;
            } else {
                existing.push(point);
            }
        }
        Ok(())
    }

    async fn scroll(&self, name: &str, filter: &Filter, limit: usize, offset: usize) -> Result<Vec<MemoryPoint>> {
        if !filter.has_group_id() {
            return Err(Error::InvalidInput("filter missing group_id".into()));
        }
        let collections = self.collections.lock();
        let Some(points) = collections.get(name) else {
            return Ok(Vec::new());
        };
        Ok(points
            .iter()
            .filter(|p| Self::matches(p, filter))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search(&self, name: &str, vector: &[f32], filter: &Filter, limit: usize) -> Result<Vec<ScoredPoint>> {
        if !filter.has_group_id() {
            return Err(Error::InvalidInput("filter missing group_id".into()));
        }
        let collections = self.collections.lock();
        let Some(points) = collections.get(name) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<ScoredPoint> = points
            .iter()
            .filter(|p| Self::matches(p, filter))
            .map(|p| ScoredPoint {
                point: p.clone(),
                score: cosine(vector, &p.vector),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete(&self, name: &str, ids: &[uuid::Uuid]) -> Result<()> {
        if let Some(points) = self.collections.lock().get_mut(name) {
            points.retain(|p| !ids.contains(&p.id));
        }
        Ok(())
    }

    async fn count(&self, name: &str, filter: &Filter) -> Result<u64> {
        if !filter.has_group_id() {
            return Err(Error::InvalidInput("filter missing group_id".into()));
        }
        let collections = self.collections.lock();
        let count = collections
            .get(name)
            .map(|points| points.iter().filter(|p| Self::matches(p, filter)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn get_collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.lock();
        Ok(collections.get(name).map(|points| CollectionInfo {
            dimension: points.first().map_or(4, |p| p.vector.len()),
            points_count: points.len() as u64,
        }))
    }
}

/// A [`VectorStore`] whose every mutating call fails with
/// [`Error::TransportUnavailable`], for exercising queue/backoff paths.
pub struct AlwaysFailingVectorStore;

#[async_trait]
impl VectorStore for AlwaysFailingVectorStore {
    async fn ensure_collection(&self, _name: &str, _dim: usize, _payload_indexes: &[&str]) -> Result<()> {
        Err(Error::TransportUnavailable("always failing".into()))
    }

    async fn upsert(&self, _name: &str, _points: Vec<MemoryPoint>) -> Result<()> {
        Err(Error::TransportUnavailable("always failing".into()))
    }

    async fn scroll(&self, _name: &str, _filter: &Filter, _limit: usize, _offset: usize) -> Result<Vec<MemoryPoint>> {
        Err(Error::TransportUnavailable("always failing".into()))
    }

    async fn search(&self, _name: &str, _vector: &[f32], _filter: &Filter, _limit: usize) -> Result<Vec<ScoredPoint>> {
        Err(Error::TransportUnavailable("always failing".into()))
    }

    async fn delete(&self, _name: &str, _ids: &[uuid::Uuid]) -> Result<()> {
        Err(Error::TransportUnavailable("always failing".into()))
    }

    async fn count(&self, _name: &str, _filter: &Filter) -> Result<u64> {
        Err(Error::TransportUnavailable("always failing".into()))
    }

    async fn get_collection_info(&self, _name: &str) -> Result<Option<CollectionInfo>> {
        Err(Error::TransportUnavailable("always failing".into()))
    }
}

/// An [`EmbeddingClient`] that returns a deterministic vector derived
/// from each input's length, so tests can assert distinct inputs embed to
/// distinct (but stable) vectors without a real model.
pub struct FixedEmbeddingClient {
    dimension: usize,
}

impl FixedEmbeddingClient {
    /// Build a client producing `dimension`-length vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl memory_core::embedding::EmbeddingClient for FixedEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| deterministic_vector(t, self.dimension)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

fn deterministic_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut seed: u32 = 2166136261;
    for byte in text.bytes() {
        seed ^= u32::from(byte);
        seed = seed.wrapping_mul(16777619);
    }
    (0..dimension)
        .map(|i| {
            let bit = (seed.rotate_left(i as u32 * 7) % 1000) as f32 / 1000.0;
            bit - 0.5
        })
        .collect()
}

/// An [`EmbeddingClient`] whose `embed_one`/`embed` calls always fail,
/// for exercising the degraded-mode paths.
pub struct AlwaysFailingEmbeddingClient {
    dimension: usize,
}

impl AlwaysFailingEmbeddingClient {
    /// Build a client reporting `dimension` but never producing vectors.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl memory_core::embedding::EmbeddingClient for AlwaysFailingEmbeddingClient {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::EmbeddingUnavailable("always failing".into()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn is_healthy(&self) -> bool {
        false
    }
}
