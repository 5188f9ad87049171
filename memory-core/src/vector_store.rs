//! The [`VectorStore`] trait — the storage interface the rest of the
//! pipeline is built against. The concrete implementation (an
//! HNSW-backed remote store) lives in the sibling `memory-storage-qdrant`
//! crate; this crate only depends on the trait, so tests can swap in an
//! in-memory double without patching any global state.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::Result;
use crate::model::MemoryPoint;

/// A single equality or range term in a [`Filter`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterTerm {
    /// Field equals this JSON value exactly.
    Eq(String, Value),
    /// Field is strictly less than or equal to this value (numeric/date
    /// comparison, compared as RFC 3339 strings or numbers).
    Lte(String, Value),
    /// Field is strictly greater than or equal to this value.
    Gte(String, Value),
}

/// A conjunctive (AND-of-terms) filter. Every query against a
/// per-project or shared collection **must** carry a `group_id` equality
/// term. [`Filter::must_have_group_id`] enforces this at construction
/// so a missing tenant scope is caught in the type, not at review time.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    terms: Vec<FilterTerm>,
    has_group_id: bool,
}

impl Filter {
    /// Start a filter scoped to `group_id`. This is the only public way to
    /// begin building a [`Filter`]; there is deliberately no bare
    /// `Filter::new()` so that every call site is forced to supply the
    /// tenant term first.
    #[must_use]
    pub fn for_group(group_id: impl Into<String>) -> Self {
        let mut filter = Self::default();
        filter.terms.push(FilterTerm::Eq(
            "group_id".to_string(),
            Value::String(group_id.into()),
        ));
        filter.has_group_id = true;
        filter
    }

    /// Add an additional equality term.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push(FilterTerm::Eq(field.into(), value.into()));
        self
    }

    /// Add a `<=` term.
    #[must_use]
    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push(FilterTerm::Lte(field.into(), value.into()));
        self
    }

    /// Add a `>=` term.
    #[must_use]
    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.push(FilterTerm::Gte(field.into(), value.into()));
        self
    }

    /// The conjunctive terms, in insertion order.
    #[must_use]
    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    /// Whether this filter carries the mandatory `group_id` term.
    /// [`VectorStore`] implementations must check this and fail loudly
    /// (return [`crate::error::Error::InvalidInput`]) if it is false,
    /// rather than silently querying across tenants.
    #[must_use]
    pub fn has_group_id(&self) -> bool {
        self.has_group_id
    }

    /// Look up the first equality term for `field`, if any.
    #[must_use]
    pub fn eq_value(&self, field: &str) -> Option<&Value> {
        self.terms.iter().find_map(|term| match term {
            FilterTerm::Eq(name, value) if name == field => Some(value),
            _ => None,
        })
    }
}

/// One similarity-search hit: a point plus its raw cosine score. Per the
/// Open Question resolution in DESIGN.md, the store contributes only the
/// raw semantic score — decay-weighted re-ranking happens entirely in
/// `memory-core::retrieval`.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// The stored point.
    pub point: MemoryPoint,
    /// Cosine similarity in `[-1.0, 1.0]`, normally `[0.0, 1.0]` for
    /// normalized embeddings.
    pub score: f32,
}

/// Collection metadata returned by [`VectorStore::get_collection_info`].
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    /// Vector dimensionality configured for this collection.
    pub dimension: usize,
    /// Total point count, including non-current/historical versions.
    pub points_count: u64,
}

/// Typed wrapper over an HNSW-backed vector database.
///
/// Implementations must:
/// - create collections with payload indexes on `content_hash`,
///   `group_id`, `type`, `is_current`, and `file_path`;
/// - reject any [`Filter`] missing a `group_id` term with
///   [`crate::error::Error::InvalidInput`] rather than running it;
/// - distinguish connection failures
///   ([`crate::error::Error::TransportUnavailable`]) from validation
///   failures, and never retry on the latter.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `name` with `dim`-dimensional vectors and the given
    /// payload-indexed fields if it does not already exist. Idempotent on
    /// reopen.
    async fn ensure_collection(
        &self,
        name: &str,
        dim: usize,
        payload_indexes: &[&str],
    ) -> Result<()>;

    /// Insert or overwrite points by id.
    async fn upsert(&self, name: &str, points: Vec<MemoryPoint>) -> Result<()>;

    /// Paginated, filtered listing without ranking.
    async fn scroll(
        &self,
        name: &str,
        filter: &Filter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MemoryPoint>>;

    /// Similarity search with payload filtering.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// Delete points by id.
    async fn delete(&self, name: &str, ids: &[Uuid]) -> Result<()>;

    /// Count points matching `filter`.
    async fn count(&self, name: &str, filter: &Filter) -> Result<u64>;

    /// Collection metadata, if the collection exists.
    async fn get_collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Cheap liveness probe used by the operational-mode state machine's
    /// health-probe caching. Default implementation probes via
    /// `get_collection_info` on an arbitrary name; real implementations
    /// should use a dedicated health endpoint.
    async fn is_healthy(&self) -> bool {
        self.get_collection_info("code-patterns").await.is_ok()
    }
}

/// Extra type-specific payload fields, as a typed map for call sites that
/// build a [`MemoryPoint::extra`] value without going through
/// `serde_json::json!` directly.
pub type Extra = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_group_sets_has_group_id() {
        let filter = Filter::for_group("proj-a");
        assert!(filter.has_group_id());
        assert_eq!(
            filter.eq_value("group_id"),
            Some(&Value::String("proj-a".to_string()))
        );
    }

    #[test]
    fn additional_terms_compose() {
        let filter = Filter::for_group("proj-a")
            .eq("type", "rule")
            .eq("is_current", true);
        assert_eq!(filter.terms().len(), 3);
    }
}
