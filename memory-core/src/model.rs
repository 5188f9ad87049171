//! The three-collection data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Tenant key. `"shared"` for the `conventions` collection; the
/// per-project identifier derived from `cwd` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// The single shared tenant used by the `conventions` collection.
    pub const SHARED: &'static str = "shared";

    /// The cross-project tenant.
    #[must_use]
    pub fn shared() -> Self {
        GroupId(Self::SHARED.to_string())
    }

    /// Whether this is the shared cross-project tenant.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.0 == Self::SHARED
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the three fixed collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    /// HOW things are built. Per-project.
    CodePatterns,
    /// WHAT rules apply. Cross-project, single shared tenant.
    Conventions,
    /// WHY things were decided / session continuity. Per-project.
    Discussions,
}

impl Collection {
    /// The literal name used for this collection in the vector store.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Collection::CodePatterns => "code-patterns",
            Collection::Conventions => "conventions",
            Collection::Discussions => "discussions",
        }
    }

    /// Whether this collection is tenant-isolated per project (`true`) or
    /// shared across all projects (`false`).
    #[must_use]
    pub fn is_per_project(self) -> bool {
        !matches!(self, Collection::Conventions)
    }

    /// The closed set of [`MemoryType`] values this collection accepts.
    #[must_use]
    pub fn permitted_types(self) -> &'static [MemoryType] {
        use MemoryType::*;
        match self {
            Collection::CodePatterns => &[Implementation, ErrorFix, Refactor, FilePattern],
            Collection::Conventions => &[Rule, Guideline, Port, Naming, Structure],
            Collection::Discussions => &[
                Decision,
                Session,
                Blocker,
                Preference,
                Context,
                AgentHandoff,
                AgentInsight,
                AgentTask,
            ],
        }
    }

    /// All three collections, in a fixed order used for cascading search.
    #[must_use]
    pub fn all() -> [Collection; 3] {
        [
            Collection::CodePatterns,
            Collection::Conventions,
            Collection::Discussions,
        ]
    }
}

/// Closed taxonomy of memory types across all three collections.
/// Writers must reject a type not permitted for the target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// `code-patterns`
    Implementation,
    /// `code-patterns`
    ErrorFix,
    /// `code-patterns`
    Refactor,
    /// `code-patterns`
    FilePattern,
    /// `conventions`
    Rule,
    /// `conventions`
    Guideline,
    /// `conventions`
    Port,
    /// `conventions`
    Naming,
    /// `conventions`
    Structure,
    /// `discussions`
    Decision,
    /// `discussions`
    Session,
    /// `discussions`
    Blocker,
    /// `discussions`
    Preference,
    /// `discussions`; conservative default used before classification
    /// completes.
    Context,
    /// `discussions`
    AgentHandoff,
    /// `discussions`
    AgentInsight,
    /// `discussions`
    AgentTask,
}

impl MemoryType {
    /// The `snake_case` name used for this type in hashing, filters, and
    /// the regex classifier's rule table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryType::Implementation => "implementation",
            MemoryType::ErrorFix => "error_fix",
            MemoryType::Refactor => "refactor",
            MemoryType::FilePattern => "file_pattern",
            MemoryType::Rule => "rule",
            MemoryType::Guideline => "guideline",
            MemoryType::Port => "port",
            MemoryType::Naming => "naming",
            MemoryType::Structure => "structure",
            MemoryType::Decision => "decision",
            MemoryType::Session => "session",
            MemoryType::Blocker => "blocker",
            MemoryType::Preference => "preference",
            MemoryType::Context => "context",
            MemoryType::AgentHandoff => "agent_handoff",
            MemoryType::AgentInsight => "agent_insight",
            MemoryType::AgentTask => "agent_task",
        }
    }

    /// Typical recency half-life for temporal decay, absent a config
    /// override.
    #[must_use]
    pub fn default_half_life_days(self) -> f64 {
        match self {
            MemoryType::Session | MemoryType::AgentHandoff => 21.0,
            MemoryType::Implementation
            | MemoryType::ErrorFix
            | MemoryType::Refactor
            | MemoryType::FilePattern => 14.0,
            MemoryType::Decision | MemoryType::Blocker | MemoryType::AgentTask => 30.0,
            MemoryType::Rule | MemoryType::Guideline | MemoryType::Structure => 60.0,
            MemoryType::Port | MemoryType::Naming => 45.0,
            MemoryType::Preference | MemoryType::Context | MemoryType::AgentInsight => 30.0,
        }
    }
}

/// Whether a point's vector is ready for similarity search or is a zero
/// placeholder awaiting background backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    /// The vector is the real embedding of `content`.
    Ready,
    /// The vector is a zero placeholder; backfill is outstanding.
    Pending,
}

/// One point in a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPoint {
    /// Opaque identifier.
    pub id: Uuid,
    /// Fixed-dimension dense vector, normalized. Zero-filled while
    /// `embedding_status == Pending`.
    pub vector: Vec<f32>,
    /// The textual payload.
    pub content: String,
    /// Deterministic hash over normalized content + salient metadata.
    pub content_hash: String,
    /// One of the collection's permitted types.
    pub memory_type: MemoryType,
    /// Tenant key.
    pub group_id: GroupId,
    /// When this point was stored.
    pub stored_at: DateTime<Utc>,
    /// Versioning flag: at most one current point per logical identity.
    pub is_current: bool,
    /// The event kind that produced this memory.
    pub source_hook: String,
    /// Required for patterns eligible for freshness evaluation.
    pub file_path: Option<String>,
    /// Whether `vector` is a real embedding or a placeholder.
    pub embedding_status: EmbeddingStatus,
    /// Logical identity key (e.g. a file path or issue key) used for
    /// versioning supersession. `None` means this point is never
    /// superseded by content with the same key.
    pub logical_identity: Option<String>,
    /// Chunk position within a multi-chunk document, if chunked.
    pub chunk_index: Option<u32>,
    /// Total chunk count of the document this point belongs to.
    pub total_chunks: Option<u32>,
    /// Stable id shared by every chunk of the same source document.
    pub document_id: Option<Uuid>,
    /// Arbitrary type-specific fields (`error_signature`, `labels`,
    /// `github_updated_at`, `agent_id`, ...).
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl MemoryPoint {
    /// Validate that `memory_type` is permitted in `collection` and that
    /// `group_id` is consistent with the collection's tenancy rule
    /// (invariants 1 and 2). Called at every write boundary.
    pub fn validate_for(&self, collection: Collection) -> Result<()> {
        if !collection.permitted_types().contains(&self.memory_type) {
            return Err(Error::InvalidInput(format!(
                "type {:?} is not permitted in collection {}",
                self.memory_type,
                collection.name()
            )));
        }
        if !collection.is_per_project() && !self.group_id.is_shared() {
            return Err(Error::InvalidInput(format!(
                "collection {} requires group_id == \"shared\"",
                collection.name()
            )));
        }
        if self.group_id.0.trim().is_empty() {
            return Err(Error::InvalidInput("group_id must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_point(memory_type: MemoryType, group: &str) -> MemoryPoint {
        MemoryPoint {
            id: Uuid::new_v4(),
            vector: vec![0.0; 4],
            content: "content".into(),
            content_hash: "hash".into(),
            memory_type,
            group_id: GroupId(group.to_string()),
            stored_at: Utc::now(),
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

    #[test]
    fn rejects_type_not_in_collection_taxonomy() {
        let point = base_point(MemoryType::Rule, "proj-a");
        let err = point.validate_for(Collection::CodePatterns).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn accepts_matching_type_and_tenancy() {
        let point = base_point(MemoryType::Implementation, "proj-a");
        assert!(point.validate_for(Collection::CodePatterns).is_ok());
    }

    #[test]
    fn conventions_requires_shared_group() {
        let point = base_point(MemoryType::Rule, "proj-a");
        let err = point.validate_for(Collection::Conventions).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let shared = base_point(MemoryType::Rule, GroupId::SHARED);
        assert!(shared.validate_for(Collection::Conventions).is_ok());
    }

    #[test]
    fn empty_group_id_is_rejected() {
        let point = base_point(MemoryType::Implementation, "");
        assert!(point.validate_for(Collection::CodePatterns).is_err());
    }
}
