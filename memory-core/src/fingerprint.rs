//! Fingerprinting and deduplication: content hashing for exact-match
//! idempotence, and a semantic near-duplicate check against the nearest
//! neighbors already in the store.

use crate::model::Collection;
use crate::vector_store::{Filter, ScoredPoint, VectorStore};

/// Normalize content for hashing: collapse runs of whitespace to a single
/// space and trim the ends. `lowercase` is type-configured — some memory
/// types (e.g. code snippets) are case-sensitive, others (prose) are not.
#[must_use]
pub fn normalize_content(content: &str, lowercase: bool) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if lowercase {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

/// Deterministic content hash: normalized content plus salient metadata
/// (collection, type, and the logical-identity key if any), hashed with
/// FNV-1a so the result is stable across processes and platforms (unlike
/// `std::collections::hash_map::DefaultHasher`, which is explicitly
/// unspecified across Rust versions).
#[must_use]
pub fn content_hash(
    collection: Collection,
    type_name: &str,
    logical_identity: Option<&str>,
    normalized_content: &str,
) -> String {
    let mut basis = String::with_capacity(normalized_content.len() + 64);
    basis.push_str(collection.name());
    basis.push('\u{1f}');
    basis.push_str(type_name);
    basis.push('\u{1f}');
    if let Some(key) = logical_identity {
        basis.push_str(key);
    }
    basis.push('\u{1f}');
    basis.push_str(normalized_content);

    format!("{:016x}", fnv1a(basis.as_bytes()))
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Result of the semantic near-duplicate check.
pub enum DedupOutcome {
    /// No existing point is close enough; the write should proceed.
    Unique,
    /// An existing point is a semantic duplicate.
    Duplicate {
        /// Id of the point that already covers this content.
        existing_id: uuid::Uuid,
        /// The cosine similarity that triggered suppression.
        score: f32,
    },
}

/// Run the near-duplicate search: top-`K` (K=3) nearest neighbors in the
/// same `(collection, group_id, type)` scope; a hit at or above
/// `threshold` is a semantic duplicate.
pub async fn check_near_duplicate(
    store: &dyn VectorStore,
    collection: Collection,
    group_id: &str,
    type_name: &str,
    candidate_vector: &[f32],
    threshold: f32,
) -> crate::error::Result<DedupOutcome> {
    const K: usize = 3;
    let filter = Filter::for_group(group_id.to_string()).eq("type", type_name);
    let hits: Vec<ScoredPoint> = store
        .search(collection.name(), candidate_vector, &filter, K)
        .await?;

    let best = hits
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score));

    match best {
        Some(hit) if hit.score >= threshold => Ok(DedupOutcome::Duplicate {
            existing_id: hit.point.id,
            score: hit.score,
        }),
        _ => Ok(DedupOutcome::Unique),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_content("  a   b\tc\n", false), "a b c");
    }

    #[test]
    fn normalize_lowercases_when_requested() {
        assert_eq!(normalize_content("FooBar", true), "foobar");
        assert_eq!(normalize_content("FooBar", false), "FooBar");
    }

    #[test]
    fn hash_is_deterministic() {
        let a = content_hash(Collection::CodePatterns, "implementation", None, "same content");
        let b = content_hash(Collection::CodePatterns, "implementation", None, "same content");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_differs_by_logical_identity() {
        let a = content_hash(Collection::CodePatterns, "implementation", Some("x.py"), "v1");
        let b = content_hash(Collection::CodePatterns, "implementation", Some("y.py"), "v1");
        assert_ne!(a, b);
    }

    #[test]
    fn hash_differs_by_collection() {
        let a = content_hash(Collection::CodePatterns, "implementation", None, "text");
        let b = content_hash(Collection::Discussions, "implementation", None, "text");
        assert_ne!(a, b);
    }
}
