//! Freshness Engine: tiers project-scoped patterns by drift relative
//! to an external ground-truth provider.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::model::{Collection, GroupId, MemoryPoint};
use crate::vector_store::{Filter, VectorStore};

/// Current fingerprint and recent activity for one file path, as reported
/// by an external source-control collaborator.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    /// The file's current content fingerprint.
    pub fingerprint: String,
    /// Commits touching this path since the memory's `stored_at`.
    pub commits_since_stored: u32,
}

/// External collaborator resolving ground truth for a set of file
/// paths. Implemented outside this crate (e.g. a git log reader); this
/// crate only depends on the trait.
#[async_trait]
pub trait GroundTruthProvider: Send + Sync {
    /// Resolve ground truth for `paths`, if known. Paths with no entry in
    /// the map are reported as [`Tier::Unknown`].
    async fn resolve(&self, paths: &[String]) -> Result<HashMap<String, GroundTruth>>;
}

/// Freshness tier for one (file_path, memory) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Fingerprint matches and drift is within `FRESH_COMMITS`.
    Fresh,
    /// Fingerprint matches; drift is between the two thresholds.
    Aging,
    /// Fingerprint matches but drift exceeds `STALE_COMMITS`.
    Stale,
    /// Fingerprint differs from the stored memory's content hash.
    Expired,
    /// The ground-truth provider had no data for this path.
    Unknown,
}

/// One scored pattern in the freshness report.
#[derive(Debug, Clone)]
pub struct FreshnessEntry {
    pub point: MemoryPoint,
    pub tier: Tier,
}

/// Aggregate freshness scan result: counts plus an actionable list
/// ordered worst-first.
#[derive(Debug, Clone, Default)]
pub struct FreshnessReport {
    pub fresh: usize,
    pub aging: usize,
    pub stale: usize,
    pub expired: usize,
    pub unknown: usize,
    /// Entries needing attention, ordered `expired > stale > aging`.
    pub actionable: Vec<FreshnessEntry>,
}

/// Scans file-backed patterns for one project and classifies their
/// freshness tier.
pub struct FreshnessEngine {
    store: Arc<dyn VectorStore>,
    ground_truth: Arc<dyn GroundTruthProvider>,
    config: Config,
}

impl FreshnessEngine {
    /// Build the engine from its collaborators.
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, ground_truth: Arc<dyn GroundTruthProvider>, config: Config) -> Self {
        Self {
            store,
            ground_truth,
            config,
        }
    }

    /// Scan every `code-patterns` point with a `file_path` under
    /// `group_id`, classify it, and return the aggregate report. If the
    /// `FRESHNESS_ENABLED` flag is off, returns an empty report without
    /// touching the store.
    pub async fn scan(&self, group_id: &GroupId) -> Result<FreshnessReport> {
        let mut report = FreshnessReport::default();
        if !self.config.features.freshness_enabled {
            return Ok(report);
        }

        let filter = Filter::for_group(group_id.0.clone()).eq("is_current", true);
        let points = self.store.scroll(Collection::CodePatterns.name(), &filter, 10_000, 0).await?;
        let with_path: Vec<MemoryPoint> = points.into_iter().filter(|p| p.file_path.is_some()).collect();
        if with_path.is_empty() {
            return Ok(report);
        }

        let paths: Vec<String> = with_path
            .iter()
            .filter_map(|p| p.file_path.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        let truth = self.ground_truth.resolve(&paths).await?;

        for point in with_path {
            let tier = self.classify(&point, &truth);
            match tier {
                Tier::Fresh => report.fresh += 1,
                Tier::Aging => report.aging += 1,
                Tier::Stale => report.stale += 1,
                Tier::Expired => report.expired += 1,
                Tier::Unknown => report.unknown += 1,
            }
            if matches!(tier, Tier::Expired | Tier::Stale | Tier::Aging) {
                report.actionable.push(FreshnessEntry { point, tier });
            }
        }

        report.actionable.sort_by_key(|entry| match entry.tier {
            Tier::Expired => 0,
            Tier::Stale => 1,
            Tier::Aging => 2,
            Tier::Fresh | Tier::Unknown => 3,
        });

        Ok(report)
    }

    fn classify(&self, point: &MemoryPoint, truth: &HashMap<String, GroundTruth>) -> Tier {
        let Some(path) = &point.file_path else {
            return Tier::Unknown;
        };
        let Some(info) = truth.get(path) else {
            return Tier::Unknown;
        };
        if info.fingerprint != point.content_hash {
            return Tier::Expired;
        }
        if info.commits_since_stored <= self.config.fresh_commits {
            Tier::Fresh
        } else if info.commits_since_stored <= self.config.stale_commits {
            Tier::Aging
        } else {
            Tier::Stale
        }
    }

    /// Enqueue expired entries for re-capture, honoring the
    /// `AUTO_UPDATE_ENABLED` kill switch — a no-op when the flag is off.
    #[must_use]
    pub fn expired_for_auto_update<'a>(&self, report: &'a FreshnessReport) -> Vec<&'a FreshnessEntry> {
        if !self.config.features.auto_update_enabled {
            return Vec::new();
        }
        report
            .actionable
            .iter()
            .filter(|entry| entry.tier == Tier::Expired)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EmbeddingStatus, MemoryType};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use test_utils::InMemoryVectorStore;
    use uuid::Uuid;

    struct StaticGroundTruth(HashMap<String, GroundTruth>);

    #[async_trait]
    impl GroundTruthProvider for StaticGroundTruth {
        async fn resolve(&self, paths: &[String]) -> Result<HashMap<String, GroundTruth>> {
            Ok(paths
                .iter()
                .filter_map(|p| self.0.get(p).map(|g| (p.clone(), g.clone())))
                .collect())
        }
    }

    fn pattern_point(path: &str, hash: &str) -> MemoryPoint {
        MemoryPoint {
            id: Uuid::new_v4(),
            vector: vec![0.0; 4],
            content: "body".into(),
            content_hash: hash.into(),
            memory_type: MemoryType::Implementation,
            group_id: GroupId("proj-a".into()),
            stored_at: Utc::now(),
            is_current: true,
            source_hook: "post_tool_use".into(),
            file_path: Some(path.to_string()),
            embedding_status: EmbeddingStatus::Ready,
            logical_identity: Some(path.to_string()),
            chunk_index: None,
            total_chunks: None,
            document_id: None,
            extra: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn fingerprint_mismatch_is_expired() {
        let store = Arc::new(InMemoryVectorStore::new());
        let point = pattern_point("x.py", "old-hash");
        store
            .upsert(Collection::CodePatterns.name(), vec![point])
            .await
            .unwrap();

        let mut truth = HashMap::new();
        truth.insert(
            "x.py".to_string(),
            GroundTruth {
                fingerprint: "new-hash".to_string(),
                commits_since_stored: 1,
            },
        );
        let engine = FreshnessEngine::new(store, Arc::new(StaticGroundTruth(truth)), Config::default());
        let report = engine.scan(&GroupId("proj-a".into())).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.actionable.len(), 1);
    }

    #[tokio::test]
    async fn matching_fingerprint_within_fresh_commits_is_fresh() {
        let store = Arc::new(InMemoryVectorStore::new());
        let point = pattern_point("y.py", "same-hash");
        store
            .upsert(Collection::CodePatterns.name(), vec![point])
            .await
            .unwrap();

        let mut truth = HashMap::new();
        truth.insert(
            "y.py".to_string(),
            GroundTruth {
                fingerprint: "same-hash".to_string(),
                commits_since_stored: 1,
            },
        );
        let engine = FreshnessEngine::new(store, Arc::new(StaticGroundTruth(truth)), Config::default());
        let report = engine.scan(&GroupId("proj-a".into())).await.unwrap();
        assert_eq!(report.fresh, 1);
        assert!(report.actionable.is_empty());
    }

    #[tokio::test]
    async fn missing_ground_truth_is_unknown() {
        let store = Arc::new(InMemoryVectorStore::new());
        let point = pattern_point("z.py", "hash");
        store
            .upsert(Collection::CodePatterns.name(), vec![point])
            .await
            .unwrap();

        let engine = FreshnessEngine::new(
            store,
            Arc::new(StaticGroundTruth(HashMap::new())),
            Config::default(),
        );
        let report = engine.scan(&GroupId("proj-a".into())).await.unwrap();
        assert_eq!(report.unknown, 1);
    }

    #[tokio::test]
    async fn disabled_feature_flag_short_circuits_scan() {
        let store = Arc::new(InMemoryVectorStore::new());
        let mut config = Config::default();
        config.features.freshness_enabled = false;
        let engine = FreshnessEngine::new(store, Arc::new(StaticGroundTruth(HashMap::new())), config);
        let report = engine.scan(&GroupId("proj-a".into())).await.unwrap();
        assert_eq!(report.fresh + report.aging + report.stale + report.expired + report.unknown, 0);
    }
}
