//! Purge/Audit: age-based deletion with a dry-run default, plus
//! append-only audit logs for purge and kill-switch operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use crate::error::Result;
use crate::model::{Collection, GroupId};
use crate::vector_store::{Filter, VectorStore};

/// One purge request.
#[derive(Debug, Clone)]
pub struct PurgeRequest {
    /// Delete points with `stored_at` at or before this instant.
    pub older_than: DateTime<Utc>,
    /// Restrict to one collection; `None` means all three.
    pub collection: Option<Collection>,
    /// Tenant key to scope the purge to.
    pub group_id: GroupId,
    /// Must be `true` to actually delete; otherwise this is a dry run
    /// that only reports what would be deleted.
    pub confirm: bool,
}

/// Result of one purge call: per-collection counts, confirmed or
/// dry-run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeReport {
    pub per_collection: BTreeMap<String, u64>,
    pub confirmed: bool,
}

impl PurgeReport {
    /// Total points affected (deleted, or would-be-deleted in dry run).
    #[must_use]
    pub fn total(&self) -> u64 {
        self.per_collection.values().sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PurgeLogLine {
    at: DateTime<Utc>,
    cutoff: DateTime<Utc>,
    group_id: String,
    scope: String,
    per_collection: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KillSwitchLogLine {
    at: DateTime<Utc>,
    flag: String,
    enabled: bool,
}

/// Purge/audit orchestrator.
pub struct AuditEngine {
    store: Arc<dyn VectorStore>,
    purge_log_path: PathBuf,
    kill_switch_log_path: PathBuf,
}

impl AuditEngine {
    /// Open the engine rooted at `data_root/audit/`, creating the
    /// directory if needed.
    pub fn open(store: Arc<dyn VectorStore>, data_root: &Path) -> Result<Self> {
        let audit_dir = data_root.join("audit");
        std::fs::create_dir_all(&audit_dir)?;
        Ok(Self {
            store,
            purge_log_path: audit_dir.join("purge-log.jsonl"),
            kill_switch_log_path: audit_dir.join("kill-switch-log.jsonl"),
        })
    }

    /// Run a purge: always computes the affected counts; deletes only
    /// when `request.confirm` is `true`. A dry run (`confirm=false`)
    /// never mutates the store or appends to the audit log.
    pub async fn purge(&self, request: &PurgeRequest) -> Result<PurgeReport> {
        let collections: Vec<Collection> = match request.collection {
            Some(c) => vec![c],
            None => Collection::all().to_vec(),
        };

        let mut report = PurgeReport {
            per_collection: BTreeMap::new(),
            confirmed: request.confirm,
        };

        for collection in collections {
            let tenant = if collection.is_per_project() {
                request.group_id.0.clone()
            } else {
                GroupId::SHARED.to_string()
            };
            let filter = Filter::for_group(tenant).lte("stored_at", request.older_than.to_rfc3339());
            let matches = self.store.scroll(collection.name(), &filter, 100_000, 0).await?;
            report.per_collection.insert(collection.name().to_string(), matches.len() as u64);

            if request.confirm && !matches.is_empty() {
                let ids: Vec<_> = matches.iter().map(|p| p.id).collect();
                self.store.delete(collection.name(), &ids).await?;
            }
        }

        if request.confirm {
            self.append_purge_log(request, &report).await?;
        }

        Ok(report)
    }

    async fn append_purge_log(&self, request: &PurgeRequest, report: &PurgeReport) -> Result<()> {
        let scope = request
            .collection
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "all".to_string());
        let line = PurgeLogLine {
            at: Utc::now(),
            cutoff: request.older_than,
            group_id: request.group_id.0.clone(),
            scope,
            per_collection: report.per_collection.clone(),
        };
        append_line(&self.purge_log_path, &line).await
    }

    /// Record a kill-switch toggle to the audit log. Does not itself
    /// change any config value — callers own applying the flag.
    pub async fn record_kill_switch(&self, flag: &str, enabled: bool) -> Result<()> {
        let line = KillSwitchLogLine {
            at: Utc::now(),
            flag: flag.to_string(),
            enabled,
        };
        append_line(&self.kill_switch_log_path, &line).await
    }
}

async fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EmbeddingStatus, MemoryPoint, MemoryType};
    use test_utils::InMemoryVectorStore;
    use uuid::Uuid;

    fn point(days_old: i64) -> MemoryPoint {
        MemoryPoint {
            id: Uuid::new_v4(),
            vector: vec![0.0; 4],
            content: "old content".into(),
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
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .upsert(Collection::CodePatterns.name(), vec![point(400)])
            .await
            .unwrap();
        let engine = AuditEngine::open(store.clone(), dir.path()).unwrap();

        let request = PurgeRequest {
            older_than: Utc::now(),
            collection: Some(Collection::CodePatterns),
            group_id: GroupId("proj-a".into()),
            confirm: false,
        };
        let report = engine.purge(&request).await.unwrap();
        assert_eq!(report.total(), 1);

        let filter = Filter::for_group("proj-a".to_string());
        let remaining = store.scroll(Collection::CodePatterns.name(), &filter, 10, 0).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn confirmed_purge_deletes_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        store
            .upsert(Collection::CodePatterns.name(), vec![point(400)])
            .await
            .unwrap();
        let engine = AuditEngine::open(store.clone(), dir.path()).unwrap();

        let request = PurgeRequest {
            older_than: Utc::now(),
            collection: Some(Collection::CodePatterns),
            group_id: GroupId("proj-a".into()),
            confirm: true,
        };
        let report = engine.purge(&request).await.unwrap();
        assert_eq!(report.total(), 1);

        let filter = Filter::for_group("proj-a".to_string());
        let remaining = store.scroll(Collection::CodePatterns.name(), &filter, 10, 0).await.unwrap();
        assert!(remaining.is_empty());

        let log_content = std::fs::read_to_string(dir.path().join("audit/purge-log.jsonl")).unwrap();
        assert_eq!(log_content.lines().count(), 1);
    }

    #[tokio::test]
    async fn kill_switch_toggle_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryVectorStore::new());
        let engine = AuditEngine::open(store, dir.path()).unwrap();
        engine.record_kill_switch("auto_update_enabled", true).await.unwrap();
        let log_content = std::fs::read_to_string(dir.path().join("audit/kill-switch-log.jsonl")).unwrap();
        assert!(log_content.contains("auto_update_enabled"));
    }
}
