use clap::Args;
use memory_core::capture::CaptureRequest;
use memory_core::config::Config;
use memory_core::freshness::{FreshnessEngine, Tier};
use memory_core::metrics::Metrics;
use memory_core::model::{Collection, GroupId};
use memory_core::vector_store::VectorStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::ground_truth::GitGroundTruthProvider;
use crate::output::{Output, OutputFormat};

const CLASSIFICATION_DRAIN_BUDGET: Duration = Duration::from_millis(500);

#[derive(Args)]
pub struct FreshnessArgs {
    #[command(subcommand)]
    pub command: FreshnessCommand,
}

#[derive(clap::Subcommand)]
pub enum FreshnessCommand {
    /// Scan file-backed patterns and tier them by drift.
    Scan {
        /// Repository root to resolve git ground truth against.
        #[arg(long, default_value = ".")]
        repo_root: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct FreshnessResult {
    pub fresh: usize,
    pub aging: usize,
    pub stale: usize,
    pub expired: usize,
    pub unknown: usize,
    pub auto_recaptured: usize,
    pub actionable: Vec<ActionableEntry>,
}

#[derive(Debug, Serialize)]
pub struct ActionableEntry {
    pub tier: String,
    pub file_path: Option<String>,
    pub content_hash: String,
}

impl Output for FreshnessResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(
            writer,
            "fresh={} aging={} stale={} expired={} unknown={} auto_recaptured={}",
            self.fresh, self.aging, self.stale, self.expired, self.unknown, self.auto_recaptured
        )?;
        for entry in &self.actionable {
            writeln!(
                writer,
                "  {:<8} {}",
                entry.tier,
                entry.file_path.as_deref().unwrap_or("<unknown>")
            )?;
        }
        Ok(())
    }
}

pub async fn run(
    args: FreshnessArgs,
    store: Arc<dyn VectorStore>,
    config: Config,
    group_id: &GroupId,
    metrics: Arc<Metrics>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let FreshnessCommand::Scan { repo_root } = args.command;
    let ground_truth = Arc::new(GitGroundTruthProvider::new(repo_root.clone()));
    let engine = FreshnessEngine::new(store.clone(), ground_truth, config.clone());

    let report = engine
        .scan(group_id)
        .await
        .map_err(|e| anyhow::anyhow!("freshness scan failed: {e}"))?;

    let expired = engine.expired_for_auto_update(&report);
    let auto_recaptured = if expired.is_empty() {
        0
    } else {
        recapture_expired(&expired, store.clone(), &config, &repo_root, metrics).await?
    };

    let actionable = report
        .actionable
        .iter()
        .map(|entry| ActionableEntry {
            tier: tier_name(entry.tier).to_string(),
            file_path: entry.point.file_path.clone(),
            content_hash: entry.point.content_hash.clone(),
        })
        .collect();

    format.print(&FreshnessResult {
        fresh: report.fresh,
        aging: report.aging,
        stale: report.stale,
        expired: report.expired,
        unknown: report.unknown,
        auto_recaptured,
        actionable,
    })
}

/// Re-read each expired entry's file off disk and push it back through
/// the capture path, so its stored content hash and embedding catch up
/// with what is actually on disk. Entries whose file is gone or whose
/// `file_path` is missing are skipped rather than failing the whole
/// scan.
async fn recapture_expired(
    expired: &[&memory_core::freshness::FreshnessEntry],
    store: Arc<dyn VectorStore>,
    config: &Config,
    repo_root: &std::path::Path,
    metrics: Arc<Metrics>,
) -> anyhow::Result<usize> {
    let (capture_engine, mut results) = crate::build_capture_engine(config, store.clone(), metrics).await?;

    let mut recaptured = 0usize;
    for entry in expired {
        let Some(path) = &entry.point.file_path else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(repo_root.join(path)) else {
            continue;
        };
        let request = CaptureRequest {
            content,
            collection: Collection::CodePatterns,
            memory_type: entry.point.memory_type,
            group_id: entry.point.group_id.clone(),
            source_hook: "freshness_auto_update".to_string(),
            logical_identity: entry.point.logical_identity.clone(),
            file_path: Some(path.clone()),
            extra: entry.point.extra.clone(),
            case_sensitive: true,
        };
        if capture_engine.store(request).await.is_ok() {
            recaptured += 1;
        }
    }

    crate::drain_classification_results(store.as_ref(), &mut results, CLASSIFICATION_DRAIN_BUDGET).await;
    Ok(recaptured)
}

fn tier_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Fresh => "fresh",
        Tier::Aging => "aging",
        Tier::Stale => "stale",
        Tier::Expired => "expired",
        Tier::Unknown => "unknown",
    }
}
