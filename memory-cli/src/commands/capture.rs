use clap::Args;
use memory_core::capture::{CaptureEngine, CaptureOutcome, CaptureRequest};
use memory_core::model::{Collection, GroupId, MemoryType};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

use crate::output::{Output, OutputFormat};

#[derive(Args)]
pub struct CaptureArgs {
    /// Content to store. Read from stdin if omitted.
    #[arg(short, long)]
    pub content: Option<String>,

    /// Target collection.
    #[arg(long, value_enum)]
    pub collection: CollectionArg,

    /// Target memory type; must be permitted in `collection`.
    #[arg(long)]
    pub r#type: String,

    /// File path, for patterns eligible for freshness tracking.
    #[arg(long)]
    pub file_path: Option<PathBuf>,

    /// Versioning key; a second capture with the same key supersedes the
    /// first.
    #[arg(long)]
    pub logical_identity: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CollectionArg {
    CodePatterns,
    Conventions,
    Discussions,
}

impl From<CollectionArg> for Collection {
    fn from(value: CollectionArg) -> Self {
        match value {
            CollectionArg::CodePatterns => Collection::CodePatterns,
            CollectionArg::Conventions => Collection::Conventions,
            CollectionArg::Discussions => Collection::Discussions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CaptureResult {
    pub outcome: String,
    pub detail: String,
}

impl Output for CaptureResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{}: {}", self.outcome, self.detail)?;
        Ok(())
    }
}

pub async fn run(
    args: CaptureArgs,
    engine: &CaptureEngine,
    group_id: &GroupId,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let content = match args.content {
        Some(c) => c,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let collection: Collection = args.collection.into();
    let memory_type = parse_memory_type(&args.r#type, collection)?;

    let request = CaptureRequest {
        content,
        collection,
        memory_type,
        group_id: group_id.clone(),
        source_hook: "cli".to_string(),
        logical_identity: args.logical_identity,
        file_path: args.file_path.map(|p| p.to_string_lossy().to_string()),
        extra: Default::default(),
        case_sensitive: collection == Collection::CodePatterns,
    };

    let result = match engine.store(request).await {
        Ok(CaptureOutcome::Stored { point_ids }) => CaptureResult {
            outcome: "stored".to_string(),
            detail: format!("{} point(s): {point_ids:?}", point_ids.len()),
        },
        Ok(CaptureOutcome::Duplicate { existing_id }) => CaptureResult {
            outcome: "duplicate".to_string(),
            detail: format!("already covered by {existing_id}"),
        },
        Ok(CaptureOutcome::Queued { reason }) => CaptureResult {
            outcome: "queued".to_string(),
            detail: reason,
        },
        Err(e) => return Err(anyhow::anyhow!("capture failed: {e}")),
    };

    format.print(&result)
}

fn parse_memory_type(raw: &str, collection: Collection) -> anyhow::Result<MemoryType> {
    collection
        .permitted_types()
        .iter()
        .copied()
        .find(|t| t.as_str() == raw)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "type '{raw}' is not permitted in collection '{}' (allowed: {})",
                collection.name(),
                collection
                    .permitted_types()
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })
}
