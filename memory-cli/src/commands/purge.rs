use chrono::{DateTime, Utc};
use clap::Args;
use memory_core::audit::{AuditEngine, PurgeRequest};
use memory_core::model::GroupId;
use serde::Serialize;

use super::capture::CollectionArg;
use crate::output::{Output, OutputFormat};

#[derive(Args)]
pub struct PurgeArgs {
    /// Delete points stored at or before this RFC 3339 instant.
    #[arg(long)]
    pub older_than: String,

    /// Restrict to one collection; otherwise purges all three.
    #[arg(long, value_enum)]
    pub collection: Option<CollectionArg>,

    /// Actually delete. Without this flag the purge is a dry run that
    /// only reports counts.
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Debug, Serialize)]
pub struct PurgeResultView {
    pub confirmed: bool,
    pub total: u64,
    pub per_collection: std::collections::BTreeMap<String, u64>,
}

impl Output for PurgeResultView {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        let verb = if self.confirmed { "deleted" } else { "would delete" };
        writeln!(writer, "{verb} {} point(s)", self.total)?;
        for (collection, count) in &self.per_collection {
            writeln!(writer, "  {collection}: {count}")?;
        }
        if !self.confirmed {
            writeln!(writer, "(dry run; pass --confirm to actually delete)")?;
        }
        Ok(())
    }
}

pub async fn run(args: PurgeArgs, engine: &AuditEngine, group_id: &GroupId, format: OutputFormat) -> anyhow::Result<()> {
    let older_than: DateTime<Utc> = args
        .older_than
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid --older-than (expected RFC 3339): {e}"))?;
    let request = PurgeRequest {
        older_than,
        collection: args.collection.map(Into::into),
        group_id: group_id.clone(),
        confirm: args.confirm,
    };
    let report = engine
        .purge(&request)
        .await
        .map_err(|e| anyhow::anyhow!("purge failed: {e}"))?;

    format.print(&PurgeResultView {
        confirmed: report.confirmed,
        total: report.total(),
        per_collection: report.per_collection,
    })
}
