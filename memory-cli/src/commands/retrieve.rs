use clap::Args;
use memory_core::model::GroupId;
use memory_core::retrieval::{RetrievalEngine, RetrievalRequest};
use serde::Serialize;

use super::capture::CollectionArg;
use crate::output::{Output, OutputFormat};

#[derive(Args)]
pub struct RetrieveArgs {
    /// Natural-language query.
    pub query: String,

    /// Restrict to one collection; otherwise derived from intent.
    #[arg(long, value_enum)]
    pub collection: Option<CollectionArg>,

    /// Maximum results.
    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResult {
    pub hits: Vec<Hit>,
    pub assembled: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Hit {
    pub id: String,
    pub collection: String,
    pub memory_type: String,
    pub semantic: f32,
    pub temporal: f64,
    pub final_score: f64,
    pub content: String,
}

impl Output for RetrieveResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        if self.hits.is_empty() {
            writeln!(writer, "no results")?;
            return Ok(());
        }
        for hit in &self.hits {
            writeln!(
                writer,
                "[{:.3}] {} / {} ({})\n    {}",
                hit.final_score, hit.collection, hit.memory_type, hit.id, hit.content
            )?;
        }
        Ok(())
    }
}

pub async fn run(
    args: RetrieveArgs,
    engine: &RetrievalEngine,
    group_id: &GroupId,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let request = RetrievalRequest {
        query: args.query,
        collection: args.collection.map(Into::into),
        memory_type: None,
        intent: None,
        limit: args.limit,
        group_id: group_id.clone(),
    };

    let ranked = engine
        .retrieve(&request)
        .await
        .map_err(|e| anyhow::anyhow!("retrieval failed: {e}"))?;
    let assembled = engine.assemble(&ranked);

    let hits = ranked
        .into_iter()
        .map(|r| Hit {
            id: r.point.id.to_string(),
            collection: r.collection.name().to_string(),
            memory_type: r.point.memory_type.as_str().to_string(),
            semantic: r.semantic,
            temporal: r.temporal,
            final_score: r.final_score,
            content: r.point.content,
        })
        .collect();

    format.print(&RetrieveResult { hits, assembled })
}
