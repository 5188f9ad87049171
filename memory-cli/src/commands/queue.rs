use clap::Args;
use memory_core::config::Config;
use memory_core::metrics::Metrics;
use memory_core::queue::{self, PendingQueue};
use memory_core::vector_store::VectorStore;
use serde::Serialize;
use std::sync::Arc;

use crate::output::{Output, OutputFormat};

#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

#[derive(clap::Subcommand)]
pub enum QueueCommand {
    /// List entries still waiting to be delivered.
    List,
    /// List entries that exhausted their retry budget.
    Deadletter,
    /// Attempt delivery of every pending entry once.
    Replay,
    /// Drain the queue, optionally looping forever with backoff.
    Drain {
        /// Keep draining in a background loop instead of running once.
        #[arg(long = "loop")]
        loop_forever: bool,
    },
}

#[derive(Debug, Serialize)]
pub struct QueueListView {
    pub count: usize,
    pub entries: Vec<QueueEntryView>,
}

#[derive(Debug, Serialize)]
pub struct QueueEntryView {
    pub collection: String,
    pub content_hash: String,
    pub attempts: u32,
}

#[derive(Debug, Serialize)]
pub struct ReplayResultView {
    pub succeeded: usize,
    pub dead_lettered: usize,
}

impl Output for QueueListView {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{} entr{}", self.count, if self.count == 1 { "y" } else { "ies" })?;
        for entry in &self.entries {
            writeln!(writer, "  [{}] {} attempts={}", entry.collection, entry.content_hash, entry.attempts)?;
        }
        Ok(())
    }
}

impl Output for ReplayResultView {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "succeeded={} dead_lettered={}", self.succeeded, self.dead_lettered)?;
        Ok(())
    }
}

pub async fn run(
    args: QueueArgs,
    queue: Arc<PendingQueue>,
    store: Arc<dyn VectorStore>,
    config: &Config,
    metrics: Arc<Metrics>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match args.command {
        QueueCommand::List => {
            let entries = queue.pending().await.map_err(|e| anyhow::anyhow!("{e}"))?;
            format.print(&to_view(entries))
        }
        QueueCommand::Deadletter => {
            let entries = queue.deadletter().await.map_err(|e| anyhow::anyhow!("{e}"))?;
            format.print(&to_view(entries))
        }
        QueueCommand::Replay => {
            let (succeeded, dead_lettered) = queue
                .drain_once(store.as_ref(), metrics.as_ref())
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            format.print(&ReplayResultView { succeeded, dead_lettered })
        }
        QueueCommand::Drain { loop_forever: true } => {
            queue::run_drain_loop(
                queue,
                store,
                metrics,
                config.queue_drain_initial_backoff(),
                config.queue_drain_max_backoff(),
            )
            .await;
            Ok(())
        }
        QueueCommand::Drain { loop_forever: false } => {
            let (succeeded, dead_lettered) = queue
                .drain_once(store.as_ref(), metrics.as_ref())
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            format.print(&ReplayResultView { succeeded, dead_lettered })
        }
    }
}

fn to_view(entries: Vec<memory_core::queue::QueuedCapture>) -> QueueListView {
    QueueListView {
        count: entries.len(),
        entries: entries
            .into_iter()
            .map(|e| QueueEntryView {
                collection: e.collection,
                content_hash: e.point.content_hash,
                attempts: e.attempts,
            })
            .collect(),
    }
}
