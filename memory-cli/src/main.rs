//! Administrative CLI for the memory pipeline: a thin `clap` surface that
//! wires the already-built engines (capture, retrieval, freshness, audit,
//! pending queue) to concrete collaborators and dispatches one command.

mod commands;
mod ground_truth;
mod output;

use clap::{Parser, Subcommand};
use memory_core::audit::AuditEngine;
use memory_core::capture::CaptureEngine;
use memory_core::classifier::{apply_classification_result, Classifier, ClassificationQueue, ClassificationResult};
use memory_core::config::Config;
use memory_core::embedding::{EmbeddingClient, HttpEmbeddingClient};
use memory_core::identity::group_id_for_cwd;
use memory_core::metrics::Metrics;
use memory_core::model::GroupId;
use memory_core::queue::PendingQueue;
use memory_core::retrieval::RetrievalEngine;
use memory_core::vector_store::VectorStore;
use memory_storage_qdrant::QdrantVectorStore;
use output::OutputFormat;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const MAX_TOKENS_PER_EMBED_ITEM: usize = 2_000;
const CLASSIFICATION_QUEUE_CAPACITY: usize = 64;
const CLASSIFICATION_DRAIN_BUDGET: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "memory-cli")]
#[command(about = "Administrative interface for the project memory pipeline")]
#[command(version)]
struct Cli {
    /// Configuration file path; searches `memory.toml`/`.memory.toml` if
    /// omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Enable debug-level logging.
    #[arg(short, long)]
    verbose: bool,

    /// Tenant key override; defaults to a key derived from the current
    /// working directory.
    #[arg(long)]
    group_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store one memory directly, bypassing the hook trigger table.
    Capture(commands::capture::CaptureArgs),
    /// Run one retrieval and print the ranked hits.
    Retrieve(commands::retrieve::RetrieveArgs),
    /// Freshness scanning over file-backed patterns.
    Freshness(commands::freshness::FreshnessArgs),
    /// Age-based deletion, dry-run by default.
    Purge(commands::purge::PurgeArgs),
    /// Inspect or replay the pending-capture queue.
    Queue(commands::queue::QueueArgs),
    /// Toggle a feature flag / kill switch.
    KillSwitch(commands::killswitch::KillSwitchArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(commands::killswitch::default_config_path);
    let mut config = Config::load(cli.config.as_deref())?;

    let group_id = match cli.group_id {
        Some(raw) => GroupId(raw),
        None => group_id_for_cwd(&std::env::current_dir()?),
    };

    let store: Arc<dyn VectorStore> = Arc::new(QdrantVectorStore::connect(
        &format!("http://{}:{}", config.vector_store.host, config.vector_store.port),
        config.vector_store.api_key.clone(),
    )?);
    let metrics = Arc::new(Metrics::new());

    match cli.command {
        Commands::Capture(args) => {
            let (engine, mut results) = build_capture_engine(&config, store.clone(), metrics.clone()).await?;
            let outcome = commands::capture::run(args, &engine, &group_id, cli.format).await;
            drain_classification_results(store.as_ref(), &mut results, CLASSIFICATION_DRAIN_BUDGET).await;
            outcome
        }
        Commands::Retrieve(args) => {
            let embedding: Arc<dyn EmbeddingClient> =
                Arc::new(HttpEmbeddingClient::new(config.embedding_service.clone(), MAX_TOKENS_PER_EMBED_ITEM)?);
            let engine = RetrievalEngine::new(store, embedding, config.clone(), metrics.clone());
            commands::retrieve::run(args, &engine, &group_id, cli.format).await
        }
        Commands::Freshness(args) => {
            commands::freshness::run(args, store, config.clone(), &group_id, metrics.clone(), cli.format).await
        }
        Commands::Purge(args) => {
            let engine = AuditEngine::open(store, &config.data_root)?;
            commands::purge::run(args, &engine, &group_id, cli.format).await
        }
        Commands::Queue(args) => {
            let queue = Arc::new(PendingQueue::open(&config.data_root)?);
            commands::queue::run(args, queue, store, &config, metrics.clone(), cli.format).await
        }
        Commands::KillSwitch(args) => {
            let engine = AuditEngine::open(store, &config.data_root)?;
            commands::killswitch::run(args, &mut config, &config_path, &engine, cli.format).await
        }
    }
}

pub(crate) async fn build_capture_engine(
    config: &Config,
    store: Arc<dyn VectorStore>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<(CaptureEngine, mpsc::Receiver<ClassificationResult>)> {
    let embedding: Arc<dyn EmbeddingClient> =
        Arc::new(HttpEmbeddingClient::new(config.embedding_service.clone(), MAX_TOKENS_PER_EMBED_ITEM)?);
    let queue = Arc::new(PendingQueue::open(&config.data_root)?);
    let classifier = Arc::new(Classifier::new(Vec::new()));
    let (classification_queue, results) = ClassificationQueue::spawn(classifier, CLASSIFICATION_QUEUE_CAPACITY);
    let engine = CaptureEngine::new(
        store,
        embedding,
        queue,
        Some(Arc::new(classification_queue)),
        config.clone(),
        metrics,
    );
    Ok((engine, results))
}

/// Best-effort drain: apply whatever classification results land within
/// `budget`, then return. Results arriving afterward are simply never
/// applied; the affected points keep their conservative default type
/// until re-captured.
pub(crate) async fn drain_classification_results(
    store: &dyn VectorStore,
    results: &mut mpsc::Receiver<ClassificationResult>,
    budget: std::time::Duration,
) {
    let deadline = Instant::now() + budget;
    while Instant::now() < deadline {
        match tokio::time::timeout(deadline.saturating_duration_since(Instant::now()), results.recv()).await {
            Ok(Some(result)) => {
                if let Err(e) = apply_classification_result(store, result).await {
                    tracing::debug!(error = %e, "classification write-back skipped");
                }
            }
            _ => break,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}
