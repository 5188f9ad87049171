//! Hook Dispatcher: reads one [`HookEvent`] from stdin, matches it
//! against the trigger table, and drives the capture/retrieval engines
//! within a hard latency budget.
//!
//! Every expected and degraded path exits zero — a non-zero exit or a
//! panic would interrupt the host's own tool-use loop, which is worse
//! than silently skipping a memory operation.

use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use memory_core::capture::{CaptureEngine, CaptureOutcome, CaptureRequest};
use memory_core::classifier::{apply_classification_result, Classifier, ClassificationQueue};
use memory_core::config::Config;
use memory_core::embedding::{EmbeddingClient, HttpEmbeddingClient};
use memory_core::error::Result;
use memory_core::identity::group_id_for_cwd;
use memory_core::metrics::{names, Metrics};
use memory_core::model::{Collection, GroupId, MemoryType};
use memory_core::queue::PendingQueue;
use memory_core::retrieval::{RetrievalEngine, RetrievalRequest};
use memory_core::trigger::{self, Action, HookEvent, Mode};
use memory_core::vector_store::{Filter, VectorStore};
use memory_storage_qdrant::QdrantVectorStore;

const MAX_TOKENS_PER_EMBED_ITEM: usize = 2_000;
const CLASSIFICATION_QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() {
    let config = Config::load(None).unwrap_or_default();
    init_logging(&config);

    let event = match read_event() {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "failed to parse hook event from stdin, skipping");
            return;
        }
    };

    match run(&config, event).await {
        Ok(Some(context)) => println!("{context}"),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(error = %e, "hook dispatch degraded, exiting cleanly");
        }
    }
}

fn read_event() -> Result<HookEvent> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(serde_json::from_str(&buf)?)
}

fn init_logging(config: &Config) {
    let log_dir = config.data_root.join("logs");
    if std::fs::create_dir_all(&log_dir).is_err() {
        return;
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("activity.log"))
    else {
        return;
    };
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_level.clone()))
        .with_writer(std::sync::Mutex::new(file))
        .try_init();
}

/// Build the pipeline's collaborators and dispatch `event`, honoring the
/// hook's hard latency budget: once 80% of `HOOK_BUDGET_MS` has elapsed,
/// remaining optional actions (additional retrievals/captures queued by
/// the same event) are skipped rather than risk blowing the budget
/// entirely.
async fn run(config: &Config, event: HookEvent) -> Result<Option<String>> {
    let started = Instant::now();
    let group_id = group_id_for_cwd(&event.cwd);
    let metrics = Arc::new(Metrics::new());

    let store: Arc<dyn VectorStore> = Arc::new(QdrantVectorStore::connect(
        &format!("http://{}:{}", config.vector_store.host, config.vector_store.port),
        config.vector_store.api_key.clone(),
    )?);
    let embedding: Arc<dyn EmbeddingClient> =
        Arc::new(HttpEmbeddingClient::new(config.embedding_service.clone(), MAX_TOKENS_PER_EMBED_ITEM)?);
    let queue = Arc::new(PendingQueue::open(&config.data_root)?);

    let classifier = Arc::new(Classifier::new(Vec::new()));
    let (classification_queue, mut classification_results) =
        ClassificationQueue::spawn(classifier, CLASSIFICATION_QUEUE_CAPACITY);
    let classification_queue = Arc::new(classification_queue);

    let capture_engine = CaptureEngine::new(
        store.clone(),
        embedding.clone(),
        queue,
        Some(classification_queue),
        config.clone(),
        metrics.clone(),
    );
    let classification_store = store.clone();
    let retrieval_engine = RetrievalEngine::new(store, embedding, config.clone(), metrics.clone());

    let has_prior_file_pattern = match trigger::edited_path(&event) {
        Some(path) => {
            let filter = Filter::for_group(group_id.0.clone())
                .eq("type", MemoryType::FilePattern.as_str())
                .eq("file_path", path)
                .eq("is_current", true);
            classification_store
                .count(Collection::CodePatterns.name(), &filter)
                .await
                .unwrap_or(0)
                > 0
        }
        None => false,
    };
    let actions = trigger::match_event(&event, has_prior_file_pattern);
    let mut ranked = Vec::new();
    let budget = budget_deadline(config, started);

    for action in actions {
        if Instant::now() >= budget {
            metrics.incr(names::HOOK_BUDGET_EXCEEDED).await;
            tracing::debug!("hook budget breached, skipping remaining actions");
            break;
        }
        match action.mode {
            Mode::Retrieval => {
                if let Some(results) = run_retrieval(&retrieval_engine, &action, &group_id, config).await {
                    ranked.extend(results);
                }
            }
            Mode::Capture => {
                run_capture(&capture_engine, &metrics, &action, &group_id, &event).await;
            }
        }
    }

    // Best-effort: apply whatever classification results land within the
    // remainder of the budget. Results arriving after the process exits
    // are simply never applied; the point stays at its conservative
    // default type until re-captured.
    while Instant::now() < budget {
        match tokio::time::timeout(budget.saturating_duration_since(Instant::now()), classification_results.recv()).await {
            Ok(Some(result)) => {
                if let Err(e) = apply_classification_result(classification_store.as_ref(), result).await {
                    tracing::debug!(error = %e, "classification write-back skipped");
                }
            }
            _ => break,
        }
    }

    if ranked.is_empty() {
        metrics.incr(names::RETRIEVAL_EMPTY).await;
        return Ok(None);
    }
    ranked.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(config.max_retrievals);
    Ok(retrieval_engine.assemble(&ranked))
}

fn budget_deadline(config: &Config, started: Instant) -> Instant {
    let soft_budget = config.hook_budget().mul_f64(0.8);
    started + soft_budget
}

async fn run_retrieval(
    engine: &RetrievalEngine,
    action: &Action,
    group_id: &GroupId,
    config: &Config,
) -> Option<Vec<memory_core::retrieval::RankedResult>> {
    let request = RetrievalRequest {
        query: action.query.clone().unwrap_or_default(),
        collection: Some(action.collection),
        memory_type: action.type_hint,
        intent: None,
        limit: config.max_retrievals,
        group_id: group_id.clone(),
    };
    match engine.retrieve(&request).await {
        Ok(results) => Some(results),
        Err(e) => {
            tracing::debug!(error = %e, "retrieval action skipped");
            None
        }
    }
}

async fn run_capture(engine: &CaptureEngine, metrics: &Metrics, action: &Action, group_id: &GroupId, event: &HookEvent) {
    let content = action.query.clone().unwrap_or_default();
    if content.trim().is_empty() {
        return;
    }
    let request = CaptureRequest {
        content,
        collection: action.collection,
        memory_type: action.type_hint.unwrap_or(MemoryType::Context),
        group_id: group_id.clone(),
        source_hook: event_kind_name(event),
        logical_identity: event.tool_input.as_ref().and_then(path_from_tool_input),
        file_path: if action.collection == Collection::CodePatterns {
            event.tool_input.as_ref().and_then(path_from_tool_input)
        } else {
            None
        },
        extra: Default::default(),
        case_sensitive: action.collection == Collection::CodePatterns,
    };
    match engine.store(request).await {
        Ok(CaptureOutcome::Duplicate { .. }) => {
            metrics.incr(names::SKIPPED_DUPLICATE).await;
        }
        Ok(CaptureOutcome::Queued { reason }) => {
            tracing::debug!(reason, "capture queued for later delivery");
        }
        Ok(CaptureOutcome::Stored { point_ids }) => {
            tracing::debug!(count = point_ids.len(), "capture stored");
        }
        Err(e) => {
            tracing::warn!(error = %e, "capture failed");
        }
    }
}

fn event_kind_name(event: &HookEvent) -> String {
    serde_json::to_value(event.event_kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

fn path_from_tool_input(input: &serde_json::Value) -> Option<String> {
    input
        .get("file_path")
        .or_else(|| input.get("path"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}
