//! Pending Queue & Replay: durable append-only JSONL fallback for
//! captures that couldn't reach the vector store or embedding service,
//! plus the drain worker that replays them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::metrics::{names, Metrics};
use crate::model::{Collection, MemoryPoint};
use crate::vector_store::VectorStore;

const MAX_ATTEMPTS: u32 = 5;

/// One deferred capture, self-sufficient to retry without reconsulting
/// the original caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedCapture {
    /// Target collection name.
    pub collection: String,
    /// The point to upsert once the store recovers.
    pub point: MemoryPoint,
    /// Attempts made so far.
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedCapture {
    /// Build a fresh (zero-attempt) queue entry for `point`.
    #[must_use]
    pub fn from_point(collection: Collection, point: MemoryPoint) -> Self {
        Self {
            collection: collection.name().to_string(),
            point,
            attempts: 0,
        }
    }
}

/// Append-only JSONL queue plus dead-letter file
/// (`queue/pending.jsonl`, `queue/deadletter.jsonl`).
///
/// Backed either by real files under a data root, or purely in-memory for
/// tests (`in_memory`), which behaves identically but never touches disk.
pub struct PendingQueue {
    backing: Backing,
}

enum Backing {
    File {
        pending_path: PathBuf,
        deadletter_path: PathBuf,
        write_lock: Mutex<()>,
    },
    Memory {
        pending: Mutex<Vec<QueuedCapture>>,
        deadletter: Mutex<Vec<QueuedCapture>>,
    },
}

impl PendingQueue {
    /// Open (creating parent directories as needed) the queue rooted at
    /// `data_root/queue/`.
    pub fn open(data_root: &Path) -> Result<Self> {
        let queue_dir = data_root.join("queue");
        std::fs::create_dir_all(&queue_dir)?;
        Ok(Self {
            backing: Backing::File {
                pending_path: queue_dir.join("pending.jsonl"),
                deadletter_path: queue_dir.join("deadletter.jsonl"),
                write_lock: Mutex::new(()),
            },
        })
    }

    /// An in-memory queue for tests; never persists across process
    /// restarts.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory {
                pending: Mutex::new(Vec::new()),
                deadletter: Mutex::new(Vec::new()),
            },
        }
    }

    /// Append one entry. Writes are line-atomic (`O_APPEND`) so concurrent
    /// processes sharing the same data root never interleave a partial
    /// line.
    pub async fn enqueue(&self, entry: QueuedCapture) -> Result<()> {
        match &self.backing {
            Backing::File {
                pending_path,
                write_lock,
                ..
            } => {
                let _guard = write_lock.lock().await;
                append_line(pending_path, &entry).await
            }
            Backing::Memory { pending, .. } => {
                pending.lock().await.push(entry);
                Ok(())
            }
        }
    }

    /// Current pending entries, for inspection (e.g. a CLI `queue list`
    /// command).
    pub async fn pending(&self) -> Result<Vec<QueuedCapture>> {
        match &self.backing {
            Backing::File { pending_path, .. } => read_all(pending_path),
            Backing::Memory { pending, .. } => Ok(pending.lock().await.clone()),
        }
    }

    /// Current dead-lettered entries.
    pub async fn deadletter(&self) -> Result<Vec<QueuedCapture>> {
        match &self.backing {
            Backing::File { deadletter_path, .. } => read_all(deadletter_path),
            Backing::Memory { deadletter, .. } => Ok(deadletter.lock().await.clone()),
        }
    }

    /// Drain the queue once: attempt every pending entry against `store`,
    /// keeping entries that still fail (with their attempt counter
    /// incremented), dead-lettering any that exhaust [`MAX_ATTEMPTS`].
    /// Returns `(succeeded, dead_lettered)` counts.
    ///
    /// Idempotent: running this twice against an already-empty queue is a
    /// no-op, and a successfully replayed entry is removed before the
    /// next call can see it.
    pub async fn drain_once(&self, store: &dyn VectorStore, metrics: &Metrics) -> Result<(usize, usize)> {
        let entries = self.pending().await?;
        if entries.is_empty() {
            return Ok((0, 0));
        }

        let mut remaining = Vec::new();
        let mut dead = Vec::new();
        let mut succeeded = 0usize;

        for mut entry in entries {
            match store.upsert(&entry.collection, vec![entry.point.clone()]).await {
                Ok(()) => succeeded += 1,
                Err(_) => {
                    entry.attempts += 1;
                    if entry.attempts >= MAX_ATTEMPTS {
                        dead.push(entry);
                    } else {
                        remaining.push(entry);
                    }
                }
            }
        }

        self.replace_pending(remaining).await?;
        let dead_count = dead.len();
        self.append_deadletter(dead).await?;
        if dead_count > 0 {
            metrics.incr_by(names::QUEUE_DEAD_LETTERED, dead_count as u64).await;
        }
        Ok((succeeded, dead_count))
    }

    async fn replace_pending(&self, entries: Vec<QueuedCapture>) -> Result<()> {
        match &self.backing {
            Backing::File {
                pending_path,
                write_lock,
                ..
            } => {
                let _guard = write_lock.lock().await;
                write_all(pending_path, &entries)
            }
            Backing::Memory { pending, .. } => {
                *pending.lock().await = entries;
                Ok(())
            }
        }
    }

    async fn append_deadletter(&self, entries: Vec<QueuedCapture>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        match &self.backing {
            Backing::File { deadletter_path, .. } => {
                for entry in &entries {
                    append_line(deadletter_path, entry).await?;
                }
                Ok(())
            }
            Backing::Memory { deadletter, .. } => {
                deadletter.lock().await.extend(entries);
                Ok(())
            }
        }
    }
}

async fn append_line(path: &Path, entry: &QueuedCapture) -> Result<()> {
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(())
}

fn read_all(path: &Path) -> Result<Vec<QueuedCapture>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    let mut out = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(line)?);
    }
    Ok(out)
}

fn write_all(path: &Path, entries: &[QueuedCapture]) -> Result<()> {
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(&serde_json::to_string(entry)?);
        buf.push('\n');
    }
    std::fs::write(path, buf)?;
    Ok(())
}

/// A background task that periodically drains `queue` against `store`
/// with exponential backoff between empty cycles.
pub async fn run_drain_loop(
    queue: Arc<PendingQueue>,
    store: Arc<dyn VectorStore>,
    metrics: Arc<Metrics>,
    initial_backoff: std::time::Duration,
    max_backoff: std::time::Duration,
) {
    let mut backoff = initial_backoff;
    loop {
        match queue.drain_once(store.as_ref(), metrics.as_ref()).await {
            Ok((succeeded, _)) if succeeded > 0 => {
                backoff = initial_backoff;
            }
            _ => {
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
        }
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Collection, EmbeddingStatus, GroupId};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_point() -> MemoryPoint {
        MemoryPoint {
            id: Uuid::new_v4(),
            vector: vec![0.0; 4],
            content: "queued content".into(),
            content_hash: "hash".into(),
            memory_type: crate::model::MemoryType::Implementation,
            group_id: GroupId("proj-a".into()),
            stored_at: Utc::now(),
            is_current: true,
            source_hook: "post_tool_use".into(),
            file_path: None,
            embedding_status: EmbeddingStatus::Pending,
            logical_identity: None,
            chunk_index: None,
            total_chunks: None,
            document_id: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_drain_succeeds() {
        let queue = PendingQueue::in_memory();
        queue
            .enqueue(QueuedCapture::from_point(Collection::CodePatterns, sample_point()))
            .await
            .unwrap();
        let store = test_utils::InMemoryVectorStore::new();
        let metrics = Metrics::new();
        let (succeeded, dead) = queue.drain_once(&store, &metrics).await.unwrap();
        assert_eq!(succeeded, 1);
        assert_eq!(dead, 0);
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_drain_of_empty_queue_is_idempotent() {
        let queue = PendingQueue::in_memory();
        let store = test_utils::InMemoryVectorStore::new();
        let metrics = Metrics::new();
        let first = queue.drain_once(&store, &metrics).await.unwrap();
        let second = queue.drain_once(&store, &metrics).await.unwrap();
        assert_eq!(first, (0, 0));
        assert_eq!(second, (0, 0));
    }

    #[tokio::test]
    async fn exhausted_entry_is_dead_lettered() {
        let queue = PendingQueue::in_memory();
        queue
            .enqueue(QueuedCapture::from_point(Collection::CodePatterns, sample_point()))
            .await
            .unwrap();
        let store = test_utils::AlwaysFailingVectorStore;
        let metrics = Metrics::new();
        for _ in 0..MAX_ATTEMPTS {
            queue.drain_once(&store, &metrics).await.unwrap();
        }
        assert!(queue.pending().await.unwrap().is_empty());
        assert_eq!(queue.deadletter().await.unwrap().len(), 1);
        assert_eq!(metrics.get(names::QUEUE_DEAD_LETTERED).await, 1);
    }
}
