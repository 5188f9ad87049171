//! Embedding client: batch + single text → fixed-dimension dense
//! vector, with retry, a token-limited batching fallback, and a health
//! probe for the operational-mode state machine.

mod http;

pub use http::HttpEmbeddingClient;

use async_trait::async_trait;

use crate::error::Result;

/// A dense embedding vector.
pub type Vector = Vec<f32>;

/// Text-to-vector embedding service.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a batch of texts, preserving input order. Implementations
    /// must chunk any text exceeding the service's token limit and
    /// concatenate results transparently to the caller.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Embed a single text. The default forwards to [`Self::embed`].
    async fn embed_one(&self, text: &str) -> Result<Vector> {
        let mut batch = self.embed(std::slice::from_ref(&text.to_string())).await?;
        Ok(batch.pop().unwrap_or_default())
    }

    /// The dimensionality this client's vectors share.
    fn dimension(&self) -> usize;

    /// Cheap liveness probe.
    async fn is_healthy(&self) -> bool;
}
