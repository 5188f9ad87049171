//! HTTP-backed [`EmbeddingClient`].
//!
//! Retries exponentially on transport errors and 5xx responses (up to
//! three attempts); 4xx responses are never retried. The batch API
//! chunks oversized inputs at a configured token limit and concatenates
//! results preserving input order.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingClient, Vector};
use crate::config::EmbeddingServiceConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;

/// Conservative chars-per-token estimate used to split oversized batch
/// entries before they are sent to the service (mirrors the token
/// estimation idiom used by the token-budget packer in
/// `memory-core::retrieval`).
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vector>,
}

/// Reqwest-backed embedding client.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    config: EmbeddingServiceConfig,
    max_tokens_per_item: usize,
}

impl HttpEmbeddingClient {
    /// Build a client from `config`. `max_tokens_per_item` bounds a single
    /// batch entry before it is split, so an oversized input is chunked
    /// at the token limit rather than rejected.
    pub fn new(config: EmbeddingServiceConfig, max_tokens_per_item: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            config,
            max_tokens_per_item,
        })
    }

    fn split_oversized(&self, text: &str) -> Vec<String> {
        let max_chars = self.max_tokens_per_item * CHARS_PER_TOKEN;
        if text.len() <= max_chars {
            return vec![text.to_string()];
        }
        text.as_bytes()
            .chunks(max_chars)
            .map(|chunk| String::from_utf8_lossy(chunk).to_string())
            .collect()
    }

    async fn post_batch(&self, texts: &[String]) -> Result<Vec<Vector>> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut attempt = 0;
        loop {
            let mut request = self.client.post(&self.config.url).json(&EmbedRequest { input: texts });
            if let Some(key) = &self.config.api_key {
                request = request.bearer_auth(key);
            }

            let outcome = request.send().await;
            match outcome {
                Ok(response) if response.status().is_success() => {
                    let parsed: EmbedResponse = response
                        .json()
                        .await
                        .map_err(|e| Error::TransportUnavailable(format!("bad embed response: {e}")))?;
                    return Ok(parsed.embeddings);
                }
                Ok(response) if response.status().is_client_error() => {
                    return Err(Error::InvalidInput(format!(
                        "embedding service rejected request: {}",
                        response.status()
                    )));
                }
                Ok(response) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::TransportUnavailable(format!(
                            "embedding service returned {} after {attempt} attempts",
                            response.status()
                        )));
                    }
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= MAX_ATTEMPTS {
                        return Err(Error::TransportUnavailable(format!(
                            "embedding service unreachable after {attempt} attempts: {e}"
                        )));
                    }
                }
            }
            let backoff = Duration::from_millis(100u64 * 2u64.pow(attempt - 1));
            tokio::time::sleep(backoff).await;
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // Expand each input into its (possibly split) pieces, remembering
        // how many pieces came from each original entry so results can be
        // averaged back into one vector per input, preserving order.
        let mut pieces = Vec::new();
        let mut piece_counts = Vec::with_capacity(texts.len());
        for text in texts {
            let split = self.split_oversized(text);
            piece_counts.push(split.len());
            pieces.extend(split);
        }

        let flat = self.post_batch(&pieces).await?;
        if flat.len() != pieces.len() {
            return Err(Error::TransportUnavailable(
                "embedding service returned a mismatched vector count".to_string(),
            ));
        }

        let mut out = Vec::with_capacity(texts.len());
        let mut cursor = 0;
        for count in piece_counts {
            let slice = &flat[cursor..cursor + count];
            out.push(average_vectors(slice));
            cursor += count;
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn is_healthy(&self) -> bool {
        self.embed_one("healthcheck").await.is_ok()
    }
}

fn average_vectors(vectors: &[Vector]) -> Vector {
    if vectors.len() == 1 {
        return vectors[0].clone();
    }
    let dim = vectors.first().map_or(0, Vec::len);
    let mut sum = vec![0.0f32; dim];
    for vector in vectors {
        for (accum, value) in sum.iter_mut().zip(vector.iter()) {
            *accum += value;
        }
    }
    let count = vectors.len() as f32;
    for value in &mut sum {
        *value /= count;
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_oversized_respects_token_limit() {
        let client = HttpEmbeddingClient::new(EmbeddingServiceConfig::default(), 10).unwrap();
        let long_text = "a".repeat(1000);
        let pieces = client.split_oversized(&long_text);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| p.len() <= 10 * CHARS_PER_TOKEN));
    }

    #[test]
    fn short_text_is_not_split() {
        let client = HttpEmbeddingClient::new(EmbeddingServiceConfig::default(), 1000).unwrap();
        let pieces = client.split_oversized("short");
        assert_eq!(pieces, vec!["short".to_string()]);
    }

    #[test]
    fn average_of_single_vector_is_itself() {
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(average_vectors(std::slice::from_ref(&v)), v);
    }

    #[test]
    fn average_of_many_vectors_is_componentwise_mean() {
        let a = vec![1.0, 1.0];
        let b = vec![3.0, 5.0];
        assert_eq!(average_vectors(&[a, b]), vec![2.0, 3.0]);
    }
}
