//! Tagged error variants for the memory pipeline.
//!
//! Every public entry point in this crate returns [`Result<T>`] rather than
//! panicking or raising. The hook dispatcher is the *only* place these are
//! ever translated into an exit code or swallowed; callers elsewhere should
//! match on the variant and act, never `.unwrap()`.

use uuid::Uuid;

/// Result type alias used throughout the memory pipeline.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the memory pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An exact or near-duplicate write was suppressed.
    #[error("duplicate of existing memory {existing_id}")]
    Duplicate {
        /// The point that already satisfies this write.
        existing_id: Uuid,
    },

    /// The store or embedding service was unavailable; the write was
    /// persisted to the pending queue instead.
    #[error("queued for later delivery: {reason}")]
    Queued {
        /// Human-readable reason the write was deferred.
        reason: String,
    },

    /// The vector store accepted the write but the embedding service was
    /// unavailable; the point was stored with a zero placeholder vector.
    #[error("stored with embedding pending backfill")]
    PendingEmbedding {
        /// Id of the point stored with `embedding_status = pending`.
        point_id: Uuid,
    },

    /// A network call to a dependency (vector store, embedding service,
    /// classifier provider, ground-truth provider) failed after retries.
    #[error("dependency unavailable: {0}")]
    TransportUnavailable(String),

    /// The embedding service could not produce a vector before the caller's
    /// remaining budget was exhausted.
    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Caller supplied invalid input (missing `group_id`, unknown type,
    /// oversized payload, etc). Never swallowed silently.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The hook's hard latency budget was breached; optional work was
    /// abandoned and a partial result was returned.
    #[error("hook budget exceeded")]
    BudgetExceeded,

    /// A pending-queue entry exhausted its retry budget and was
    /// dead-lettered.
    #[error("permanent failure after exhausting retries: {0}")]
    PermanentFailure(String),

    /// Malformed JSON in an event record, queue entry, or config file.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error reading/writing the queue, audit log, or config.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value was missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether this failure should count against a circuit breaker /
    /// is worth retrying. Non-recoverable errors (bad input, a genuine
    /// duplicate) must never trip a breaker open.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Queued { .. }
                | Error::PendingEmbedding { .. }
                | Error::TransportUnavailable(_)
                | Error::EmbeddingUnavailable(_)
                | Error::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_recoverable() {
        let err = Error::TransportUnavailable("connection refused".into());
        assert!(err.is_recoverable());
    }

    #[test]
    fn duplicate_is_not_recoverable() {
        let err = Error::Duplicate {
            existing_id: Uuid::nil(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn invalid_input_is_not_recoverable() {
        let err = Error::InvalidInput("missing group_id".into());
        assert!(!err.is_recoverable());
    }
}
