//! Core pipeline for a project-scoped associative memory layer: the
//! three-collection data model, capture and retrieval engines, the
//! classifier, chunker, pending-queue replay, freshness scanning, and
//! purge/audit. Concrete backends (vector store, embedding service) are
//! expressed as traits here and implemented in sibling crates so the
//! pipeline can be driven by test doubles without patching any global
//! state.

pub mod audit;
pub mod capture;
pub mod chunker;
pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fingerprint;
pub mod freshness;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod retrieval;
pub mod trigger;
pub mod vector_store;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Collection, EmbeddingStatus, GroupId, MemoryPoint, MemoryType};
