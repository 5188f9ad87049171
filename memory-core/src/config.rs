//! Configuration. Precedence: process environment > config file >
//! built-in defaults. The resulting [`Config`] is immutable after
//! process start and threaded explicitly through every pipeline —
//! never read from module-level statics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::MemoryType;

/// Vector-store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Hostname of the vector store.
    pub host: String,
    /// gRPC/HTTP port.
    pub port: u16,
    /// API key, if the deployment requires one.
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6334,
            api_key: None,
        }
    }
}

/// Embedding-service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingServiceConfig {
    /// Base URL of the embedding service.
    pub url: String,
    /// API key, if required.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Embedding dimensionality the service produces.
    pub dimension: usize,
}

impl Default for EmbeddingServiceConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081/embed".to_string(),
            api_key: None,
            timeout_ms: 2_000,
            dimension: 384,
        }
    }
}

/// Feature flags / kill switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Whether expired freshness entries may be auto-enqueued for
    /// re-capture.
    pub auto_update_enabled: bool,
    /// Whether the freshness engine runs at all.
    pub freshness_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            auto_update_enabled: false,
            freshness_enabled: true,
        }
    }
}

/// Top-level configuration object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Minimum cosine similarity for a retrieval hit to count toward
    /// `limit` before cascading to other collections.
    pub similarity_threshold: f32,
    /// Cosine similarity at/above which a write is a semantic duplicate.
    pub dedup_threshold: f32,
    /// Default maximum results returned per retrieval.
    pub max_retrievals: usize,
    /// Token budget for the assembled `<retrieved_context>` block.
    pub token_budget: usize,
    /// Hard latency budget for one hook invocation, in milliseconds.
    pub hook_budget_ms: u64,
    /// Vector store connection.
    pub vector_store: VectorStoreConfig,
    /// Embedding service connection.
    pub embedding_service: EmbeddingServiceConfig,
    /// Per-type half-life overrides, in days. Falls back to
    /// [`MemoryType::default_half_life_days`] when absent.
    pub decay_type_overrides: BTreeMap<MemoryType, f64>,
    /// Feature flags.
    pub features: FeatureFlags,
    /// `tracing` log level filter (e.g. `"info"`, `"debug"`).
    pub log_level: String,
    /// `"json"` or `"pretty"`.
    pub log_format: String,
    /// Commits-since-write threshold below which a pattern is `fresh`.
    pub fresh_commits: u32,
    /// Commits-since-write threshold above which a pattern is `stale`
    /// rather than `aging`.
    pub stale_commits: u32,
    /// Root directory for the persisted layout: `queue/`, `state/`,
    /// `logs/`, `audit/`.
    pub data_root: std::path::PathBuf,
    /// Starting sleep between drain cycles in the background queue
    /// worker, in milliseconds.
    pub queue_drain_initial_backoff_ms: u64,
    /// Ceiling the drain worker's exponential backoff never exceeds, in
    /// milliseconds.
    pub queue_drain_max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            dedup_threshold: 0.95,
            max_retrievals: 5,
            token_budget: 4_000,
            hook_budget_ms: 500,
            vector_store: VectorStoreConfig::default(),
            embedding_service: EmbeddingServiceConfig::default(),
            decay_type_overrides: BTreeMap::new(),
            features: FeatureFlags::default(),
            log_level: "info".to_string(),
            log_format: "json".to_string(),
            fresh_commits: 5,
            stale_commits: 20,
            data_root: std::path::PathBuf::from(".memory"),
            queue_drain_initial_backoff_ms: 1_000,
            queue_drain_max_backoff_ms: 60_000,
        }
    }
}

impl Config {
    /// Half-life for `memory_type`, honoring a configured override.
    #[must_use]
    pub fn half_life_days(&self, memory_type: MemoryType) -> f64 {
        self.decay_type_overrides
            .get(&memory_type)
            .copied()
            .unwrap_or_else(|| memory_type.default_half_life_days())
    }

    /// Hard hook latency budget as a [`Duration`].
    #[must_use]
    pub fn hook_budget(&self) -> Duration {
        Duration::from_millis(self.hook_budget_ms)
    }

    /// Starting backoff for the background queue drain worker.
    #[must_use]
    pub fn queue_drain_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_drain_initial_backoff_ms)
    }

    /// Backoff ceiling for the background queue drain worker.
    #[must_use]
    pub fn queue_drain_max_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_drain_max_backoff_ms)
    }

    /// Load configuration: start from `path` (or the first of a list of
    /// default filenames) parsed as TOML, falling back to defaults if none
    /// exist; then overlay recognized environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidates = ["memory.toml", ".memory.toml"];
                let mut found = None;
                for candidate in candidates {
                    let candidate_path = Path::new(candidate);
                    if candidate_path.exists() {
                        found = Some(Self::from_file(candidate_path)?);
                        break;
                    }
                }
                found.unwrap_or_default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Configuration(format!("failed to parse {}: {e}", path.display())))
    }

    /// Overlay `MEMORY_*`-prefixed (and a few bare, well-known)
    /// environment variables on top of the already-loaded values. Process
    /// environment wins over everything else.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_f32("SIMILARITY_THRESHOLD") {
            self.similarity_threshold = v;
        }
        if let Some(v) = env_f32("DEDUP_THRESHOLD") {
            self.dedup_threshold = v;
        }
        if let Some(v) = env_usize("MAX_RETRIEVALS") {
            self.max_retrievals = v;
        }
        if let Some(v) = env_usize("TOKEN_BUDGET") {
            self.token_budget = v;
        }
        if let Some(v) = env_u64("HOOK_BUDGET_MS") {
            self.hook_budget_ms = v;
        }
        if let Ok(v) = std::env::var("VECTOR_STORE_HOST") {
            self.vector_store.host = v;
        }
        if let Some(v) = env_u16("VECTOR_STORE_PORT") {
            self.vector_store.port = v;
        }
        if let Ok(v) = std::env::var("VECTOR_STORE_API_KEY") {
            self.vector_store.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("EMBEDDING_SERVICE_URL") {
            self.embedding_service.url = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_SERVICE_API_KEY") {
            self.embedding_service.api_key = Some(v);
        }
        if let Ok(raw) = std::env::var("DECAY_TYPE_OVERRIDES") {
            self.decay_type_overrides.extend(parse_decay_overrides(&raw));
        }
        if let Some(v) = env_bool("AUTO_UPDATE_ENABLED") {
            self.features.auto_update_enabled = v;
        }
        if let Some(v) = env_bool("FRESHNESS_ENABLED") {
            self.features.freshness_enabled = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("LOG_FORMAT") {
            self.log_format = v;
        }
        if let Ok(v) = std::env::var("MEMORY_DATA_ROOT") {
            self.data_root = std::path::PathBuf::from(v);
        }
        if let Some(v) = env_u64("QUEUE_DRAIN_INITIAL_BACKOFF_MS") {
            self.queue_drain_initial_backoff_ms = v;
        }
        if let Some(v) = env_u64("QUEUE_DRAIN_MAX_BACKOFF_MS") {
            self.queue_drain_max_backoff_ms = v;
        }
    }
}

fn env_f32(key: &str) -> Option<f32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| match v.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    })
}

/// Parse `"type:days,type:days,..."` into `(MemoryType, days)` pairs,
/// skipping entries that don't name a recognized type.
fn parse_decay_overrides(raw: &str) -> BTreeMap<MemoryType, f64> {
    let mut out = BTreeMap::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((name, days)) = entry.split_once(':') else {
            continue;
        };
        let Ok(days) = days.trim().parse::<f64>() else {
            continue;
        };
        if let Some(memory_type) = memory_type_from_name(name.trim()) {
            out.insert(memory_type, days);
        }
    }
    out
}

fn memory_type_from_name(name: &str) -> Option<MemoryType> {
    use MemoryType::*;
    Some(match name {
        "implementation" => Implementation,
        "error_fix" => ErrorFix,
        "refactor" => Refactor,
        "file_pattern" => FilePattern,
        "rule" => Rule,
        "guideline" => Guideline,
        "port" => Port,
        "naming" => Naming,
        "structure" => Structure,
        "decision" => Decision,
        "session" => Session,
        "blocker" => Blocker,
        "preference" => Preference,
        "context" => Context,
        "agent_handoff" => AgentHandoff,
        "agent_insight" => AgentInsight,
        "agent_task" => AgentTask,
        _ => return None,
    })
}

// `MemoryType` needs a total order to live in a `BTreeMap` key position.
impl PartialOrd for MemoryType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MemoryType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.similarity_threshold, 0.7);
        assert_eq!(config.dedup_threshold, 0.95);
        assert_eq!(config.max_retrievals, 5);
        assert_eq!(config.token_budget, 4_000);
        assert_eq!(config.hook_budget_ms, 500);
    }

    #[test]
    fn half_life_falls_back_to_type_default() {
        let config = Config::default();
        assert_eq!(
            config.half_life_days(MemoryType::Rule),
            MemoryType::Rule.default_half_life_days()
        );
    }

    #[test]
    fn half_life_override_wins() {
        let mut config = Config::default();
        config.decay_type_overrides.insert(MemoryType::Rule, 99.0);
        assert_eq!(config.half_life_days(MemoryType::Rule), 99.0);
    }

    #[test]
    fn parses_decay_override_string() {
        let parsed = parse_decay_overrides("session:21,rule:60,bogus:5,malformed");
        assert_eq!(parsed.get(&MemoryType::Session), Some(&21.0));
        assert_eq!(parsed.get(&MemoryType::Rule), Some(&60.0));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    #[serial]
    fn env_overrides_win_over_defaults() {
        std::env::set_var("SIMILARITY_THRESHOLD", "0.42");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.similarity_threshold, 0.42);
        std::env::remove_var("SIMILARITY_THRESHOLD");
    }
}
