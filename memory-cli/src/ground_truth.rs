//! Git-backed [`GroundTruthProvider`]: resolves a file's current content
//! fingerprint and commit activity from the working tree so `freshness
//! scan` can tier stored patterns without the pipeline depending on git
//! itself.

use async_trait::async_trait;
use memory_core::error::Result;
use memory_core::fingerprint;
use memory_core::freshness::{GroundTruth, GroundTruthProvider};
use memory_core::model::{Collection, MemoryType};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

/// Resolves ground truth against a single repository checkout. Blocking
/// git/filesystem calls run on a `spawn_blocking` thread since the trait
/// is async.
pub struct GitGroundTruthProvider {
    repo_root: PathBuf,
}

impl GitGroundTruthProvider {
    #[must_use]
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }

    fn commit_count(&self, path: &str) -> u32 {
        Command::new("git")
            .args(["log", "--oneline", "--", path])
            .current_dir(&self.repo_root)
            .output()
            .map(|out| u32::try_from(String::from_utf8_lossy(&out.stdout).lines().count()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }

    /// Fingerprints the file the same way a `file_pattern` capture would
    /// hash it, so [`memory_core::freshness::FreshnessEngine::classify`]'s
    /// direct comparison against a stored point's `content_hash` lines
    /// up for the common case of whole-file pattern captures.
    fn fingerprint_of(&self, path: &str) -> Option<String> {
        let content = std::fs::read_to_string(self.repo_root.join(path)).ok()?;
        let normalized = fingerprint::normalize_content(&content, false);
        Some(fingerprint::content_hash(
            Collection::CodePatterns,
            MemoryType::FilePattern.as_str(),
            Some(path),
            &normalized,
        ))
    }
}

#[async_trait]
impl GroundTruthProvider for GitGroundTruthProvider {
    async fn resolve(&self, paths: &[String]) -> Result<HashMap<String, GroundTruth>> {
        let repo_root = self.repo_root.clone();
        let paths = paths.to_vec();
        let provider = GitGroundTruthProvider { repo_root };
        tokio::task::spawn_blocking(move || {
            let mut out = HashMap::new();
            for path in &paths {
                if let Some(fingerprint) = provider.fingerprint_of(path) {
                    out.insert(
                        path.clone(),
                        GroundTruth {
                            fingerprint,
                            commits_since_stored: provider.commit_count(path),
                        },
                    );
                }
            }
            out
        })
        .await
        .map_err(|e| memory_core::error::Error::Configuration(format!("ground truth task panicked: {e}")))
    }
}
