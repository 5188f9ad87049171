//! Derives the per-invocation project identifier (`group_id`) from the
//! host's working directory.

use crate::model::GroupId;
use std::path::Path;

/// Derive a stable, filesystem- and payload-safe tenant key from a project
/// working directory. The same `cwd` always yields the same `GroupId`;
/// different directories yield different ones with overwhelming
/// probability.
#[must_use]
pub fn group_id_for_cwd(cwd: &Path) -> GroupId {
    let canonical = cwd
        .canonicalize()
        .unwrap_or_else(|_| cwd.to_path_buf());
    let display = canonical.to_string_lossy();

    let digest = short_hash(display.as_bytes());
    let slug = canonical
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "root".to_string());
    let slug = sanitize(&slug);

    GroupId(format!("{slug}-{digest}"))
}

/// Replace everything but ASCII alphanumerics and `-`/`_` with `-`, so the
/// resulting id is safe to use as a payload-indexed field and a filesystem
/// path component.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push('-');
        }
    }
    if out.is_empty() {
        "project".to_string()
    } else {
        out
    }
}

/// A small stable (non-cryptographic) hash, rendered as lowercase hex.
/// FNV-1a: deterministic across processes and platforms, which a
/// `Hasher`-based `DefaultHasher` is not guaranteed to be.
fn short_hash(bytes: &[u8]) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn same_path_yields_same_group_id() {
        let path = PathBuf::from("/tmp/does-not-exist-for-hash-test");
        let a = group_id_for_cwd(&path);
        let b = group_id_for_cwd(&path);
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_yield_different_group_ids() {
        let a = group_id_for_cwd(&PathBuf::from("/tmp/project-a"));
        let b = group_id_for_cwd(&PathBuf::from("/tmp/project-b"));
        assert_ne!(a, b);
    }

    #[test]
    fn group_id_has_no_path_separators() {
        let id = group_id_for_cwd(&PathBuf::from("/tmp/some project/with spaces"));
        assert!(!id.0.contains('/'));
        assert!(!id.0.contains(' '));
    }
}
