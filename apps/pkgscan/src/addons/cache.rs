//! On-disk persistence for addon values.
//!
//! Each persisted addon lives in `<dir>/<addon>.json` as an envelope
//! `{identity, version, value}`. An envelope whose identity or format version
//! differs from the requested key is stale and ignored.

use crate::error::CacheError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub addon: String,
    pub version: u32,
    /// Repository identity (commit id or content fingerprint).
    pub identity: String,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.addon, self.version, self.identity)
    }
}

/// Cross-scan storage; failures only cost a recomputation.
pub trait CachePersistence: Send + Sync {
    fn load(&self, key: &CacheKey) -> Option<serde_json::Value>;
    fn store(&self, key: &CacheKey, value: &serde_json::Value) -> Result<(), CacheError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    identity: String,
    version: u32,
    value: serde_json::Value,
}

#[derive(Debug, Clone)]
/// JSON envelopes under a cache directory.
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, addon: &str) -> PathBuf {
        self.dir.join(format!("{addon}.json"))
    }

    /// Remove every envelope; returns how many were deleted.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let io = |source| CacheError::Io {
            path: self.dir.clone(),
            source,
        };
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.extension().is_some_and(|e| e == "json") {
                fs::remove_file(&path).map_err(|source| CacheError::Io {
                    path: path.clone(),
                    source,
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

impl CachePersistence for DiskCache {
    fn load(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let path = self.path_for(&key.addon);
        let text = fs::read_to_string(&path).ok()?;
        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(e) => e,
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "ignoring corrupt cache entry");
                return None;
            }
        };
        if envelope.identity != key.identity || envelope.version != key.version {
            tracing::debug!(%key, "stale cache entry");
            return None;
        }
        Some(envelope.value)
    }

    fn store(&self, key: &CacheKey, value: &serde_json::Value) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let envelope = Envelope {
            identity: key.identity.clone(),
            version: key.version,
            value: value.clone(),
        };
        let path = self.path_for(&key.addon);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec(&envelope)?;
        fs::write(&tmp, bytes).map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| CacheError::Io { path, source })
    }
}

/// Identity of the repository state used to key persisted addons.
///
/// The checked-out commit when `.git` is readable, otherwise a fingerprint
/// over the paths, sizes and modification times of repository files.
pub fn repo_identity(root: &Path) -> String {
    if let Some(commit) = git_head(root) {
        return commit;
    }
    fingerprint(root)
}

/// Commit id `HEAD` points at, following one level of symbolic ref.
pub fn git_head(root: &Path) -> Option<String> {
    let git = root.join(".git");
    let head = fs::read_to_string(git.join("HEAD")).ok()?;
    let head = head.trim();
    let Some(reference) = head.strip_prefix("ref: ") else {
        return is_commit_id(head).then(|| head.to_string());
    };
    if let Ok(id) = fs::read_to_string(git.join(reference)) {
        let id = id.trim();
        return is_commit_id(id).then(|| id.to_string());
    }
    let packed = fs::read_to_string(git.join("packed-refs")).ok()?;
    packed.lines().find_map(|line| {
        let (id, name) = line.split_once(' ')?;
        (name == reference && is_commit_id(id)).then(|| id.to_string())
    })
}

fn is_commit_id(s: &str) -> bool {
    s.len() >= 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn fingerprint(root: &Path) -> String {
    let opts = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..Default::default()
    };
    let mut entries: Vec<(String, u64, u128)> = Vec::new();
    for pattern in ["*/*/*.ebuild", "profiles/**/*", "metadata/glsa/*.xml"] {
        let full = root.join(pattern).to_string_lossy().to_string();
        let Ok(paths) = glob::glob_with(&full, opts) else {
            continue;
        };
        for path in paths.flatten() {
            let Ok(meta) = fs::metadata(&path) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map_or(0, |d| d.as_nanos());
            let rel = pathdiff::diff_paths(&path, root).unwrap_or(path);
            entries.push((rel.to_string_lossy().to_string(), meta.len(), mtime));
        }
    }
    entries.sort();
    let mut hasher = Sha256::new();
    for (path, len, mtime) in &entries {
        hasher.update(path.as_bytes());
        hasher.update(len.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(identity: &str, version: u32) -> CacheKey {
        CacheKey {
            addon: "packages".into(),
            version,
            identity: identity.into(),
        }
    }

    #[test]
    fn test_store_then_load() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache"));
        cache
            .store(&key("abc", 1), &serde_json::json!({"a": 1}))
            .unwrap();
        assert_eq!(cache.load(&key("abc", 1)), Some(serde_json::json!({"a": 1})));
    }

    #[test]
    fn test_stale_envelopes_are_ignored() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.store(&key("abc", 1), &serde_json::json!([1])).unwrap();
        assert_eq!(cache.load(&key("def", 1)), None);
        assert_eq!(cache.load(&key("abc", 2)), None);
        fs::write(dir.path().join("packages.json"), "{not json").unwrap();
        assert_eq!(cache.load(&key("abc", 1)), None);
    }

    #[test]
    fn test_clear_removes_envelopes() {
        let dir = tempdir().unwrap();
        let cache = DiskCache::new(dir.path());
        cache.store(&key("abc", 1), &serde_json::json!(null)).unwrap();
        assert_eq!(cache.clear().unwrap(), 1);
        assert_eq!(cache.load(&key("abc", 1)), None);
    }

    #[test]
    fn test_identity_prefers_git_head() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let commit = "0123456789abcdef0123456789abcdef01234567";
        fs::create_dir_all(root.join(".git/refs/heads")).unwrap();
        fs::write(root.join(".git/HEAD"), "ref: refs/heads/master\n").unwrap();
        fs::write(root.join(".git/refs/heads/master"), format!("{commit}\n")).unwrap();
        assert_eq!(repo_identity(root), commit);
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("cat/pkg")).unwrap();
        fs::write(root.join("cat/pkg/pkg-1.ebuild"), "EAPI=8\n").unwrap();
        let a = repo_identity(root);
        assert_eq!(a, repo_identity(root));
        fs::write(root.join("cat/pkg/pkg-2.ebuild"), "EAPI=8\n").unwrap();
        assert_ne!(a, repo_identity(root));
    }
}
