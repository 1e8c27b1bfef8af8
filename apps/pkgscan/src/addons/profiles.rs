//! Parsed `profiles/` tree.
//!
//! Covers the repository-wide lists (`categories`, `arch.list`,
//! `profiles.desc`, USE descriptions) and every profile directory with its
//! `parent`/`eapi` files and package/USE override files.

use super::{Addon, AddonContext, AddonId, AddonValue};
use crate::error::AddonError;
use crate::source::is_category_dir;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Profile subtrees that never hold profiles.
const NON_PROFILE_DIRS: &[&str] = &["desc", "updates"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Shape of a profile override file.
pub enum EntryKind {
    /// `package.mask`, `packages`, ...: one atom per line.
    Atoms,
    /// `package.keywords`, `package.accept_keywords`: atom then keywords.
    AtomKeywords,
    /// `package.use*`: atom then flags.
    AtomUse,
    /// `use.mask`, `use.force`, ...: one flag per line.
    Use,
}

const PROFILE_FILES: &[(&str, EntryKind)] = &[
    ("packages", EntryKind::Atoms),
    ("package.mask", EntryKind::Atoms),
    ("package.unmask", EntryKind::Atoms),
    ("package.deprecated", EntryKind::Atoms),
    ("package.keywords", EntryKind::AtomKeywords),
    ("package.accept_keywords", EntryKind::AtomKeywords),
    ("package.use", EntryKind::AtomUse),
    ("package.use.force", EntryKind::AtomUse),
    ("package.use.stable.force", EntryKind::AtomUse),
    ("package.use.mask", EntryKind::AtomUse),
    ("package.use.stable.mask", EntryKind::AtomUse),
    ("use.force", EntryKind::Use),
    ("use.stable.force", EntryKind::Use),
    ("use.mask", EntryKind::Use),
    ("use.stable.mask", EntryKind::Use),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One `profiles.desc` line.
pub struct ProfileDesc {
    pub arch: String,
    pub path: String,
    pub status: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A `profiles.desc` line that is not `arch path status`.
pub struct MalformedDesc {
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One non-comment line of a profile override file.
pub struct ProfileEntry {
    /// Path relative to `profiles/`, e.g. `default/linux/package.use`.
    pub file: String,
    pub kind: EntryKind,
    pub line: usize,
    pub tokens: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    pub categories: Vec<String>,
    /// Category-looking directories at the repository top level.
    pub category_dirs: BTreeSet<String>,
    pub arches: BTreeSet<String>,
    pub profiles: Vec<ProfileDesc>,
    pub malformed_desc: Vec<MalformedDesc>,
    pub global_use: BTreeSet<String>,
    /// `cat/pkg` to locally described flags.
    pub local_use: BTreeMap<String, BTreeSet<String>>,
    /// USE_EXPAND flags such as `python_targets_python3_12`.
    pub use_expand: BTreeSet<String>,
    /// Every directory under `profiles/`, relative, excluding non-profile trees.
    pub dirs: BTreeSet<String>,
    /// Resolved `parent` entries per profile directory.
    pub parents: BTreeMap<String, Vec<String>>,
    /// `eapi` file contents per profile directory.
    pub eapis: BTreeMap<String, String>,
    /// Replacement named by the `deprecated` file of a profile directory.
    pub deprecated: BTreeMap<String, String>,
    pub entries: Vec<ProfileEntry>,
}

/// Non-empty, non-comment lines with their 1-based numbers.
fn data_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines().enumerate().filter_map(|(i, line)| {
        let line = line.split('#').next().unwrap_or("").trim();
        (!line.is_empty()).then_some((i + 1, line))
    })
}

fn read_lines(path: &Path) -> Vec<(usize, String)> {
    fs::read_to_string(path)
        .map(|text| {
            data_lines(&text)
                .map(|(n, l)| (n, l.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Resolve `rel` against profile directory `dir`; `None` when it escapes `profiles/`.
pub fn resolve_relative(dir: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|p| !p.is_empty()).collect();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            p => parts.push(p),
        }
    }
    Some(parts.join("/"))
}

/// `a/b/c` yields `a/b/c`, `a/b`, `a`.
pub fn dir_parents(path: &str) -> impl Iterator<Item = &str> {
    let path = path.trim_matches('/');
    let mut next = (!path.is_empty()).then_some(path);
    std::iter::from_fn(move || {
        let cur = next?;
        next = cur.rfind('/').map(|idx| &cur[..idx]);
        Some(cur)
    })
}

impl ProfileData {
    pub fn load(repo_root: &Path) -> Result<Self, AddonError> {
        let base = repo_root.join("profiles");
        if !base.is_dir() {
            return Err(AddonError::failed(
                AddonId::PROFILES.as_str(),
                format!("no profiles directory at {}", base.display()),
            ));
        }
        let mut data = ProfileData {
            categories: read_lines(&base.join("categories"))
                .into_iter()
                .map(|(_, l)| l)
                .collect(),
            arches: read_lines(&base.join("arch.list"))
                .into_iter()
                .map(|(_, l)| l)
                .collect(),
            ..Default::default()
        };

        for (line, text) in read_lines(&base.join("profiles.desc")) {
            let fields: Vec<&str> = text.split_whitespace().collect();
            if let [arch, path, status] = fields.as_slice() {
                data.profiles.push(ProfileDesc {
                    arch: arch.to_string(),
                    path: path.trim_matches('/').to_string(),
                    status: status.to_string(),
                    line,
                });
            } else {
                tracing::debug!(line, "malformed profiles.desc line");
                data.malformed_desc.push(MalformedDesc { line, text });
            }
        }

        for (_, text) in read_lines(&base.join("use.desc")) {
            if let Some((flag, _)) = text.split_once(" - ") {
                data.global_use.insert(flag.trim().to_string());
            }
        }
        for (_, text) in read_lines(&base.join("use.local.desc")) {
            let Some((head, _)) = text.split_once(" - ") else {
                continue;
            };
            if let Some((pkg, flag)) = head.trim().split_once(':') {
                data.local_use
                    .entry(pkg.to_string())
                    .or_default()
                    .insert(flag.to_string());
            }
        }
        if let Ok(descs) = fs::read_dir(base.join("desc")) {
            for entry in descs.flatten() {
                let path = entry.path();
                if path.extension().map_or(true, |e| e != "desc") {
                    continue;
                }
                let Some(prefix) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let prefix = prefix.to_lowercase();
                for (_, text) in read_lines(&path) {
                    if let Some((value, _)) = text.split_once(" - ") {
                        data.use_expand.insert(format!("{prefix}_{}", value.trim()));
                    }
                }
            }
        }

        if let Ok(top) = fs::read_dir(repo_root) {
            for entry in top.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if entry.path().is_dir() && is_category_dir(&name) {
                    data.category_dirs.insert(name);
                }
            }
        }

        data.load_profile_dirs(&base);
        Ok(data)
    }

    fn load_profile_dirs(&mut self, base: &Path) {
        let pattern = base.join("**").join("*").to_string_lossy().to_string();
        let opts = glob::MatchOptions {
            require_literal_leading_dot: true,
            ..Default::default()
        };
        let mut dirs = vec![String::new()];
        if let Ok(paths) = glob::glob_with(&pattern, opts) {
            for path in paths.flatten().filter(|p| p.is_dir()) {
                let Some(rel) = pathdiff::diff_paths(&path, base) else {
                    continue;
                };
                let rel = rel.to_string_lossy().replace('\\', "/");
                let top = rel.split('/').next().unwrap_or("");
                if NON_PROFILE_DIRS.contains(&top) {
                    continue;
                }
                dirs.push(rel);
            }
        }
        dirs.sort();
        dirs.dedup();

        for dir in &dirs {
            let abs = if dir.is_empty() {
                base.to_path_buf()
            } else {
                base.join(dir)
            };
            if !dir.is_empty() {
                self.dirs.insert(dir.clone());
                let parents: Vec<String> = read_lines(&abs.join("parent"))
                    .into_iter()
                    .filter_map(|(_, rel)| resolve_relative(dir, &rel))
                    .collect();
                if !parents.is_empty() {
                    self.parents.insert(dir.clone(), parents);
                }
                if let Some((_, eapi)) = read_lines(&abs.join("eapi")).into_iter().next() {
                    self.eapis.insert(dir.clone(), eapi);
                }
                // first line names the replacement, the rest is free text
                if let Some((_, replacement)) =
                    read_lines(&abs.join("deprecated")).into_iter().next()
                {
                    self.deprecated
                        .insert(dir.clone(), replacement.trim_matches('/').to_string());
                }
            }
            for (name, kind) in PROFILE_FILES {
                let file = if dir.is_empty() {
                    name.to_string()
                } else {
                    format!("{dir}/{name}")
                };
                for (line, text) in read_lines(&abs.join(name)) {
                    self.entries.push(ProfileEntry {
                        file: file.clone(),
                        kind: *kind,
                        line,
                        tokens: text.split_whitespace().map(str::to_string).collect(),
                    });
                }
            }
        }
    }

    /// EAPI of a profile directory; profiles without an `eapi` file are EAPI 0.
    pub fn eapi(&self, dir: &str) -> &str {
        self.eapis.get(dir).map_or("0", String::as_str)
    }

    /// Inheritance stack of `dir`, parents first, `dir` last.
    pub fn stack(&self, dir: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        self.push_stack(dir, &mut seen, &mut out);
        out
    }

    fn push_stack(&self, dir: &str, seen: &mut BTreeSet<String>, out: &mut Vec<String>) {
        if !seen.insert(dir.to_string()) {
            return;
        }
        for parent in self.parents.get(dir).into_iter().flatten() {
            self.push_stack(parent, seen, out);
        }
        out.push(dir.to_string());
    }
}

pub struct ProfilesAddon;

impl Addon for ProfilesAddon {
    fn id(&self) -> AddonId {
        AddonId::PROFILES
    }

    fn compute(&self, ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError> {
        Ok(Arc::new(ProfileData::load(ctx.repo_root)?))
    }

    fn persist_version(&self) -> Option<u32> {
        Some(2)
    }

    fn encode(&self, value: &AddonValue) -> Option<serde_json::Value> {
        serde_json::to_value(value.downcast_ref::<ProfileData>()?).ok()
    }

    fn decode(&self, value: serde_json::Value) -> Option<AddonValue> {
        let data: ProfileData = serde_json::from_value(value).ok()?;
        Some(Arc::new(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::RepoFixture;

    #[test]
    fn test_resolve_relative_and_parents() {
        assert_eq!(
            resolve_relative("default/linux/amd64", "../../../base").as_deref(),
            Some("base")
        );
        assert_eq!(resolve_relative("base", "../../x"), None);
        let parents: Vec<_> = dir_parents("a/b/c").collect();
        assert_eq!(parents, vec!["a/b/c", "a/b", "a"]);
    }

    #[test]
    fn test_load_profiles_tree() {
        let repo = RepoFixture::new()
            .file("profiles/categories", "dev-libs\n# comment\napp-misc\n")
            .file("profiles/arch.list", "amd64\nx86\n")
            .file("profiles/profiles.desc", "amd64 default/amd64 stable\n")
            .file("profiles/use.desc", "ssl - Enable SSL\n")
            .file("profiles/use.local.desc", "dev-libs/foo:bar - Local\n")
            .file("profiles/desc/python_targets.desc", "python3_12 - Python\n")
            .file("profiles/base/eapi", "8\n")
            .file("profiles/base/use.mask", "ssl\n-doc\n")
            .file("profiles/default/amd64/parent", "../../base\n")
            .file("profiles/default/amd64/eapi", "5\n")
            .file("profiles/package.mask", ">=dev-libs/foo-2\n")
            .ebuild("dev-libs/foo", "1", "EAPI=8\n");
        let data = ProfileData::load(repo.root()).unwrap();
        assert_eq!(data.categories, vec!["dev-libs", "app-misc"]);
        assert!(data.arches.contains("x86"));
        assert_eq!(data.profiles[0].path, "default/amd64");
        assert!(data.global_use.contains("ssl"));
        assert!(data.local_use["dev-libs/foo"].contains("bar"));
        assert!(data.use_expand.contains("python_targets_python3_12"));
        assert!(data.category_dirs.contains("dev-libs"));
        assert!(!data.category_dirs.contains("profiles"));
        assert_eq!(data.stack("default/amd64"), vec!["base", "default/amd64"]);
        assert_eq!(data.eapi("default/amd64"), "5");
        assert_eq!(data.eapi("default"), "0");
        assert!(data.dirs.contains("default"));
        let use_mask = data
            .entries
            .iter()
            .find(|e| e.file == "base/use.mask" && e.line == 2)
            .unwrap();
        assert_eq!(use_mask.tokens, vec!["-doc"]);
        assert!(data.entries.iter().any(|e| e.file == "package.mask"));
    }

    #[test]
    fn test_malformed_desc_and_deprecated_profiles() {
        let repo = RepoFixture::new()
            .file(
                "profiles/profiles.desc",
                "amd64 default/amd64 stable
amd64 default/old
# note
",
            )
            .file("profiles/default/amd64/eapi", "8
")
            .file(
                "profiles/default/old/deprecated",
                "default/amd64/
Switch to the new profile.
",
            );
        let data = ProfileData::load(repo.root()).unwrap();
        assert_eq!(data.profiles.len(), 1);
        assert_eq!(
            data.malformed_desc,
            vec![MalformedDesc {
                line: 2,
                text: "amd64 default/old".into()
            }]
        );
        assert_eq!(data.deprecated["default/old"], "default/amd64");
        assert_eq!(data.deprecated.len(), 1);
    }

    #[test]
    fn test_missing_profiles_dir_fails() {
        let repo = RepoFixture::new();
        assert!(matches!(
            ProfileData::load(repo.root()),
            Err(AddonError::Failed { .. })
        ));
    }
}
