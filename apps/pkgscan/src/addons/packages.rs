//! Repository-wide package index.

use super::{Addon, AddonContext, AddonId, AddonValue};
use crate::error::AddonError;
use crate::metadata::version::{split_package_version, Version};
use crate::metadata::{IuseFlag, MetadataProvider};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    pub iuse: Vec<IuseFlag>,
    pub keywords: Vec<String>,
}

impl PackageVersion {
    pub fn parsed(&self) -> Option<Version> {
        Version::parse(&self.version)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.iuse.iter().any(|f| f.name == flag)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// `cat/pkg` to versions sorted oldest first.
pub struct PackageIndex {
    pub packages: BTreeMap<String, Vec<PackageVersion>>,
}

impl PackageIndex {
    /// Scan `root` for `cat/pkg/pkg-ver.ebuild` files and load them in parallel.
    /// Files that fail to load are left out; their units report it.
    pub fn build(root: &Path, provider: &dyn MetadataProvider) -> Self {
        let found = ebuild_files(root);
        let loaded: Vec<(String, Version, PackageVersion)> = found
            .par_iter()
            .filter_map(|(key, version, path)| {
                let md = match provider.load(path) {
                    Ok(md) => md,
                    Err(err) => {
                        tracing::debug!(%err, "skipping unreadable ebuild in package index");
                        return None;
                    }
                };
                Some((
                    key.clone(),
                    version.clone(),
                    PackageVersion {
                        version: version.as_str().to_string(),
                        iuse: md.iuse,
                        keywords: md.keywords,
                    },
                ))
            })
            .collect();

        let mut grouped: BTreeMap<String, Vec<(Version, PackageVersion)>> = BTreeMap::new();
        for (key, version, entry) in loaded {
            grouped.entry(key).or_default().push((version, entry));
        }
        let packages = grouped
            .into_iter()
            .map(|(key, mut versions)| {
                versions.sort_by(|a, b| a.0.cmp(&b.0));
                (key, versions.into_iter().map(|(_, v)| v).collect())
            })
            .collect();
        Self { packages }
    }

    pub fn versions(&self, key: &str) -> &[PackageVersion] {
        self.packages.get(key).map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.packages.contains_key(key)
    }
}

/// Every well-named ebuild under `root` as `(cat/pkg, version, path)`.
pub fn ebuild_files(root: &Path) -> Vec<(String, Version, PathBuf)> {
    let opts = glob::MatchOptions {
        require_literal_leading_dot: true,
        ..Default::default()
    };
    let pattern = root.join("*/*/*.ebuild").to_string_lossy().to_string();
    let Ok(paths) = glob::glob_with(&pattern, opts) else {
        return Vec::new();
    };
    paths
        .flatten()
        .filter_map(|path| {
            let stem = path.file_stem()?.to_str()?;
            let pkg_dir = path.parent()?;
            let pkg = pkg_dir.file_name()?.to_str()?;
            let cat = pkg_dir.parent()?.file_name()?.to_str()?;
            let (name, ver) = split_package_version(stem)?;
            if name != pkg {
                return None;
            }
            let version = Version::parse(ver)?;
            Some((format!("{cat}/{pkg}"), version, path.clone()))
        })
        .collect()
}

pub struct PackagesAddon;

impl Addon for PackagesAddon {
    fn id(&self) -> AddonId {
        AddonId::PACKAGES
    }

    fn compute(&self, ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError> {
        let index = PackageIndex::build(ctx.repo_root, ctx.provider);
        tracing::debug!(packages = index.packages.len(), "package index built");
        Ok(Arc::new(index))
    }

    fn persist_version(&self) -> Option<u32> {
        Some(1)
    }

    fn encode(&self, value: &AddonValue) -> Option<serde_json::Value> {
        let index = value.downcast_ref::<PackageIndex>()?;
        serde_json::to_value(index).ok()
    }

    fn decode(&self, value: serde_json::Value) -> Option<AddonValue> {
        let index: PackageIndex = serde_json::from_value(value).ok()?;
        Some(Arc::new(index))
    }
}
