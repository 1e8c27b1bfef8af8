//! Unit enumeration.
//!
//! Units are yielded in post-order so every parent follows its children:
//! the versions of a package (oldest first), the package, then the next
//! package; a category after all its packages; the repository last. Commit
//! units, when supplied, follow the repository.

use crate::error::ConfigError;
use crate::metadata::version::{split_package_version, Version};
use crate::models::{Unit, UnitId};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level directories that never hold packages.
pub const NON_CATEGORY_DIRS: &[&str] = &[
    "profiles", "metadata", "eclass", "licenses", "scripts", "distfiles", "packages",
];

pub fn is_category_dir(name: &str) -> bool {
    !name.starts_with('.') && !NON_CATEGORY_DIRS.contains(&name)
}

/// Ordered, restartable sequence of units.
pub trait UnitSource: Send + Sync {
    fn units(&self) -> Box<dyn Iterator<Item = Unit> + Send + '_>;
}

impl UnitSource for Vec<Unit> {
    fn units(&self) -> Box<dyn Iterator<Item = Unit> + Send + '_> {
        Box::new(self.iter().cloned())
    }
}

#[derive(Debug, Clone, Default)]
/// Caller-supplied target patterns over `cat/pkg` and `cat` keys.
pub struct Restriction {
    patterns: Vec<glob::Pattern>,
}

impl Restriction {
    pub fn new(targets: &[String]) -> Result<Self, ConfigError> {
        let patterns = targets
            .iter()
            .map(|t| {
                let t = t.trim_end_matches('/');
                glob::Pattern::new(t).map_err(|e| ConfigError::InvalidTarget {
                    pattern: t.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn allows_category(&self, category: &str) -> bool {
        self.is_empty() || self.patterns.iter().any(|p| p.matches(category))
    }

    /// A package is in scope when its key or its category is targeted.
    pub fn allows_package(&self, category: &str, package: &str) -> bool {
        let key = format!("{category}/{package}");
        self.allows_category(category) || self.patterns.iter().any(|p| p.matches(&key))
    }
}

/// Walks an on-disk repository.
pub struct RepoSource {
    root: PathBuf,
    restriction: Restriction,
    commits: Vec<String>,
}

impl RepoSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            restriction: Restriction::default(),
            commits: Vec::new(),
        }
    }

    pub fn with_restriction(mut self, restriction: Restriction) -> Self {
        self.restriction = restriction;
        self
    }

    /// Append commit units after the repository unit.
    pub fn with_commits(mut self, commits: Vec<String>) -> Self {
        self.commits = commits;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn categories(&self) -> Vec<String> {
        sorted_dirs(&self.root)
            .into_iter()
            .filter(|c| is_category_dir(c))
            .collect()
    }

    /// Post-ordered units of one category.
    fn category_units(&self, category: &str) -> Vec<Unit> {
        let cat_dir = self.root.join(category);
        let mut out = Vec::new();
        let mut packages = 0;
        for package in sorted_dirs(&cat_dir) {
            if !self.restriction.allows_package(category, &package) {
                continue;
            }
            let pkg_dir = cat_dir.join(&package);
            let versions = package_versions(&pkg_dir, &package);
            let children = versions.len();
            for (version, path) in versions {
                out.push(Unit::new(
                    UnitId::Version {
                        category: category.to_string(),
                        package: package.clone(),
                        version: version.as_str().to_string(),
                    },
                    path,
                    0,
                ));
            }
            out.push(Unit::new(
                UnitId::Package {
                    category: category.to_string(),
                    package,
                },
                pkg_dir,
                children,
            ));
            packages += 1;
        }
        if self.restriction.allows_category(category) {
            out.push(Unit::new(
                UnitId::Category(category.to_string()),
                cat_dir,
                packages,
            ));
        }
        out
    }
}

impl UnitSource for RepoSource {
    fn units(&self) -> Box<dyn Iterator<Item = Unit> + Send + '_> {
        let categories = self.categories();
        let repo = self.restriction.is_empty().then(|| {
            Unit::new(UnitId::Repository, self.root.clone(), categories.len())
        });
        let commits = self
            .commits
            .iter()
            .map(|hash| Unit::new(UnitId::Commit(hash.clone()), self.root.clone(), 0));
        Box::new(
            categories
                .into_iter()
                .flat_map(move |cat| self.category_units(&cat))
                .chain(repo)
                .chain(commits),
        )
    }
}

fn sorted_dirs(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// `<pkg>-<ver>.ebuild` files of a package directory, oldest version first.
fn package_versions(pkg_dir: &Path, package: &str) -> Vec<(Version, PathBuf)> {
    let Ok(entries) = fs::read_dir(pkg_dir) else {
        return Vec::new();
    };
    let mut versions: Vec<(Version, PathBuf)> = entries
        .flatten()
        .map(|e| e.path())
        .filter_map(|path| {
            if path.extension()? != "ebuild" {
                return None;
            }
            let stem = path.file_stem()?.to_str()?;
            let (name, ver) = split_package_version(stem)?;
            if name != package {
                return None;
            }
            Some((Version::parse(ver)?, path))
        })
        .collect();
    versions.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    versions
}
