//! Addressable repository entities produced by the enumerator.

use super::scope::Scope;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Stable identity of a unit.
pub enum UnitId {
    Version {
        category: String,
        package: String,
        version: String,
    },
    Package {
        category: String,
        package: String,
    },
    Category(String),
    Repository,
    Commit(String),
}

impl UnitId {
    pub fn scope(&self) -> Scope {
        match self {
            UnitId::Version { .. } => Scope::Version,
            UnitId::Package { .. } => Scope::Package,
            UnitId::Category(_) => Scope::Category,
            UnitId::Repository => Scope::Repository,
            UnitId::Commit(_) => Scope::Commit,
        }
    }

    /// `cat/pkg` key for version and package units.
    pub fn package_key(&self) -> Option<String> {
        match self {
            UnitId::Version {
                category, package, ..
            }
            | UnitId::Package { category, package } => Some(format!("{category}/{package}")),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            UnitId::Version { category, .. }
            | UnitId::Package { category, .. }
            | UnitId::Category(category) => Some(category),
            _ => None,
        }
    }

    /// Identity of the enclosing unit in the tree hierarchy.
    pub fn parent(&self) -> Option<UnitId> {
        match self {
            UnitId::Version {
                category, package, ..
            } => Some(UnitId::Package {
                category: category.clone(),
                package: package.clone(),
            }),
            UnitId::Package { category, .. } => Some(UnitId::Category(category.clone())),
            UnitId::Category(_) => Some(UnitId::Repository),
            UnitId::Repository | UnitId::Commit(_) => None,
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitId::Version {
                category,
                package,
                version,
            } => write!(f, "{category}/{package}-{version}"),
            UnitId::Package { category, package } => write!(f, "{category}/{package}"),
            UnitId::Category(c) => f.write_str(c),
            UnitId::Repository => f.write_str("repository"),
            UnitId::Commit(hash) => write!(f, "commit:{hash}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One unit of a scan. Immutable once yielded by the enumerator.
pub struct Unit {
    pub id: UnitId,
    /// Filesystem location: the ebuild for versions, the directory otherwise.
    pub path: PathBuf,
    /// Lookup-only reference to the enclosing unit.
    pub parent: Option<UnitId>,
    /// Number of direct children enumerated before this unit.
    pub children: usize,
}

impl Unit {
    pub fn new(id: UnitId, path: PathBuf, children: usize) -> Self {
        let parent = id.parent();
        Self {
            id,
            path,
            parent,
            children,
        }
    }

    pub fn scope(&self) -> Scope {
        self.id.scope()
    }
}
