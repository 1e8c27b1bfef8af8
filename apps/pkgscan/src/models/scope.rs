//! Scope hierarchy: `Version ⊂ Package ⊂ Category ⊂ Repository`, plus the
//! orthogonal `Commit` scope used by change-based checks.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
/// Granularity at which a check runs and an issue is attributed.
pub enum Scope {
    Commit,
    Version,
    Package,
    Category,
    Repository,
}

impl Scope {
    /// All scopes in canonical order.
    pub const ALL: [Scope; 5] = [
        Scope::Commit,
        Scope::Version,
        Scope::Package,
        Scope::Category,
        Scope::Repository,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Commit => "commit",
            Scope::Version => "version",
            Scope::Package => "package",
            Scope::Category => "category",
            Scope::Repository => "repository",
        }
    }

    /// Position in the tree hierarchy; `None` for the orthogonal commit scope.
    fn level(self) -> Option<u8> {
        match self {
            Scope::Commit => None,
            Scope::Version => Some(0),
            Scope::Package => Some(1),
            Scope::Category => Some(2),
            Scope::Repository => Some(3),
        }
    }

    /// True when units of `other` are nested inside units of `self`
    /// (a scope contains itself).
    pub fn contains(self, other: Scope) -> bool {
        match (self.level(), other.level()) {
            (Some(a), Some(b)) => a >= b,
            _ => self == other,
        }
    }

    /// Direct child scope in the tree hierarchy.
    pub fn child(self) -> Option<Scope> {
        match self {
            Scope::Package => Some(Scope::Version),
            Scope::Category => Some(Scope::Package),
            Scope::Repository => Some(Scope::Category),
            Scope::Version | Scope::Commit => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scope::ALL
            .iter()
            .copied()
            .find(|sc| sc.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown scope: {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_containment() {
        assert!(Scope::Repository.contains(Scope::Version));
        assert!(Scope::Package.contains(Scope::Version));
        assert!(Scope::Package.contains(Scope::Package));
        assert!(!Scope::Version.contains(Scope::Package));
        assert!(!Scope::Repository.contains(Scope::Commit));
        assert!(Scope::Commit.contains(Scope::Commit));
        assert_eq!(Scope::Category.child(), Some(Scope::Package));
    }

    #[test]
    fn test_parse_scope() {
        assert_eq!("Package".parse::<Scope>(), Ok(Scope::Package));
        assert!("foo".parse::<Scope>().is_err());
    }
}
