//! Package-metadata provider interface.
//!
//! The scanner treats metadata extraction as an external collaborator: given
//! a version unit's file it needs dependency expressions, declared USE flags
//! with defaults and the raw script text. `EbuildProvider` is the built-in
//! implementation.

pub mod depend;
pub mod ebuild;
pub mod version;

pub use ebuild::EbuildProvider;

use crate::error::MetadataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Dependency variables read from every version.
pub const DEPEND_KEYS: &[&str] = &["DEPEND", "BDEPEND", "RDEPEND", "PDEPEND", "IDEPEND"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// An IUSE entry with its optional `+`/`-` default.
pub struct IuseFlag {
    pub name: String,
    pub default: Option<bool>,
}

#[derive(Debug, Clone, Default)]
/// Parsed metadata for one version unit.
pub struct VersionMetadata {
    pub eapi: String,
    pub inherit: Vec<String>,
    pub iuse: Vec<IuseFlag>,
    pub keywords: Vec<String>,
    pub slot: String,
    /// Raw dependency expressions keyed by variable name.
    pub depends: BTreeMap<&'static str, String>,
    pub required_use: String,
    /// First line on which each top-level variable is assigned.
    pub var_lines: BTreeMap<String, usize>,
    /// Embedded script text handed to the shell analyzer.
    pub script: String,
}

impl VersionMetadata {
    pub fn has_flag(&self, flag: &str) -> bool {
        self.iuse.iter().any(|f| f.name == flag)
    }

    pub fn inherits(&self, eclass: &str) -> bool {
        self.inherit.iter().any(|e| e == eclass)
    }

    /// Numeric EAPI, or `None` for non-numeric values.
    pub fn eapi_number(&self) -> Option<u32> {
        self.eapi.parse().ok()
    }
}

/// Source of per-version package metadata.
pub trait MetadataProvider: Send + Sync {
    fn load(&self, path: &Path) -> Result<VersionMetadata, MetadataError>;
}
