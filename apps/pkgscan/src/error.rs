//! Error types shared across the scanner.
//!
//! Only [`ConfigError`] is fatal: it is raised while building the registry or
//! resolving a scan plan, before any unit is processed. Every other error is
//! converted into an [`Issue`](crate::models::Issue) by the scheduler.

use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration errors (cyclic addon graph, unknown check, ...).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown check: {0:?}")]
    UnknownCheck(String),

    #[error("check {check:?} requires unknown addon {addon:?}")]
    UnknownAddon { check: String, addon: String },

    #[error("addon {addon:?} depends on unknown addon {dependency:?}")]
    UnknownAddonDependency { addon: String, dependency: String },

    #[error("addon dependency cycle: {}", .0.join(" -> "))]
    AddonCycle(Vec<String>),

    #[error("duplicate check name: {0:?}")]
    DuplicateCheck(String),

    #[error("no active checks")]
    NoActiveChecks,

    #[error("invalid target pattern {pattern:?}: {reason}")]
    InvalidTarget { pattern: String, reason: String },

    #[error("invalid config file {path}: {reason}")]
    InvalidConfig { path: PathBuf, reason: String },
}

/// Failure to load package metadata for a unit.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: unterminated value for {var}")]
    Unterminated { path: PathBuf, var: String },
}

/// Outcome of an addon computation that did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddonError {
    /// The addon raised a fault; dependent checks are skipped for the scan.
    #[error("addon {addon} failed: {reason}")]
    Failed { addon: String, reason: String },

    /// The addon's source is unavailable or turned off.
    #[error("addon {addon} disabled: {reason}")]
    Disabled { addon: String, reason: String },
}

impl AddonError {
    pub fn failed(addon: &str, reason: impl Into<String>) -> Self {
        Self::Failed {
            addon: addon.to_string(),
            reason: reason.into(),
        }
    }

    pub fn disabled(addon: &str, reason: impl Into<String>) -> Self {
        Self::Disabled {
            addon: addon.to_string(),
            reason: reason.into(),
        }
    }
}

/// Fault raised by a check for one unit.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("missing addon value: {0}")]
    MissingAddon(&'static str),

    #[error("missing package metadata for {0}")]
    MissingMetadata(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Cache persistence failures; these only downgrade to recomputation.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}
