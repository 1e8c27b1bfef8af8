//! Shared data models: scopes, units, and the issues a scan produces.

pub mod scope;
pub mod unit;

pub use scope::Scope;
pub use unit::{Unit, UnitId};

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
/// Severity class of an issue.
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// 1-based line and column inside a unit's file or script.
pub struct Location {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// A single diagnostic attributed to a unit.
pub struct Issue {
    pub check: &'static str,
    pub kind: &'static str,
    pub scope: Scope,
    pub unit: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Issue {
    pub fn new(
        check: &'static str,
        kind: &'static str,
        unit: &Unit,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check,
            kind,
            scope: unit.scope(),
            unit: unit.id.to_string(),
            severity,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.location = Some(Location { line, column });
        self
    }
}

/// Result kinds emitted by the scheduler itself rather than by a check.
pub mod internal {
    pub const INTERNAL_ERROR: &str = "InternalError";
    pub const SKIPPED_CHECK: &str = "SkippedCheck";
    pub const UNREADABLE_UNIT: &str = "UnreadableUnit";
    /// Check name used for issues not owned by any registered check.
    pub const SCANNER: &str = "scanner";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
/// Aggregated scan counters handed to the sink at the end of the stream.
pub struct ScanSummary {
    pub units: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
    pub cancelled: bool,
}

impl ScanSummary {
    pub fn record(&mut self, issue: &Issue) {
        match issue.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info => self.infos += 1,
        }
    }
}
