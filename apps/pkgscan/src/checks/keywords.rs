//! Keyword continuity across the versions of a package.

use super::{stable_arch, Check, CheckContext};
use crate::addons::packages::PackageIndex;
use crate::addons::AddonId;
use crate::error::CheckError;
use crate::models::{Issue, Scope, Severity};
use std::collections::BTreeSet;

pub const DROPPED_KEYWORDS: &str = "DroppedKeywords";

/// Live ebuilds carry no keywords by convention.
fn is_live(version: &str) -> bool {
    version.starts_with("9999")
}

pub struct KeywordsCheck;

impl Check for KeywordsCheck {
    fn name(&self) -> &'static str {
        "KeywordsCheck"
    }

    fn category(&self) -> &'static str {
        "keywords"
    }

    fn scope(&self) -> Scope {
        Scope::Package
    }

    fn required_addons(&self) -> &'static [AddonId] {
        &[AddonId::PACKAGES]
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[DROPPED_KEYWORDS]
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let Some(key) = ctx.unit.id.package_key() else {
            return Ok(Vec::new());
        };
        let index = ctx.addon::<PackageIndex>(AddonId::PACKAGES)?;
        let versions: Vec<_> = index
            .versions(&key)
            .iter()
            .filter(|v| !is_live(&v.version))
            .collect();
        let Some((newest, older)) = versions.split_last() else {
            return Ok(Vec::new());
        };
        if newest.keywords.iter().any(|k| k == "-*") {
            return Ok(Vec::new());
        }

        let seen: BTreeSet<&str> = older
            .iter()
            .flat_map(|v| v.keywords.iter())
            .filter(|k| !k.starts_with('-') && !k.contains('*'))
            .map(|k| stable_arch(k))
            .collect();
        let current: BTreeSet<&str> = newest
            .keywords
            .iter()
            .map(|k| k.trim_start_matches(['~', '-']))
            .collect();
        let dropped: Vec<&str> = seen.difference(&current).copied().collect();
        if dropped.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Issue::new(
            self.name(),
            DROPPED_KEYWORDS,
            ctx.unit,
            Severity::Warning,
            format!(
                "{key}-{}: dropped keyword(s): {}",
                newest.version,
                dropped.join(", ")
            ),
        )])
    }
}
