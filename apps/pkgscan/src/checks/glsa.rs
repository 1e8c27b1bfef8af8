//! Versions affected by security advisories.

use super::{stable_arch, Check, CheckContext};
use crate::addons::glsa::GlsaIndex;
use crate::addons::AddonId;
use crate::error::CheckError;
use crate::metadata::version::Version;
use crate::models::{Issue, Scope, Severity, UnitId};
use std::collections::BTreeSet;

pub const VULNERABLE_PACKAGE: &str = "VulnerablePackage";

pub struct GlsaCheck;

impl Check for GlsaCheck {
    fn name(&self) -> &'static str {
        "GlsaCheck"
    }

    fn category(&self) -> &'static str {
        "glsa"
    }

    fn scope(&self) -> Scope {
        Scope::Version
    }

    fn required_addons(&self) -> &'static [AddonId] {
        &[AddonId::GLSA]
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[VULNERABLE_PACKAGE]
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let UnitId::Version { version, .. } = &ctx.unit.id else {
            return Ok(Vec::new());
        };
        let (Some(key), Some(version)) = (ctx.unit.id.package_key(), Version::parse(version))
        else {
            return Ok(Vec::new());
        };
        let metadata = ctx.metadata()?;
        let index = ctx.addon::<GlsaIndex>(AddonId::GLSA)?;

        let keywords: BTreeSet<&str> = metadata
            .keywords
            .iter()
            .filter(|k| !k.starts_with('-'))
            .map(|k| stable_arch(k))
            .collect();
        let mut out = Vec::new();
        for vuln in index.for_package(&key) {
            if !vuln.affects(&version) {
                continue;
            }
            let mut arches: Vec<&str> = if vuln.arches.is_empty() {
                keywords.iter().copied().collect()
            } else {
                let hit: Vec<&str> = vuln
                    .arches
                    .iter()
                    .map(String::as_str)
                    .filter(|a| keywords.contains(a))
                    .collect();
                if hit.is_empty() {
                    continue;
                }
                hit
            };
            arches.sort_unstable();
            out.push(Issue::new(
                self.name(),
                VULNERABLE_PACKAGE,
                ctx.unit,
                Severity::Error,
                format!(
                    "vulnerable via {}, keyword(s): {}",
                    vuln.glsa,
                    arches.join(", ")
                ),
            ));
        }
        Ok(out)
    }
}
