//! Dependency expression checks.

use super::{Check, CheckContext};
use crate::addons::packages::PackageIndex;
use crate::addons::AddonId;
use crate::error::CheckError;
use crate::metadata::depend::{parse_depend, parse_required_use, Atom, DepNode};
use crate::metadata::{VersionMetadata, DEPEND_KEYS};
use crate::models::{Issue, Scope, Severity};
use regex::{Captures, Regex};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

pub const MISSING_USE_DEP_DEFAULT: &str = "MissingUseDepDefault";
pub const UNSTATED_IUSE: &str = "UnstatedIuse";
pub const BAD_DEPENDENCY: &str = "BadDependency";

/// USE_EXPAND groups profiles set implicitly; never required in IUSE.
const IMPLICIT_PREFIXES: &[&str] = &["elibc_", "kernel_", "userland_", "abi_"];

fn ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("static variable reference regex")
    })
}

/// Resolve references to sibling dependency variables one level deep and
/// drop every other reference, along with the `[`/`,` punctuation an empty
/// use dependency leaves behind.
pub fn expand_refs(value: &str, depends: &BTreeMap<&'static str, String>) -> String {
    let once = ref_re().replace_all(value, |c: &Captures<'_>| {
        depends.get(&c[1]).cloned().unwrap_or_default()
    });
    let mut out = ref_re().replace_all(&once, "").into_owned();
    loop {
        let next = out
            .replace("[]", "")
            .replace("[,", "[")
            .replace(",]", "]")
            .replace(",,", ",");
        if next == out {
            return out;
        }
        out = next;
    }
}

pub struct DependencyCheck;

impl DependencyCheck {
    fn unstated(
        &self,
        ctx: &CheckContext<'_>,
        metadata: &VersionMetadata,
        var: &str,
        flags: impl IntoIterator<Item = String>,
    ) -> Option<Issue> {
        let missing: BTreeSet<String> = flags
            .into_iter()
            .filter(|f| !metadata.has_flag(f))
            .filter(|f| !IMPLICIT_PREFIXES.iter().any(|p| f.starts_with(p)))
            .collect();
        if missing.is_empty() {
            return None;
        }
        let list: Vec<_> = missing.into_iter().collect();
        Some(
            Issue::new(
                self.name(),
                UNSTATED_IUSE,
                ctx.unit,
                Severity::Error,
                format!("{var}: unstated flag(s): {}", list.join(", ")),
            )
            .at(line_of(metadata, var), 1),
        )
    }

    fn missing_defaults(
        &self,
        ctx: &CheckContext<'_>,
        index: &PackageIndex,
        var: &str,
        atoms: &[&Atom],
        line: usize,
        out: &mut Vec<Issue>,
    ) {
        let mut reported = BTreeSet::new();
        for atom in atoms.iter().filter(|a| !a.blocker) {
            let key = atom.key();
            let targets: Vec<_> = index
                .versions(&key)
                .iter()
                .filter(|v| v.parsed().is_some_and(|p| atom.matches_version(&p)))
                .collect();
            for dep in atom.use_deps.iter().filter(|d| d.default.is_none()) {
                let lacking: Vec<&str> = targets
                    .iter()
                    .filter(|v| !v.has_flag(&dep.flag))
                    .map(|v| v.version.as_str())
                    .collect();
                if lacking.is_empty() || !reported.insert((key.clone(), dep.flag.clone())) {
                    continue;
                }
                out.push(
                    Issue::new(
                        self.name(),
                        MISSING_USE_DEP_DEFAULT,
                        ctx.unit,
                        Severity::Warning,
                        format!(
                            "{var}: {key}[{flag}]: USE flag '{flag}' missing from version(s): {}",
                            lacking.join(", "),
                            flag = dep.flag,
                        ),
                    )
                    .at(line, 1),
                );
            }
        }
    }
}

fn line_of(metadata: &VersionMetadata, var: &str) -> usize {
    metadata.var_lines.get(var).copied().unwrap_or(1)
}

impl Check for DependencyCheck {
    fn name(&self) -> &'static str {
        "DependencyCheck"
    }

    fn category(&self) -> &'static str {
        "depend"
    }

    fn scope(&self) -> Scope {
        Scope::Version
    }

    fn required_addons(&self) -> &'static [AddonId] {
        &[AddonId::PACKAGES]
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[MISSING_USE_DEP_DEFAULT, UNSTATED_IUSE, BAD_DEPENDENCY]
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let metadata = ctx.metadata()?;
        let index = ctx.addon::<PackageIndex>(AddonId::PACKAGES)?;
        let mut out = Vec::new();

        for var in DEPEND_KEYS {
            let Some(raw) = metadata.depends.get(var) else {
                continue;
            };
            let line = line_of(metadata, var);
            let nodes = match parse_depend(&expand_refs(raw, &metadata.depends)) {
                Ok(nodes) => nodes,
                Err(err) => {
                    out.push(
                        Issue::new(
                            self.name(),
                            BAD_DEPENDENCY,
                            ctx.unit,
                            Severity::Error,
                            format!("{var}: {err}"),
                        )
                        .at(line, 1),
                    );
                    continue;
                }
            };
            let mut conditionals = Vec::new();
            DepNode::conditionals(&nodes, &mut conditionals);
            out.extend(self.unstated(ctx, metadata, var, conditionals.into_iter().map(str::to_string)));

            let mut atoms = Vec::new();
            DepNode::leaves(&nodes, &mut atoms);
            self.missing_defaults(ctx, &index, var, &atoms, line, &mut out);
        }

        if !metadata.required_use.trim().is_empty() {
            let expanded = expand_refs(&metadata.required_use, &metadata.depends);
            match parse_required_use(&expanded) {
                Ok(nodes) => {
                    let mut flags: Vec<String> = Vec::new();
                    let mut conditionals = Vec::new();
                    DepNode::conditionals(&nodes, &mut conditionals);
                    flags.extend(conditionals.into_iter().map(str::to_string));
                    let mut leaves = Vec::new();
                    DepNode::leaves(&nodes, &mut leaves);
                    flags.extend(leaves.into_iter().map(|f| f.trim_start_matches('!').to_string()));
                    out.extend(self.unstated(ctx, metadata, "REQUIRED_USE", flags));
                }
                Err(err) => out.push(
                    Issue::new(
                        self.name(),
                        BAD_DEPENDENCY,
                        ctx.unit,
                        Severity::Error,
                        format!("REQUIRED_USE: {err}"),
                    )
                    .at(line_of(metadata, "REQUIRED_USE"), 1),
                ),
            }
        }
        Ok(out)
    }
}
