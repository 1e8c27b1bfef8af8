//! Python eclass usage.

use super::depend::expand_refs;
use super::{Check, CheckContext};
use crate::error::CheckError;
use crate::metadata::depend::{parse_depend, parse_required_use, Atom, DepNode};
use crate::metadata::{VersionMetadata, DEPEND_KEYS};
use crate::models::{Issue, Scope, Severity};
use std::collections::BTreeSet;

pub const MISSING_PYTHON_ECLASS: &str = "MissingPythonEclass";
pub const PYTHON_MISSING_REQUIRED_USE: &str = "PythonMissingRequiredUse";
pub const PYTHON_SINGLE_USE_MISMATCH: &str = "PythonSingleUseMismatch";

const TARGET_PREFIX: &str = "python_targets_";
const SINGLE_PREFIX: &str = "python_single_target_";
const ECLASSES: &[&str] = &["python-r1", "python-single-r1", "python-any-r1"];

fn is_interpreter(atom: &Atom) -> bool {
    match (atom.category.as_str(), atom.package.as_str()) {
        ("dev-lang", "python") => true,
        ("dev-python", pkg) => pkg.starts_with("pypy"),
        _ => false,
    }
}

fn flags_with_prefix(metadata: &VersionMetadata, prefix: &str) -> BTreeSet<String> {
    metadata
        .iuse
        .iter()
        .filter_map(|f| f.name.strip_prefix(prefix))
        .map(str::to_string)
        .collect()
}

/// Whether a top-level `|| ( ... )` (or `^^ ( ... )` when `exactly_one`)
/// group lists exactly `flags`. A single flag may also stand alone.
fn has_group(nodes: &[DepNode<String>], flags: &BTreeSet<String>, exactly_one: bool) -> bool {
    nodes.iter().any(|node| match node {
        DepNode::Leaf(flag) => flags.len() == 1 && flags.contains(flag),
        DepNode::AnyOf(children) if !exactly_one => group_flags(children).as_ref() == Some(flags),
        DepNode::ExactlyOne(children) if exactly_one => {
            group_flags(children).as_ref() == Some(flags)
        }
        _ => false,
    })
}

fn group_flags(children: &[DepNode<String>]) -> Option<BTreeSet<String>> {
    children
        .iter()
        .map(|c| match c {
            DepNode::Leaf(flag) => Some(flag.clone()),
            _ => None,
        })
        .collect()
}

pub struct PythonCheck;

impl PythonCheck {
    fn missing_eclass(&self, ctx: &CheckContext<'_>, metadata: &VersionMetadata) -> Option<Issue> {
        let mut found = None;
        for var in DEPEND_KEYS {
            let Some(raw) = metadata.depends.get(var) else {
                continue;
            };
            let Ok(nodes) = parse_depend(&expand_refs(raw, &metadata.depends)) else {
                continue;
            };
            let mut atoms = Vec::new();
            DepNode::leaves(&nodes, &mut atoms);
            if let Some(atom) = atoms.into_iter().find(|a| !a.blocker && is_interpreter(a)) {
                found = Some((*var, atom.key()));
            }
        }
        let (var, key) = found?;
        let recommended = match var {
            "RDEPEND" | "PDEPEND" => "python-r1 or python-single-r1",
            _ => "python-any-r1",
        };
        Some(
            Issue::new(
                self.name(),
                MISSING_PYTHON_ECLASS,
                ctx.unit,
                Severity::Warning,
                format!("missing {recommended} eclass usage for {var} on {key}"),
            )
            .at(metadata.var_lines.get(var).copied().unwrap_or(1), 1),
        )
    }

    fn missing_required_use(&self, ctx: &CheckContext<'_>, metadata: &VersionMetadata) -> Issue {
        let line = metadata
            .var_lines
            .get("REQUIRED_USE")
            .or_else(|| metadata.var_lines.get("IUSE"))
            .copied()
            .unwrap_or(1);
        Issue::new(
            self.name(),
            PYTHON_MISSING_REQUIRED_USE,
            ctx.unit,
            Severity::Warning,
            "missing REQUIRED_USE=\"${PYTHON_REQUIRED_USE}\"",
        )
        .at(line, 1)
    }
}

impl Check for PythonCheck {
    fn name(&self) -> &'static str {
        "PythonCheck"
    }

    fn category(&self) -> &'static str {
        "python"
    }

    fn scope(&self) -> Scope {
        Scope::Version
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[
            MISSING_PYTHON_ECLASS,
            PYTHON_MISSING_REQUIRED_USE,
            PYTHON_SINGLE_USE_MISMATCH,
        ]
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let metadata = ctx.metadata()?;
        let Some(eclass) = ECLASSES.iter().find(|e| metadata.inherits(e)) else {
            return Ok(self.missing_eclass(ctx, metadata).into_iter().collect());
        };
        // the eclass-provided value cannot be expanded statically
        if metadata.required_use.contains("PYTHON_REQUIRED_USE") {
            return Ok(Vec::new());
        }
        let required = parse_required_use(&metadata.required_use).unwrap_or_default();
        let targets = flags_with_prefix(metadata, TARGET_PREFIX);

        match *eclass {
            "python-r1" => {
                if targets.is_empty() {
                    return Ok(Vec::new());
                }
                let flags = targets.iter().map(|t| format!("{TARGET_PREFIX}{t}")).collect();
                if !has_group(&required, &flags, false) {
                    return Ok(vec![self.missing_required_use(ctx, metadata)]);
                }
            }
            "python-single-r1" => {
                let singles = flags_with_prefix(metadata, SINGLE_PREFIX);
                if singles.is_empty() && targets.len() <= 1 {
                    return Ok(Vec::new());
                }
                if singles != targets {
                    let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(" ");
                    return Ok(vec![Issue::new(
                        self.name(),
                        PYTHON_SINGLE_USE_MISMATCH,
                        ctx.unit,
                        Severity::Warning,
                        format!(
                            "mismatched flags in IUSE: PYTHON_TARGETS=( {} ) and PYTHON_SINGLE_TARGET=( {} )",
                            join(&targets),
                            join(&singles)
                        ),
                    )
                    .at(metadata.var_lines.get("IUSE").copied().unwrap_or(1), 1)]);
                }
                let flags = singles.iter().map(|t| format!("{SINGLE_PREFIX}{t}")).collect();
                if !has_group(&required, &flags, true) {
                    return Ok(vec![self.missing_required_use(ctx, metadata)]);
                }
            }
            _ => {}
        }
        Ok(Vec::new())
    }
}
