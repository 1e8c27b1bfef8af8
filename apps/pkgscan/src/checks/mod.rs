//! Check catalog and the per-unit context checks run against.
//!
//! A check is a stateless rule bound to exactly one [`Scope`]. The scheduler
//! builds one [`CheckContext`] per unit and runs every applicable check on it,
//! so the script parse and metadata load happen once per unit no matter how
//! many checks look at them.

pub mod depend;
pub mod glsa;
pub mod keywords;
pub mod profiles;
pub mod python;
pub mod shell;

use crate::addons::{AddonId, AddonStore};
use crate::error::CheckError;
use crate::metadata::VersionMetadata;
use crate::models::{Issue, Scope, Unit};
use crate::shell::{Grammar, ParseFailure, SyntaxTree};
use std::any::Any;
use std::cell::OnceCell;
use std::path::Path;
use std::sync::Arc;

/// A named rule producing zero or more issues for a unit.
pub trait Check: Send + Sync {
    fn name(&self) -> &'static str;

    /// Grouping used by check selection (`shell`, `profiles`, ...).
    fn category(&self) -> &'static str;

    fn scope(&self) -> Scope;

    fn required_addons(&self) -> &'static [AddonId] {
        &[]
    }

    /// Every issue kind this check may emit.
    fn known_results(&self) -> &'static [&'static str];

    /// Package-scope checks that want the issues of their versions.
    fn needs_child_results(&self) -> bool {
        false
    }

    /// Checks that read the parsed script. They stay silent on scripts that
    /// fail to parse, so the planner always pairs them with a reporter.
    fn parses_script(&self) -> bool {
        false
    }

    /// The check that turns a parse failure into an issue.
    fn reports_parse_failures(&self) -> bool {
        false
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError>;
}

/// Everything a check may read while processing one unit.
pub struct CheckContext<'a> {
    pub unit: &'a Unit,
    pub repo_root: &'a Path,
    addons: &'a AddonStore,
    grammar: &'a dyn Grammar,
    metadata: Option<&'a VersionMetadata>,
    children: &'a [Issue],
    dispatched: usize,
    script: OnceCell<Result<SyntaxTree, ParseFailure>>,
}

impl<'a> CheckContext<'a> {
    pub fn new(
        unit: &'a Unit,
        repo_root: &'a Path,
        addons: &'a AddonStore,
        grammar: &'a dyn Grammar,
    ) -> Self {
        Self {
            unit,
            repo_root,
            addons,
            grammar,
            metadata: None,
            children: &[],
            dispatched: 0,
            script: OnceCell::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: &'a VersionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Child issues collected by the scheduler from `dispatched` child
    /// units.
    pub fn with_children(mut self, children: &'a [Issue], dispatched: usize) -> Self {
        self.children = children;
        self.dispatched = dispatched;
        self
    }

    /// Metadata of a version unit.
    pub fn metadata(&self) -> Result<&'a VersionMetadata, CheckError> {
        self.metadata
            .ok_or_else(|| CheckError::MissingMetadata(self.unit.id.to_string()))
    }

    /// The unit's script, parsed on first use and shared by later checks.
    pub fn script(&self) -> Result<&Result<SyntaxTree, ParseFailure>, CheckError> {
        let metadata = self.metadata()?;
        Ok(self
            .script
            .get_or_init(|| self.grammar.parse(&metadata.script)))
    }

    /// Value of a declared addon. The scheduler resolves addons before a
    /// check runs, so an error here means the check did not declare it.
    pub fn addon<T: Any + Send + Sync>(&self, id: AddonId) -> Result<Arc<T>, CheckError> {
        self.addons
            .value::<T>(id)
            .map_err(|_| CheckError::MissingAddon(id.as_str()))
    }

    /// Issues of the unit's children, in enumeration order.
    pub fn child_issues(&self) -> &'a [Issue] {
        self.children
    }

    /// Number of child units the scheduler actually ran before this one.
    pub fn child_count(&self) -> usize {
        self.dispatched
    }
}

/// The built-in catalog, in registration order.
pub fn builtin() -> Vec<Arc<dyn Check>> {
    vec![
        Arc::new(shell::ShellSyntaxCheck),
        Arc::new(shell::GlobCheck),
        Arc::new(shell::PathVariablesCheck),
        Arc::new(shell::EapiCommandsCheck),
        Arc::new(depend::DependencyCheck),
        Arc::new(python::PythonCheck),
        Arc::new(glsa::GlsaCheck),
        Arc::new(keywords::KeywordsCheck),
        Arc::new(shell::ShellSummaryCheck),
        Arc::new(profiles::CategoryCheck),
        Arc::new(profiles::RepoProfilesCheck),
        Arc::new(profiles::ProfilesCheck),
    ]
}

/// Drop the `~` testing marker from a keyword.
pub(crate) fn stable_arch(keyword: &str) -> &str {
    keyword.strip_prefix('~').unwrap_or(keyword)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Run one check against a fixture unit outside the scheduler.

    use super::*;
    use crate::addons::{self, AddonSettings};
    use crate::metadata::{EbuildProvider, MetadataProvider};
    use crate::models::UnitId;
    use crate::shell::BashGrammar;

    pub fn store(root: &Path) -> AddonStore {
        AddonStore::new(
            addons::builtin(),
            root,
            AddonSettings::default(),
            Arc::new(EbuildProvider),
        )
    }

    /// Run `check` on `cat/pkg-version` of the repository at `root`.
    pub fn run_version(check: &dyn Check, root: &Path, cat_pkg: &str, version: &str) -> Vec<Issue> {
        let (category, package) = cat_pkg.split_once('/').unwrap();
        let path = root
            .join(cat_pkg)
            .join(format!("{package}-{version}.ebuild"));
        let unit = Unit::new(
            UnitId::Version {
                category: category.into(),
                package: package.into(),
                version: version.into(),
            },
            path.clone(),
            0,
        );
        let metadata = EbuildProvider.load(&path).unwrap();
        let store = store(root);
        let ctx = CheckContext::new(&unit, root, &store, &BashGrammar).with_metadata(&metadata);
        check.run(&ctx).unwrap()
    }

    /// Run `check` on a non-version unit.
    pub fn run_unit(check: &dyn Check, root: &Path, unit: &Unit) -> Vec<Issue> {
        let store = store(root);
        let ctx = CheckContext::new(unit, root, &store, &BashGrammar);
        check.run(&ctx).unwrap()
    }

    pub fn kinds(issues: &[Issue]) -> Vec<&'static str> {
        issues.iter().map(|i| i.kind).collect()
    }
}
