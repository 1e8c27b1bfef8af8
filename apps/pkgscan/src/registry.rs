//! Check registry and scan planning.
//!
//! The registry validates the check and addon catalogs once at startup and
//! turns a user selection into a [`ScanPlan`]: the enabled checks in
//! registration order plus the addons they need, dependencies first.

use crate::addons::{self, Addon, AddonId};
use crate::checks::{self, Check};
use crate::error::ConfigError;
use crate::models::Scope;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
/// Check selection tokens: names, categories or result kinds.
pub struct Selection {
    /// Empty means every registered check.
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl Selection {
    /// Parse comma-separated CLI lists.
    pub fn from_lists(enabled: &[String], disabled: &[String]) -> Self {
        let split = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .flat_map(|s| s.split(','))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        };
        Self {
            enabled: split(enabled),
            disabled: split(disabled),
        }
    }
}

/// Resolved work for one scan.
#[derive(Clone)]
pub struct ScanPlan {
    pub checks: Vec<Arc<dyn Check>>,
    /// Addon closure of `checks`, each after its dependencies.
    pub addons: Vec<AddonId>,
}

impl ScanPlan {
    pub fn checks_for(&self, scope: Scope) -> impl Iterator<Item = &Arc<dyn Check>> {
        self.checks.iter().filter(move |c| c.scope() == scope)
    }

    /// True when some package check aggregates the issues of its versions.
    pub fn aggregates_children(&self) -> bool {
        self.checks.iter().any(|c| c.needs_child_results())
    }
}

pub struct Registry {
    checks: Vec<Arc<dyn Check>>,
    addons: BTreeMap<AddonId, Arc<dyn Addon>>,
}

impl Registry {
    /// Validate the catalogs: unique check names, known addons, acyclic
    /// addon graph.
    pub fn new(
        checks: Vec<Arc<dyn Check>>,
        addons: Vec<Arc<dyn Addon>>,
    ) -> Result<Self, ConfigError> {
        let addons: BTreeMap<AddonId, Arc<dyn Addon>> =
            addons.into_iter().map(|a| (a.id(), a)).collect();

        let mut names = HashSet::new();
        for check in &checks {
            if !names.insert(check.name()) {
                return Err(ConfigError::DuplicateCheck(check.name().to_string()));
            }
            if let Some(missing) = check
                .required_addons()
                .iter()
                .find(|id| !addons.contains_key(*id))
            {
                return Err(ConfigError::UnknownAddon {
                    check: check.name().to_string(),
                    addon: missing.to_string(),
                });
            }
        }
        for addon in addons.values() {
            if let Some(missing) = addon
                .depends_on()
                .iter()
                .find(|id| !addons.contains_key(*id))
            {
                return Err(ConfigError::UnknownAddonDependency {
                    addon: addon.id().to_string(),
                    dependency: missing.to_string(),
                });
            }
        }

        let registry = Self { checks, addons };
        let mut done = BTreeSet::new();
        for id in registry.addons.keys() {
            registry.visit(*id, &mut Vec::new(), &mut done, &mut Vec::new())?;
        }
        Ok(registry)
    }

    /// The built-in check and addon catalogs.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::new(checks::builtin(), addons::builtin())
    }

    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    /// The addons a plan needs, dependencies first.
    pub fn addons_for(&self, plan: &ScanPlan) -> Vec<Arc<dyn Addon>> {
        plan.addons
            .iter()
            .filter_map(|id| self.addons.get(id).cloned())
            .collect()
    }

    /// Depth-first walk appending `id` after its dependencies. `path` holds
    /// the ids currently being expanded; meeting one again is a cycle.
    fn visit(
        &self,
        id: AddonId,
        path: &mut Vec<AddonId>,
        done: &mut BTreeSet<AddonId>,
        order: &mut Vec<AddonId>,
    ) -> Result<(), ConfigError> {
        if done.contains(&id) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|p| *p == id) {
            let mut cycle: Vec<String> = path[start..].iter().map(|a| a.to_string()).collect();
            cycle.push(id.to_string());
            return Err(ConfigError::AddonCycle(cycle));
        }
        path.push(id);
        if let Some(addon) = self.addons.get(&id) {
            for dep in addon.depends_on() {
                self.visit(*dep, path, done, order)?;
            }
        }
        path.pop();
        done.insert(id);
        order.push(id);
        Ok(())
    }

    fn matches(check: &dyn Check, token: &str) -> bool {
        check.name() == token
            || check.category() == token
            || check.known_results().contains(&token)
    }

    /// Resolve `selection` against the catalog.
    pub fn plan(&self, selection: &Selection) -> Result<ScanPlan, ConfigError> {
        for token in selection.enabled.iter().chain(&selection.disabled) {
            if !self.checks.iter().any(|c| Self::matches(c.as_ref(), token)) {
                return Err(ConfigError::UnknownCheck(token.clone()));
            }
        }

        let selected: HashSet<&str> = self
            .checks
            .iter()
            .filter(|c| {
                selection.enabled.is_empty()
                    || selection.enabled.iter().any(|t| Self::matches(c.as_ref(), t))
            })
            .filter(|c| !selection.disabled.iter().any(|t| Self::matches(c.as_ref(), t)))
            .map(|c| c.name())
            .collect();
        if selected.is_empty() {
            return Err(ConfigError::NoActiveChecks);
        }
        // Script checks skip unparseable scripts; keep a reporter for those
        // in the plan even when the selection left it out.
        let parses = self
            .checks
            .iter()
            .any(|c| c.parses_script() && selected.contains(c.name()));
        let checks: Vec<Arc<dyn Check>> = self
            .checks
            .iter()
            .filter(|c| selected.contains(c.name()) || (parses && c.reports_parse_failures()))
            .cloned()
            .collect();
        if checks.len() > selected.len() {
            tracing::debug!("parse failure reporter added to the plan");
        }

        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        for check in &checks {
            for id in check.required_addons() {
                self.visit(*id, &mut Vec::new(), &mut done, &mut order)?;
            }
        }
        tracing::debug!(
            checks = checks.len(),
            addons = ?order.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            "scan plan resolved"
        );
        Ok(ScanPlan {
            checks,
            addons: order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::{AddonContext, AddonValue};
    use crate::checks::CheckContext;
    use crate::error::{AddonError, CheckError};
    use crate::models::Issue;
    use pretty_assertions::assert_eq;

    struct Node(&'static str, &'static [AddonId]);

    impl Addon for Node {
        fn id(&self) -> AddonId {
            AddonId::new(self.0)
        }

        fn depends_on(&self) -> &'static [AddonId] {
            self.1
        }

        fn compute(&self, _ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError> {
            Ok(Arc::new(()))
        }
    }

    struct Named(&'static str, &'static str, &'static [AddonId]);

    impl Check for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn category(&self) -> &'static str {
            self.1
        }

        fn scope(&self) -> Scope {
            Scope::Version
        }

        fn required_addons(&self) -> &'static [AddonId] {
            self.2
        }

        fn known_results(&self) -> &'static [&'static str] {
            &["SomeResult"]
        }

        fn run(&self, _ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
            Ok(Vec::new())
        }
    }

    const A: AddonId = AddonId::new("a");
    const B: AddonId = AddonId::new("b");
    const C: AddonId = AddonId::new("c");
    const ZZ: AddonId = AddonId::new("zz");

    fn addons(edges: [&'static [AddonId]; 3]) -> Vec<Arc<dyn Addon>> {
        vec![
            Arc::new(Node("a", edges[0])),
            Arc::new(Node("b", edges[1])),
            Arc::new(Node("c", edges[2])),
        ]
    }

    #[test]
    fn test_cycle_rejected_at_construction() {
        let err = Registry::new(Vec::new(), addons([&[B], &[C], &[A]]))
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::AddonCycle(vec!["a".into(), "b".into(), "c".into(), "a".into()])
        );
        assert!(err.to_string().contains("a -> b -> c -> a"));
    }

    #[test]
    fn test_unknown_references_rejected() {
        let checks: Vec<Arc<dyn Check>> = vec![Arc::new(Named("X", "x", &[ZZ]))];
        assert!(matches!(
            Registry::new(checks, addons([&[], &[], &[]])),
            Err(ConfigError::UnknownAddon { .. })
        ));
        assert!(matches!(
            Registry::new(Vec::new(), addons([&[ZZ], &[], &[]])),
            Err(ConfigError::UnknownAddonDependency { .. })
        ));
        let dupes: Vec<Arc<dyn Check>> = vec![
            Arc::new(Named("X", "x", &[])),
            Arc::new(Named("X", "y", &[])),
        ];
        assert_eq!(
            Registry::new(dupes, Vec::new()).err(),
            Some(ConfigError::DuplicateCheck("X".into()))
        );
    }

    #[test]
    fn test_plan_closure_in_dependency_order() {
        let checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(Named("One", "first", &[A])),
            Arc::new(Named("Two", "second", &[C, A])),
        ];
        let registry = Registry::new(checks, addons([&[B], &[C], &[]])).unwrap();
        let plan = registry.plan(&Selection::default()).unwrap();
        assert_eq!(plan.addons, vec![C, B, A]);

        let plan = registry
            .plan(&Selection::from_lists(&["second".into()], &[]))
            .unwrap();
        let names: Vec<_> = plan.checks.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Two"]);
        assert_eq!(plan.addons, vec![C, B, A]);
    }

    #[test]
    fn test_selection_tokens() {
        let registry = Registry::builtin().unwrap();
        let plan = registry
            .plan(&Selection::from_lists(
                &["shell,GlsaCheck".into()],
                &["EapiCommandsCheck".into()],
            ))
            .unwrap();
        let names: Vec<_> = plan.checks.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec![
                "ShellSyntaxCheck",
                "GlobCheck",
                "PathVariablesCheck",
                "GlsaCheck",
                "ShellSummaryCheck",
            ]
        );
        assert_eq!(plan.addons, vec![AddonId::GLSA]);

        let by_kind = registry
            .plan(&Selection::from_lists(&["DroppedKeywords".into()], &[]))
            .unwrap();
        assert_eq!(by_kind.checks[0].name(), "KeywordsCheck");

        assert_eq!(
            registry
                .plan(&Selection::from_lists(&["NoSuchCheck".into()], &[]))
                .err(),
            Some(ConfigError::UnknownCheck("NoSuchCheck".into()))
        );
        assert_eq!(
            registry
                .plan(&Selection::from_lists(&["glsa".into()], &["glsa".into()]))
                .err(),
            Some(ConfigError::NoActiveChecks)
        );
    }

    #[test]
    fn test_script_checks_keep_parse_reporter() {
        let registry = Registry::builtin().unwrap();
        let names = |enabled: &str, disabled: &[String]| -> Vec<&'static str> {
            registry
                .plan(&Selection::from_lists(&[enabled.into()], disabled))
                .unwrap()
                .checks
                .iter()
                .map(|c| c.name())
                .collect()
        };
        assert_eq!(names("GlobCheck", &[]), vec!["ShellSyntaxCheck", "GlobCheck"]);
        assert_eq!(
            names("UnquotedVariable", &["ShellSyntaxCheck".into()]),
            vec!["ShellSyntaxCheck", "PathVariablesCheck"]
        );
        assert_eq!(names("KeywordsCheck", &[]), vec!["KeywordsCheck"]);
    }

    #[test]
    fn test_builtin_profiles_closure() {
        let registry = Registry::builtin().unwrap();
        let plan = registry
            .plan(&Selection::from_lists(&["ProfilesCheck".into()], &[]))
            .unwrap();
        assert_eq!(
            plan.addons,
            vec![AddonId::PROFILES, AddonId::USE_FLAGS, AddonId::PACKAGES]
        );
        let seeded: Vec<AddonId> = registry.addons_for(&plan).iter().map(|a| a.id()).collect();
        assert_eq!(seeded, plan.addons);
    }
}
