//! Checks over the embedded script of a version.

use super::{Check, CheckContext};
use crate::error::CheckError;
use crate::models::{Issue, Scope, Severity};
use crate::shell::detectors::{
    kinds, BannedCommand, MissingSlash, UnnecessarySlashStrip, UnquotedVariable, UnsafeGlob,
};
use crate::shell::{Detector, ScriptEnv, ShellAnalyzer};
use std::collections::{BTreeMap, BTreeSet};

pub const UNPARSEABLE_SCRIPT: &str = "UnparseableScript";
pub const SHELL_ISSUE_IN_ALL_VERSIONS: &str = "ShellIssueInAllVersions";

const CATEGORY: &str = "shell";

/// Run `detectors` over the unit's script. Scripts that do not parse are
/// reported by [`ShellSyntaxCheck`] alone, which the planner adds whenever
/// one of these checks is selected.
fn analyze(
    check: &'static str,
    detectors: &[&dyn Detector],
    ctx: &CheckContext<'_>,
) -> Result<Vec<Issue>, CheckError> {
    let metadata = ctx.metadata()?;
    let Ok(tree) = ctx.script()? else {
        return Ok(Vec::new());
    };
    let env = ScriptEnv {
        tree,
        eapi: metadata.eapi_number(),
    };
    Ok(ShellAnalyzer::run(detectors, &env)
        .into_iter()
        .map(|f| Issue::new(check, f.kind, ctx.unit, f.severity, f.message).at(f.line, f.column))
        .collect())
}

pub struct ShellSyntaxCheck;

impl Check for ShellSyntaxCheck {
    fn name(&self) -> &'static str {
        "ShellSyntaxCheck"
    }

    fn category(&self) -> &'static str {
        CATEGORY
    }

    fn scope(&self) -> Scope {
        Scope::Version
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[UNPARSEABLE_SCRIPT]
    }

    fn reports_parse_failures(&self) -> bool {
        true
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        Ok(match ctx.script()? {
            Ok(_) => Vec::new(),
            Err(failure) => vec![Issue::new(
                self.name(),
                UNPARSEABLE_SCRIPT,
                ctx.unit,
                Severity::Error,
                format!("unparseable script: {}", failure.message),
            )
            .at(failure.line, failure.column)],
        })
    }
}

pub struct GlobCheck;

impl Check for GlobCheck {
    fn name(&self) -> &'static str {
        "GlobCheck"
    }

    fn category(&self) -> &'static str {
        CATEGORY
    }

    fn scope(&self) -> Scope {
        Scope::Version
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[kinds::UNSAFE_GLOB]
    }

    fn parses_script(&self) -> bool {
        true
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        analyze(self.name(), &[&UnsafeGlob], ctx)
    }
}

pub struct PathVariablesCheck;

impl Check for PathVariablesCheck {
    fn name(&self) -> &'static str {
        "PathVariablesCheck"
    }

    fn category(&self) -> &'static str {
        CATEGORY
    }

    fn scope(&self) -> Scope {
        Scope::Version
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[
            kinds::UNQUOTED_VARIABLE,
            kinds::MISSING_SLASH,
            kinds::UNNECESSARY_SLASH_STRIP,
        ]
    }

    fn parses_script(&self) -> bool {
        true
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        analyze(
            self.name(),
            &[&UnquotedVariable, &MissingSlash, &UnnecessarySlashStrip],
            ctx,
        )
    }
}

pub struct EapiCommandsCheck;

impl Check for EapiCommandsCheck {
    fn name(&self) -> &'static str {
        "EapiCommandsCheck"
    }

    fn category(&self) -> &'static str {
        CATEGORY
    }

    fn scope(&self) -> Scope {
        Scope::Version
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[kinds::BANNED_COMMAND]
    }

    fn parses_script(&self) -> bool {
        true
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        analyze(self.name(), &[&BannedCommand], ctx)
    }
}

/// Flags shell issue kinds present in every version of a package.
pub struct ShellSummaryCheck;

const SUMMARIZED: &[&str] = &[
    "ShellSyntaxCheck",
    "GlobCheck",
    "PathVariablesCheck",
    "EapiCommandsCheck",
];

impl Check for ShellSummaryCheck {
    fn name(&self) -> &'static str {
        "ShellSummaryCheck"
    }

    fn category(&self) -> &'static str {
        CATEGORY
    }

    fn scope(&self) -> Scope {
        Scope::Package
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[SHELL_ISSUE_IN_ALL_VERSIONS]
    }

    fn needs_child_results(&self) -> bool {
        true
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let versions = ctx.child_count();
        if versions < 2 {
            return Ok(Vec::new());
        }
        let mut seen: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for issue in ctx.child_issues() {
            if SUMMARIZED.contains(&issue.check) {
                seen.entry(issue.kind).or_default().insert(issue.unit.as_str());
            }
        }
        Ok(seen
            .into_iter()
            .filter(|(_, units)| units.len() == versions)
            .map(|(kind, _)| {
                Issue::new(
                    self.name(),
                    SHELL_ISSUE_IN_ALL_VERSIONS,
                    ctx.unit,
                    Severity::Info,
                    format!("{kind} reported in all {versions} versions"),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{kinds as issue_kinds, run_unit, run_version};
    use crate::models::{Unit, UnitId};
    use crate::testutil::RepoFixture;

    const BROKEN: &str = "EAPI=8\nsrc_install() {\n\tif true; then\n}\n";

    #[test]
    fn test_unparseable_script_reported_once() {
        let repo = RepoFixture::new().ebuild("dev-libs/foo", "1", BROKEN);
        let issues = run_version(&ShellSyntaxCheck, repo.root(), "dev-libs/foo", "1");
        assert_eq!(issue_kinds(&issues), vec![UNPARSEABLE_SCRIPT]);
        assert_eq!(issues[0].severity, Severity::Error);
        assert!(issues[0].location.is_some());
        // the detectors stay quiet on the same unit
        assert!(run_version(&GlobCheck, repo.root(), "dev-libs/foo", "1").is_empty());
    }

    #[test]
    fn test_detector_issues_carry_locations() {
        let repo = RepoFixture::new().ebuild(
            "dev-libs/foo",
            "1",
            "EAPI=7\nsrc_unpack() {\n\tunpack ${DISTDIR}/foo-*.tar\n\tdohtml doc/*\n}\n",
        );
        let glob = run_version(&GlobCheck, repo.root(), "dev-libs/foo", "1");
        assert_eq!(issue_kinds(&glob), vec![kinds::UNSAFE_GLOB]);
        assert_eq!(glob[0].location.map(|l| l.line), Some(3));
        assert_eq!(glob[0].check, "GlobCheck");

        let paths = run_version(&PathVariablesCheck, repo.root(), "dev-libs/foo", "1");
        assert_eq!(issue_kinds(&paths), vec![kinds::UNQUOTED_VARIABLE]);

        let banned = run_version(&EapiCommandsCheck, repo.root(), "dev-libs/foo", "1");
        assert_eq!(issue_kinds(&banned), vec![kinds::BANNED_COMMAND]);
        assert_eq!(banned[0].location.map(|l| l.line), Some(4));
    }

    fn child(version: &str, check: &'static str, kind: &'static str) -> Issue {
        let unit = Unit::new(
            UnitId::Version {
                category: "dev-libs".into(),
                package: "foo".into(),
                version: version.into(),
            },
            "x".into(),
            0,
        );
        Issue::new(check, kind, &unit, Severity::Warning, "m")
    }

    #[test]
    fn test_summary_needs_every_version() {
        let repo = RepoFixture::new();
        let package = Unit::new(
            UnitId::Package {
                category: "dev-libs".into(),
                package: "foo".into(),
            },
            "x".into(),
            // declared count is stale; the dispatched count decides
            5,
        );
        let children = vec![
            child("1", "GlobCheck", kinds::UNSAFE_GLOB),
            child("1", "PathVariablesCheck", kinds::UNQUOTED_VARIABLE),
            child("2", "GlobCheck", kinds::UNSAFE_GLOB),
            child("2", "GlobCheck", kinds::UNSAFE_GLOB),
            child("2", "DependencyCheck", "UnstatedIuse"),
        ];
        let store = crate::checks::testing::store(repo.root());
        let ctx = CheckContext::new(&package, repo.root(), &store, &crate::shell::BashGrammar)
            .with_children(&children, 2);
        let issues = ShellSummaryCheck.run(&ctx).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "UnsafeGlob reported in all 2 versions");
        assert_eq!(issues[0].unit, "dev-libs/foo");

        // without child issues there is nothing to summarize
        assert!(run_unit(&ShellSummaryCheck, repo.root(), &package).is_empty());
    }
}
