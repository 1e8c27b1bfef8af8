//! Consistency of the `profiles/` tree with the repository.

use super::{stable_arch, Check, CheckContext};
use crate::addons::packages::{PackageIndex, PackageVersion};
use crate::addons::profiles::{dir_parents, EntryKind, ProfileData, ProfileEntry};
use crate::addons::use_flags::UseFlags;
use crate::addons::AddonId;
use crate::error::CheckError;
use crate::metadata::depend::Atom;
use crate::models::{Issue, Scope, Severity, UnitId};
use std::collections::{BTreeMap, BTreeSet};

pub const UNKNOWN_CATEGORY: &str = "UnknownCategory";
pub const NONEXISTENT_CATEGORIES: &str = "NonexistentCategories";
pub const ARCHES_WITHOUT_PROFILES: &str = "ArchesWithoutProfiles";
pub const NONEXISTENT_PROFILE_PATH: &str = "NonexistentProfilePath";
pub const LAGGING_PROFILE_EAPI: &str = "LaggingProfileEapi";
pub const UNUSED_PROFILE_DIRS: &str = "UnusedProfileDirs";
pub const UNKNOWN_PROFILE_USE: &str = "UnknownProfileUse";
pub const UNKNOWN_PROFILE_PACKAGE: &str = "UnknownProfilePackage";
pub const UNKNOWN_PROFILE_PACKAGE_USE: &str = "UnknownProfilePackageUse";
pub const UNKNOWN_PROFILE_PACKAGE_KEYWORDS: &str = "UnknownProfilePackageKeywords";
pub const PROFILE_WARNING: &str = "ProfileWarning";
pub const PROFILE_ERROR: &str = "ProfileError";

/// Profile directories that are never listed in `profiles.desc`.
const ROOT_PROFILE_DIRS: &[&str] = &["embedded"];

fn quoted<'s>(items: impl IntoIterator<Item = &'s str>) -> String {
    items
        .into_iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub struct CategoryCheck;

impl Check for CategoryCheck {
    fn name(&self) -> &'static str {
        "CategoryCheck"
    }

    fn category(&self) -> &'static str {
        "profiles"
    }

    fn scope(&self) -> Scope {
        Scope::Category
    }

    fn required_addons(&self) -> &'static [AddonId] {
        &[AddonId::PROFILES]
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[UNKNOWN_CATEGORY]
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let UnitId::Category(category) = &ctx.unit.id else {
            return Ok(Vec::new());
        };
        let profiles = ctx.addon::<ProfileData>(AddonId::PROFILES)?;
        if profiles.categories.iter().any(|c| c == category) {
            return Ok(Vec::new());
        }
        Ok(vec![Issue::new(
            self.name(),
            UNKNOWN_CATEGORY,
            ctx.unit,
            Severity::Warning,
            format!("unknown category dir: {category}"),
        )])
    }
}

/// Repository-wide layout of `profiles/`.
pub struct RepoProfilesCheck;

impl Check for RepoProfilesCheck {
    fn name(&self) -> &'static str {
        "RepoProfilesCheck"
    }

    fn category(&self) -> &'static str {
        "profiles"
    }

    fn scope(&self) -> Scope {
        Scope::Repository
    }

    fn required_addons(&self) -> &'static [AddonId] {
        &[AddonId::PROFILES]
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[
            NONEXISTENT_CATEGORIES,
            ARCHES_WITHOUT_PROFILES,
            NONEXISTENT_PROFILE_PATH,
            LAGGING_PROFILE_EAPI,
            UNUSED_PROFILE_DIRS,
            PROFILE_WARNING,
            PROFILE_ERROR,
        ]
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let data = ctx.addon::<ProfileData>(AddonId::PROFILES)?;
        let issue = |kind, severity, message: String| {
            Issue::new(self.name(), kind, ctx.unit, severity, message)
        };
        let mut out = Vec::new();

        let nonexistent: BTreeSet<&str> = data
            .categories
            .iter()
            .map(String::as_str)
            .filter(|c| !data.category_dirs.contains(*c))
            .collect();
        if !nonexistent.is_empty() {
            let list: Vec<_> = nonexistent.into_iter().collect();
            out.push(issue(
                NONEXISTENT_CATEGORIES,
                Severity::Warning,
                format!("nonexistent profiles/categories entries: {}", list.join(", ")),
            ));
        }

        let profiled: BTreeSet<&str> = data.profiles.iter().map(|p| p.arch.as_str()).collect();
        let without: Vec<&str> = data
            .arches
            .iter()
            .map(String::as_str)
            .filter(|a| !profiled.contains(a))
            .collect();
        if !without.is_empty() {
            out.push(issue(
                ARCHES_WITHOUT_PROFILES,
                Severity::Warning,
                format!("arches without profiles: {}", without.join(", ")),
            ));
        }

        for bad in &data.malformed_desc {
            out.push(
                issue(
                    PROFILE_ERROR,
                    Severity::Error,
                    format!(
                        "profiles.desc, line {}: invalid profile line format: '{}', should be 'arch profile status'",
                        bad.line, bad.text
                    ),
                )
                .at(bad.line, 1),
            );
        }
        if !data.arches.is_empty() {
            for desc in data.profiles.iter().filter(|p| !data.arches.contains(&p.arch)) {
                out.push(
                    issue(
                        PROFILE_WARNING,
                        Severity::Warning,
                        format!("profiles.desc, line {}: unknown arch: '{}'", desc.line, desc.arch),
                    )
                    .at(desc.line, 1),
                );
            }
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut lagging = Vec::new();
        for desc in &data.profiles {
            if !data.dirs.contains(&desc.path) {
                out.push(
                    issue(
                        NONEXISTENT_PROFILE_PATH,
                        Severity::Error,
                        format!("nonexistent profile path: '{}'", desc.path),
                    )
                    .at(desc.line, 1),
                );
                continue;
            }
            let eapi = data.eapi(&desc.path);
            let mut newer_parent = None;
            for node in data.stack(&desc.path) {
                if eapi < data.eapi(&node) {
                    newer_parent = Some(node.clone());
                }
                for dir in dir_parents(&node) {
                    if let Some(known) = data.dirs.get(dir) {
                        seen.insert(known.as_str());
                    }
                }
            }
            if let Some(parent) = newer_parent {
                lagging.push(issue(
                    LAGGING_PROFILE_EAPI,
                    Severity::Warning,
                    format!(
                        "'{}' profile has EAPI {eapi}, '{parent}' parent has EAPI {}",
                        desc.path,
                        data.eapi(&parent)
                    ),
                ));
            }
        }
        out.extend(lagging);

        let unused: Vec<&str> = data
            .dirs
            .iter()
            .map(String::as_str)
            .filter(|d| !ROOT_PROFILE_DIRS.contains(d) && !seen.contains(d))
            .collect();
        if !unused.is_empty() {
            out.push(issue(
                UNUSED_PROFILE_DIRS,
                Severity::Warning,
                format!("unused profile dirs: {}", quoted(unused)),
            ));
        }
        Ok(out)
    }
}

/// Unknown packages, flags and keywords referenced by profile files.
pub struct ProfilesCheck;

impl ProfilesCheck {
    fn matching<'i>(index: &'i PackageIndex, atom: &Atom) -> Vec<&'i PackageVersion> {
        index
            .versions(&atom.key())
            .iter()
            .filter(|v| v.parsed().is_some_and(|p| atom.matches_version(&p)))
            .collect()
    }

    /// Split `-flag` / `flag` tokens into unknown disabled and enabled sets.
    fn unknown_flags<'t>(
        flags: impl IntoIterator<Item = &'t str>,
        known: impl Fn(&str) -> bool,
    ) -> (BTreeSet<String>, BTreeSet<String>) {
        let mut disabled = BTreeSet::new();
        let mut enabled = BTreeSet::new();
        for flag in flags {
            match flag.strip_prefix('-') {
                Some(f) if !known(f) => {
                    disabled.insert(format!("-{f}"));
                }
                None if !known(flag) => {
                    enabled.insert(flag.to_string());
                }
                _ => {}
            }
        }
        (disabled, enabled)
    }

    fn entry(
        &self,
        ctx: &CheckContext<'_>,
        entry: &ProfileEntry,
        index: &PackageIndex,
        flags: &UseFlags,
        arches: &BTreeSet<String>,
        out: &mut Vec<Issue>,
    ) {
        let issue = |kind, message: String| {
            Issue::new(self.name(), kind, ctx.unit, Severity::Warning, message).at(entry.line, 1)
        };
        let Some(first) = entry.tokens.first() else {
            return;
        };
        if entry.kind == EntryKind::Use {
            let (disabled, enabled) = Self::unknown_flags(
                entry.tokens.iter().map(String::as_str),
                |f| flags.is_known(f),
            );
            for group in [disabled, enabled] {
                if !group.is_empty() {
                    out.push(issue(
                        UNKNOWN_PROFILE_USE,
                        format!(
                            "'{}': unknown USE flag(s): {}",
                            entry.file,
                            quoted(group.iter().map(String::as_str))
                        ),
                    ));
                }
            }
            return;
        }

        let raw = first.trim_start_matches(['-', '*']);
        let Ok(atom) = Atom::parse(raw) else {
            tracing::debug!(file = %entry.file, line = entry.line, raw, "unparseable profile atom");
            return;
        };
        let matches = Self::matching(index, &atom);
        if matches.is_empty() {
            out.push(issue(
                UNKNOWN_PROFILE_PACKAGE,
                format!("'{}': unknown package: '{raw}'", entry.file),
            ));
            return;
        }
        match entry.kind {
            EntryKind::AtomUse => {
                let available: BTreeSet<&str> = matches
                    .iter()
                    .flat_map(|v| v.iuse.iter().map(|f| f.name.as_str()))
                    .collect();
                let (disabled, enabled) = Self::unknown_flags(
                    entry.tokens[1..].iter().map(String::as_str),
                    |f| available.contains(f),
                );
                for group in [disabled, enabled] {
                    if !group.is_empty() {
                        let list: Vec<_> = group.into_iter().collect();
                        out.push(issue(
                            UNKNOWN_PROFILE_PACKAGE_USE,
                            format!(
                                "'{}': unknown package USE flag(s): '{raw}[{}]'",
                                entry.file,
                                list.join(", ")
                            ),
                        ));
                    }
                }
            }
            EntryKind::AtomKeywords => {
                let invalid: BTreeSet<&str> = entry.tokens[1..]
                    .iter()
                    .map(String::as_str)
                    .filter(|k| !matches!(*k, "*" | "~*" | "**" | "-*"))
                    .filter(|k| !arches.contains(stable_arch(k.trim_start_matches('-'))))
                    .collect();
                if !invalid.is_empty() {
                    out.push(issue(
                        UNKNOWN_PROFILE_PACKAGE_KEYWORDS,
                        format!(
                            "'{}': unknown package keyword(s): {raw}: {}",
                            entry.file,
                            quoted(invalid)
                        ),
                    ));
                }
            }
            EntryKind::Atoms | EntryKind::Use => {}
        }
    }
}

impl Check for ProfilesCheck {
    fn name(&self) -> &'static str {
        "ProfilesCheck"
    }

    fn category(&self) -> &'static str {
        "profiles"
    }

    fn scope(&self) -> Scope {
        Scope::Repository
    }

    fn required_addons(&self) -> &'static [AddonId] {
        &[AddonId::PROFILES, AddonId::USE_FLAGS, AddonId::PACKAGES]
    }

    fn known_results(&self) -> &'static [&'static str] {
        &[
            UNKNOWN_PROFILE_USE,
            UNKNOWN_PROFILE_PACKAGE,
            UNKNOWN_PROFILE_PACKAGE_USE,
            UNKNOWN_PROFILE_PACKAGE_KEYWORDS,
            PROFILE_ERROR,
        ]
    }

    fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
        let data = ctx.addon::<ProfileData>(AddonId::PROFILES)?;
        let flags = ctx.addon::<UseFlags>(AddonId::USE_FLAGS)?;
        let index = ctx.addon::<PackageIndex>(AddonId::PACKAGES)?;

        // entries come out grouped by directory; report by file path
        let mut by_file: BTreeMap<&str, Vec<&ProfileEntry>> = BTreeMap::new();
        for entry in &data.entries {
            by_file.entry(entry.file.as_str()).or_default().push(entry);
        }
        let mut out = Vec::new();
        for (dir, replacement) in &data.deprecated {
            if !data.dirs.contains(replacement) {
                out.push(Issue::new(
                    self.name(),
                    PROFILE_ERROR,
                    ctx.unit,
                    Severity::Error,
                    format!("nonexistent replacement '{replacement}' for deprecated profile: '{dir}'"),
                ));
            }
        }
        for entry in by_file.into_values().flatten() {
            self.entry(ctx, entry, &index, &flags, &data.arches, &mut out);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{kinds, run_unit};
    use crate::models::Unit;
    use crate::testutil::RepoFixture;
    use pretty_assertions::assert_eq;

    fn repository(root: &std::path::Path) -> Unit {
        Unit::new(UnitId::Repository, root.to_path_buf(), 0)
    }

    #[test]
    fn test_unknown_category() {
        let repo = RepoFixture::new()
            .profiles(&["dev-libs"], &["amd64"])
            .ebuild("dev-libs/foo", "1", "EAPI=8\n")
            .ebuild("app-misc/bar", "1", "EAPI=8\n");
        let unit = |c: &str| Unit::new(UnitId::Category(c.into()), repo.root().join(c), 1);
        assert!(run_unit(&CategoryCheck, repo.root(), &unit("dev-libs")).is_empty());
        let issues = run_unit(&CategoryCheck, repo.root(), &unit("app-misc"));
        assert_eq!(issues[0].message, "unknown category dir: app-misc");
    }

    #[test]
    fn test_repo_profiles_layout() {
        let repo = RepoFixture::new()
            .profiles(&["dev-libs", "sys-apps"], &["amd64", "x86"])
            .file("profiles/arch.list", "amd64\nx86\narm\n")
            .file(
                "profiles/profiles.desc",
                "amd64 default/amd64 stable\nx86 default/x86 dev\narm missing/arm exp\n",
            )
            .file("profiles/base/eapi", "8\n")
            .file("profiles/default/amd64/parent", "../../base\n")
            .file("profiles/default/amd64/eapi", "7\n")
            .file("profiles/default/x86/parent", "../../base\n")
            .file("profiles/stale/eapi", "8\n")
            .file("profiles/embedded/eapi", "8\n")
            .ebuild("dev-libs/foo", "1", "EAPI=8\n");
        let issues = run_unit(&RepoProfilesCheck, repo.root(), &repository(repo.root()));
        let messages: Vec<_> = issues.iter().map(|i| (i.kind, i.message.as_str())).collect();
        assert_eq!(
            messages,
            vec![
                (NONEXISTENT_CATEGORIES, "nonexistent profiles/categories entries: sys-apps"),
                (NONEXISTENT_PROFILE_PATH, "nonexistent profile path: 'missing/arm'"),
                (
                    LAGGING_PROFILE_EAPI,
                    "'default/amd64' profile has EAPI 7, 'base' parent has EAPI 8"
                ),
                (UNUSED_PROFILE_DIRS, "unused profile dirs: 'stale'"),
            ]
        );
        assert_eq!(issues[1].location.map(|l| l.line), Some(3));
        assert_eq!(issues[1].severity, Severity::Error);
    }

    #[test]
    fn test_arches_without_profiles() {
        let repo = RepoFixture::new()
            .profiles(&["dev-libs"], &["amd64"])
            .file("profiles/arch.list", "amd64\nriscv\n")
            .ebuild("dev-libs/foo", "1", "EAPI=8\n");
        let issues = run_unit(&RepoProfilesCheck, repo.root(), &repository(repo.root()));
        assert_eq!(kinds(&issues), vec![ARCHES_WITHOUT_PROFILES]);
        assert_eq!(issues[0].message, "arches without profiles: riscv");
    }

    #[test]
    fn test_profiles_desc_problems() {
        let repo = RepoFixture::new()
            .profiles(&["dev-libs"], &["amd64"])
            .file(
                "profiles/profiles.desc",
                "amd64 default/amd64 stable
sparc default/amd64 exp
amd64 default/amd64
",
            )
            .ebuild("dev-libs/foo", "1", "EAPI=8
");
        let issues = run_unit(&RepoProfilesCheck, repo.root(), &repository(repo.root()));
        let found: Vec<_> = issues
            .iter()
            .map(|i| (i.kind, i.severity, i.location.map(|l| l.line)))
            .collect();
        assert_eq!(
            found,
            vec![
                (PROFILE_ERROR, Severity::Error, Some(3)),
                (PROFILE_WARNING, Severity::Warning, Some(2)),
            ]
        );
        assert_eq!(issues[1].message, "profiles.desc, line 2: unknown arch: 'sparc'");
    }

    #[test]
    fn test_deprecated_profile_replacement() {
        let repo = RepoFixture::new()
            .profiles(&["dev-libs"], &["amd64"])
            .file("profiles/default/old/deprecated", "default/amd64
Use the new one.
")
            .file("profiles/default/older/deprecated", "default/gone
")
            .ebuild("dev-libs/foo", "1", "EAPI=8
");
        let issues = run_unit(&ProfilesCheck, repo.root(), &repository(repo.root()));
        let messages: Vec<_> = issues.iter().map(|i| (i.kind, i.message.as_str())).collect();
        assert_eq!(
            messages,
            vec![(
                PROFILE_ERROR,
                "nonexistent replacement 'default/gone' for deprecated profile: 'default/older'"
            )]
        );
    }

    #[test]
    fn test_profile_file_entries() {
        let repo = RepoFixture::new()
            .profiles(&["dev-libs"], &["amd64"])
            .file("profiles/package.mask", "dev-libs/foo\n-dev-libs/gone\n>=dev-libs/foo-3\n")
            .file("profiles/base/use.mask", "ssl\n-nope\nbogus\n")
            .file("profiles/base/package.use", "dev-libs/foo bar -baz\n")
            .file("profiles/base/package.accept_keywords", "dev-libs/foo ~amd64 ~mips **\n")
            .ebuild("dev-libs/foo", "1", "EAPI=8\nIUSE=\"bar\"\n");
        let issues = run_unit(&ProfilesCheck, repo.root(), &repository(repo.root()));
        let messages: Vec<_> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "'base/package.accept_keywords': unknown package keyword(s): dev-libs/foo: '~mips'",
                "'base/package.use': unknown package USE flag(s): 'dev-libs/foo[-baz]'",
                "'base/use.mask': unknown USE flag(s): '-nope'",
                "'base/use.mask': unknown USE flag(s): 'bogus'",
                "'package.mask': unknown package: 'dev-libs/gone'",
                "'package.mask': unknown package: '>=dev-libs/foo-3'",
            ]
        );
    }
}
