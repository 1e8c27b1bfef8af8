//! Scan scheduler: bounded dispatch, parallel workers, ordered merge.
//!
//! A dispatcher thread pulls units from the source in enumeration order and
//! hands `(seq, unit)` pairs to a pool of workers over a bounded channel.
//! Workers run every planned check of the unit's scope and send the unit's
//! issues back; the merge stage on the caller's thread buffers outcomes and
//! emits them strictly by sequence number, so the final stream depends only
//! on enumeration order, never on worker timing.
//!
//! Backpressure comes from two bounds: the work channel capacity and a pool
//! of merge-window credits. The dispatcher takes a credit before each unit
//! and the merge stage returns it once that unit has been emitted, which
//! caps how many outcomes can pile up waiting for a slow predecessor.

use crate::addons::store::panic_message;
use crate::addons::{AddonStore, Outcome};
use crate::checks::{Check, CheckContext};
use crate::metadata::{MetadataProvider, VersionMetadata};
use crate::models::internal::{INTERNAL_ERROR, SCANNER, SKIPPED_CHECK, UNREADABLE_UNIT};
use crate::models::{Issue, ScanSummary, Scope, Severity, Unit, UnitId};
use crate::registry::ScanPlan;
use crate::shell::Grammar;
use crate::sink::ResultSink;
use crate::source::UnitSource;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Worker threads.
    pub jobs: usize,
    /// Capacity of the dispatcher-to-worker channel.
    pub queue_capacity: usize,
    /// Units allowed between dispatch and emission.
    pub window: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self::with_jobs(default_jobs())
    }
}

impl ScanOptions {
    pub fn with_jobs(jobs: usize) -> Self {
        let jobs = jobs.max(1);
        Self {
            jobs,
            queue_capacity: jobs * 4,
            window: 256.max(jobs * 16),
        }
    }
}

pub fn default_jobs() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

#[derive(Debug, Clone, Default)]
/// Cooperative cancellation; the dispatcher stops handing out units and
/// in-flight units still complete, so the output is a prefix of the full run.
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanState {
    Idle,
    Enumerating,
    Dispatching,
    Draining,
    Done,
}

impl ScanState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ScanState::Enumerating,
            2 => ScanState::Dispatching,
            3 => ScanState::Draining,
            4 => ScanState::Done,
            _ => ScanState::Idle,
        }
    }
}

struct WorkItem {
    seq: u64,
    unit: Unit,
    /// Version units dispatched for this package before it.
    children: usize,
}

struct UnitOutcome {
    seq: u64,
    /// Skip notices; the merge stage keeps the first one per check.
    skipped: Vec<Issue>,
    issues: Vec<Issue>,
}

/// Child issues deposited by version workers for their package.
#[derive(Default)]
struct Aggregator {
    deposits: Mutex<HashMap<UnitId, Vec<(u64, Vec<Issue>)>>>,
    ready: Condvar,
}

impl Aggregator {
    fn deposit(&self, parent: UnitId, seq: u64, issues: Vec<Issue>) {
        self.deposits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(parent)
            .or_default()
            .push((seq, issues));
        self.ready.notify_all();
    }

    /// Block until `expected` children of `id` have deposited, then take
    /// their issues in enumeration order.
    fn collect(&self, id: &UnitId, expected: usize) -> Vec<Issue> {
        let mut deposits = self.deposits.lock().unwrap_or_else(PoisonError::into_inner);
        while deposits.get(id).map_or(0, Vec::len) < expected {
            deposits = self
                .ready
                .wait(deposits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let mut entries = deposits.remove(id).unwrap_or_default();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().flat_map(|(_, issues)| issues).collect()
    }
}

pub struct Scanner {
    plan: ScanPlan,
    store: AddonStore,
    provider: Arc<dyn MetadataProvider>,
    grammar: Arc<dyn Grammar>,
    options: ScanOptions,
    stop: StopSignal,
    state: AtomicU8,
    aggregate: bool,
}

impl Scanner {
    pub fn new(
        plan: ScanPlan,
        store: AddonStore,
        provider: Arc<dyn MetadataProvider>,
        grammar: Arc<dyn Grammar>,
        options: ScanOptions,
    ) -> Self {
        let aggregate = plan.aggregates_children();
        Self {
            plan,
            store,
            provider,
            grammar,
            options,
            stop: StopSignal::default(),
            state: AtomicU8::new(ScanState::Idle as u8),
            aggregate,
        }
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ScanState) {
        self.state.store(state as u8, Ordering::SeqCst);
        tracing::debug!(?state, "scan state");
    }

    /// Run the plan over every unit of `source`, feeding `sink` in
    /// enumeration order.
    pub fn scan(&self, source: &dyn UnitSource, sink: &mut dyn ResultSink) -> ScanSummary {
        self.set_state(ScanState::Enumerating);
        let jobs = self.options.jobs.max(1);
        let window = self.options.window.max(1);
        let (work_tx, work_rx) = bounded::<WorkItem>(self.options.queue_capacity.max(1));
        let (result_tx, result_rx) = unbounded::<UnitOutcome>();
        let (credit_tx, credit_rx) = bounded::<()>(window);
        for _ in 0..window {
            let _ = credit_tx.try_send(());
        }
        let aggregator = Aggregator::default();
        let mut summary = ScanSummary::default();

        let cancelled = thread::scope(|s| {
            let mut workers = 0;
            for n in 0..jobs {
                let rx = work_rx.clone();
                let tx = result_tx.clone();
                let aggregator = &aggregator;
                let spawned = thread::Builder::new()
                    .name(format!("pkgscan-worker-{n}"))
                    .spawn_scoped(s, move || self.work(rx, tx, aggregator));
                match spawned {
                    Ok(_) => workers += 1,
                    Err(err) => tracing::error!(%err, "failed to spawn worker"),
                }
            }
            drop(work_rx);
            drop(result_tx);
            tracing::debug!(workers, window, "workers started");

            let dispatcher = if workers == 0 {
                None
            } else {
                thread::Builder::new()
                    .name("pkgscan-dispatch".to_string())
                    .spawn_scoped(s, move || self.dispatch(source, work_tx, credit_rx))
                    .map_err(|err| tracing::error!(%err, "failed to spawn dispatcher"))
                    .ok()
            };

            self.merge(result_rx, credit_tx, sink, &mut summary);
            match dispatcher {
                Some(handle) => handle.join().unwrap_or(true),
                None => true,
            }
        });

        summary.cancelled = cancelled;
        sink.finish(&summary);
        self.set_state(ScanState::Done);
        tracing::info!(
            units = summary.units,
            errors = summary.errors,
            warnings = summary.warnings,
            cancelled,
            "scan finished"
        );
        summary
    }

    /// Feed units to the workers; returns true when cut short.
    fn dispatch(
        &self,
        source: &dyn UnitSource,
        work: Sender<WorkItem>,
        credits: Receiver<()>,
    ) -> bool {
        self.set_state(ScanState::Dispatching);
        let mut pending_children: HashMap<UnitId, usize> = HashMap::new();
        for (seq, unit) in (0u64..).zip(source.units()) {
            if self.stop.is_stopped() || credits.recv().is_err() || self.stop.is_stopped() {
                tracing::info!(dispatched = seq, "scan cancelled");
                return true;
            }
            let children = match unit.scope() {
                Scope::Version => {
                    if let Some(parent) = &unit.parent {
                        *pending_children.entry(parent.clone()).or_default() += 1;
                    }
                    0
                }
                Scope::Package => {
                    let seen = pending_children.remove(&unit.id).unwrap_or(0);
                    if seen != unit.children {
                        tracing::debug!(
                            unit = %unit.id,
                            declared = unit.children,
                            seen,
                            "child count differs from enumeration"
                        );
                    }
                    seen
                }
                _ => 0,
            };
            if work.send(WorkItem { seq, unit, children }).is_err() {
                return true;
            }
        }
        self.set_state(ScanState::Draining);
        false
    }

    fn work(&self, work: Receiver<WorkItem>, results: Sender<UnitOutcome>, aggregator: &Aggregator) {
        for item in work.iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| self.process(&item, aggregator)))
                .unwrap_or_else(|panic| UnitOutcome {
                    seq: item.seq,
                    skipped: Vec::new(),
                    issues: vec![Issue::new(
                        SCANNER,
                        INTERNAL_ERROR,
                        &item.unit,
                        Severity::Error,
                        format!("unit processing panicked: {}", panic_message(panic.as_ref())),
                    )],
                });
            if self.aggregate && item.unit.scope() == Scope::Version {
                if let Some(parent) = &item.unit.parent {
                    aggregator.deposit(parent.clone(), item.seq, outcome.issues.clone());
                }
            }
            if results.send(outcome).is_err() {
                break;
            }
        }
    }

    fn load_metadata(&self, unit: &Unit) -> Result<VersionMetadata, String> {
        match catch_unwind(AssertUnwindSafe(|| self.provider.load(&unit.path))) {
            Ok(Ok(metadata)) => Ok(metadata),
            Ok(Err(err)) => Err(err.to_string()),
            Err(panic) => Err(panic_message(panic.as_ref())),
        }
    }

    fn process(&self, item: &WorkItem, aggregator: &Aggregator) -> UnitOutcome {
        let unit = &item.unit;
        let scope = unit.scope();
        let mut outcome = UnitOutcome {
            seq: item.seq,
            skipped: Vec::new(),
            issues: Vec::new(),
        };
        let checks: Vec<&Arc<dyn Check>> = self.plan.checks_for(scope).collect();
        if checks.is_empty() {
            return outcome;
        }

        let metadata = if scope == Scope::Version {
            match self.load_metadata(unit) {
                Ok(metadata) => Some(metadata),
                Err(reason) => {
                    tracing::debug!(unit = %unit.id, %reason, "unreadable unit");
                    outcome.issues.push(Issue::new(
                        SCANNER,
                        UNREADABLE_UNIT,
                        unit,
                        Severity::Error,
                        format!("unreadable: {reason}"),
                    ));
                    return outcome;
                }
            }
        } else {
            None
        };
        let children = if scope == Scope::Package && checks.iter().any(|c| c.needs_child_results())
        {
            aggregator.collect(&unit.id, item.children)
        } else {
            Vec::new()
        };

        let mut ctx = CheckContext::new(
            unit,
            self.store.repo_root(),
            &self.store,
            self.grammar.as_ref(),
        )
        .with_children(&children, item.children);
        if let Some(metadata) = &metadata {
            ctx = ctx.with_metadata(metadata);
        }
        for check in checks {
            self.run_check(check.as_ref(), &ctx, &mut outcome);
        }
        outcome
    }

    fn run_check(&self, check: &dyn Check, ctx: &CheckContext<'_>, outcome: &mut UnitOutcome) {
        for id in check.required_addons() {
            let (kind, severity, reason) = match self.store.get(*id) {
                Outcome::Ready(_) => continue,
                Outcome::Failed(reason) => {
                    (INTERNAL_ERROR, Severity::Error, format!("failed: {reason}"))
                }
                Outcome::Disabled(reason) => {
                    (SKIPPED_CHECK, Severity::Info, format!("disabled: {reason}"))
                }
            };
            outcome.skipped.push(Issue::new(
                check.name(),
                kind,
                ctx.unit,
                severity,
                format!("check skipped, addon {id} {reason}"),
            ));
            return;
        }

        match catch_unwind(AssertUnwindSafe(|| check.run(ctx))) {
            Ok(Ok(issues)) => outcome.issues.extend(issues),
            Ok(Err(err)) => {
                tracing::warn!(check = check.name(), unit = %ctx.unit.id, %err, "check failed");
                outcome.issues.push(Issue::new(
                    check.name(),
                    INTERNAL_ERROR,
                    ctx.unit,
                    Severity::Error,
                    format!("check failed: {err}"),
                ));
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::warn!(check = check.name(), unit = %ctx.unit.id, %reason, "check panicked");
                outcome.issues.push(Issue::new(
                    check.name(),
                    INTERNAL_ERROR,
                    ctx.unit,
                    Severity::Error,
                    format!("check panicked: {reason}"),
                ));
            }
        }
    }

    /// Emit outcomes strictly by sequence number.
    fn merge(
        &self,
        results: Receiver<UnitOutcome>,
        credits: Sender<()>,
        sink: &mut dyn ResultSink,
        summary: &mut ScanSummary,
    ) {
        let mut pending: BTreeMap<u64, UnitOutcome> = BTreeMap::new();
        let mut next = 0u64;
        let mut notified: HashSet<&'static str> = HashSet::new();
        for outcome in results.iter() {
            pending.insert(outcome.seq, outcome);
            while let Some(outcome) = pending.remove(&next) {
                next += 1;
                summary.units += 1;
                for issue in outcome.skipped {
                    if notified.insert(issue.check) {
                        tracing::info!(check = issue.check, message = %issue.message, "check skipped");
                        summary.record(&issue);
                        sink.accept(issue);
                    }
                }
                for issue in outcome.issues {
                    summary.record(&issue);
                    sink.accept(issue);
                }
                let _ = credits.try_send(());
            }
        }
        if !pending.is_empty() {
            tracing::error!(next, buffered = pending.len(), "merge stage ended with a gap");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addons::{self, Addon, AddonContext, AddonId, AddonSettings, AddonValue};
    use crate::checks::shell::{SHELL_ISSUE_IN_ALL_VERSIONS, UNPARSEABLE_SCRIPT};
    use crate::error::{AddonError, CheckError};
    use crate::shell::detectors::kinds::UNSAFE_GLOB;
    use crate::metadata::EbuildProvider;
    use crate::registry::{Registry, Selection};
    use crate::shell::BashGrammar;
    use crate::sink::CollectSink;
    use crate::source::RepoSource;
    use crate::testutil::RepoFixture;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn fixture() -> RepoFixture {
        let mut repo = RepoFixture::new()
            .profiles(&["dev-libs", "app-misc"], &["amd64"]);
        for (pkg, n) in [("dev-libs/foo", 4), ("dev-libs/bar", 3), ("app-misc/baz", 5)] {
            for v in 1..=n {
                repo = repo.ebuild(
                    pkg,
                    &format!("1.{v}"),
                    "EAPI=8\nKEYWORDS=\"amd64\"\nsrc_install() {\n\tcp ${DISTDIR}/*.gz $T\n\tdohtml x\n}\n",
                );
            }
        }
        repo.ebuild(
            "dev-libs/foo",
            "2",
            "EAPI=8\nsrc_install() {\n\tif true; then\n}\n",
        )
    }

    fn scanner(root: &Path, selection: Selection, options: ScanOptions) -> Scanner {
        let registry = Registry::builtin().unwrap();
        let plan = registry.plan(&selection).unwrap();
        let settings = AddonSettings {
            glsa_enabled: false,
            glsa_dir: None,
        };
        let store = AddonStore::new(addons::builtin(), root, settings, Arc::new(EbuildProvider));
        Scanner::new(plan, store, Arc::new(EbuildProvider), Arc::new(BashGrammar), options)
    }

    fn run(root: &Path, selection: Selection, jobs: usize) -> (Vec<Issue>, ScanSummary) {
        let scanner = scanner(root, selection, ScanOptions::with_jobs(jobs));
        let mut sink = CollectSink::default();
        let summary = scanner.scan(&RepoSource::new(root), &mut sink);
        assert_eq!(scanner.state(), ScanState::Done);
        assert_eq!(sink.summary.as_ref(), Some(&summary));
        (sink.issues, summary)
    }

    #[test]
    fn test_output_independent_of_worker_count() {
        let repo = fixture();
        let (serial, summary) = run(repo.root(), Selection::default(), 1);
        for jobs in [2, 4, 8] {
            let (parallel, _) = run(repo.root(), Selection::default(), jobs);
            assert_eq!(serial, parallel, "jobs={jobs}");
        }
        assert!(!summary.cancelled);
        // 13 versions, 3 packages, 2 categories, the repository
        assert_eq!(summary.units, 13 + 3 + 2 + 1);
        assert!(serial.iter().any(|i| i.kind == UNPARSEABLE_SCRIPT));
        // the glsa addon is turned off: one notice for the whole scan
        let skipped: Vec<_> = serial.iter().filter(|i| i.kind == SKIPPED_CHECK).collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].check, "GlsaCheck");
        assert_eq!(skipped[0].unit, "app-misc/baz-1.1");
        assert_eq!(skipped[0].severity, Severity::Info);
    }

    #[test]
    fn test_results_follow_enumeration_order() {
        let repo = fixture();
        let (issues, _) = run(repo.root(), Selection::from_lists(&["shell".into()], &[]), 4);
        let order: Vec<String> = RepoSource::new(repo.root())
            .units()
            .map(|u| u.id.to_string())
            .collect();
        let positions: Vec<usize> = issues
            .iter()
            .map(|i| order.iter().position(|u| *u == i.unit).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_package_summary_sees_its_versions() {
        let repo = fixture();
        let (issues, _) = run(repo.root(), Selection::from_lists(&["shell".into()], &[]), 4);
        let summaries: Vec<(&str, &str)> = issues
            .iter()
            .filter(|i| i.kind == SHELL_ISSUE_IN_ALL_VERSIONS)
            .map(|i| (i.unit.as_str(), i.message.as_str()))
            .collect();
        // dev-libs/foo-2 is unparseable, so foo has no kind common to all versions
        assert_eq!(
            summaries,
            vec![
                ("app-misc/baz", "BannedCommand reported in all 5 versions"),
                ("app-misc/baz", "UnquotedVariable reported in all 5 versions"),
                ("app-misc/baz", "UnsafeGlob reported in all 5 versions"),
                ("dev-libs/bar", "BannedCommand reported in all 3 versions"),
                ("dev-libs/bar", "UnquotedVariable reported in all 3 versions"),
                ("dev-libs/bar", "UnsafeGlob reported in all 3 versions"),
            ]
        );
    }

    struct Exploding;

    impl Check for Exploding {
        fn name(&self) -> &'static str {
            "Exploding"
        }

        fn category(&self) -> &'static str {
            "test"
        }

        fn scope(&self) -> Scope {
            Scope::Version
        }

        fn known_results(&self) -> &'static [&'static str] {
            &["Boom"]
        }

        fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
            match &ctx.unit.id {
                UnitId::Version { version, .. } if version == "1.2" => panic!("exploded"),
                UnitId::Version { version, .. } if version == "1.3" => {
                    Err(CheckError::Other("bad input".into()))
                }
                _ => Ok(vec![Issue::new(
                    self.name(),
                    "Boom",
                    ctx.unit,
                    Severity::Warning,
                    "fine",
                )]),
            }
        }
    }

    fn custom_scanner(root: &Path, options: ScanOptions) -> Scanner {
        let registry = Registry::new(vec![Arc::new(Exploding)], addons::builtin()).unwrap();
        let plan = registry.plan(&Selection::default()).unwrap();
        let store = AddonStore::new(
            addons::builtin(),
            root,
            AddonSettings::default(),
            Arc::new(EbuildProvider),
        );
        Scanner::new(plan, store, Arc::new(EbuildProvider), Arc::new(BashGrammar), options)
    }

    #[test]
    fn test_check_faults_become_internal_errors() {
        let repo = fixture();
        let scanner = custom_scanner(repo.root(), ScanOptions::with_jobs(3));
        let mut sink = CollectSink::default();
        scanner.scan(&RepoSource::new(repo.root()), &mut sink);
        let baz: Vec<(&str, &str)> = sink
            .issues
            .iter()
            .filter(|i| i.unit.starts_with("app-misc/baz-"))
            .map(|i| (i.kind, i.message.as_str()))
            .collect();
        assert_eq!(
            baz,
            vec![
                ("Boom", "fine"),
                (INTERNAL_ERROR, "check panicked: exploded"),
                (INTERNAL_ERROR, "check failed: bad input"),
                ("Boom", "fine"),
                ("Boom", "fine"),
            ]
        );
        // the other packages were still scanned
        assert_eq!(sink.issues.len(), 13);
    }

    const SHAKY: AddonId = AddonId::new("shaky");
    const LEANING: AddonId = AddonId::new("leaning");

    /// Panics on compute; `Leaning` depends on it.
    struct Shaky;

    impl Addon for Shaky {
        fn id(&self) -> AddonId {
            SHAKY
        }

        fn compute(&self, _ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError> {
            panic!("index corrupt")
        }
    }

    struct Leaning;

    impl Addon for Leaning {
        fn id(&self) -> AddonId {
            LEANING
        }

        fn depends_on(&self) -> &'static [AddonId] {
            &[SHAKY]
        }

        fn compute(&self, ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError> {
            ctx.dependency::<()>(SHAKY).map(|v| v as AddonValue)
        }
    }

    /// Emits one `Seen` per unit of `scope` when its addons are ready.
    struct Marker(&'static str, Scope, &'static [AddonId]);

    impl Check for Marker {
        fn name(&self) -> &'static str {
            self.0
        }

        fn category(&self) -> &'static str {
            "test"
        }

        fn scope(&self) -> Scope {
            self.1
        }

        fn required_addons(&self) -> &'static [AddonId] {
            self.2
        }

        fn known_results(&self) -> &'static [&'static str] {
            &["Seen"]
        }

        fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Issue>, CheckError> {
            Ok(vec![Issue::new(self.0, "Seen", ctx.unit, Severity::Info, "seen")])
        }
    }

    #[test]
    fn test_failed_addon_skips_only_its_dependents() {
        let repo = fixture();
        let checks: Vec<Arc<dyn Check>> = vec![
            Arc::new(Marker("NeedsShaky", Scope::Version, &[SHAKY])),
            Arc::new(Marker("Independent", Scope::Version, &[])),
            Arc::new(Marker("NeedsLeaning", Scope::Package, &[LEANING])),
        ];
        let registry = Registry::new(checks, vec![Arc::new(Shaky), Arc::new(Leaning)]).unwrap();
        let plan = registry.plan(&Selection::default()).unwrap();
        assert_eq!(plan.addons, vec![SHAKY, LEANING]);
        let store = AddonStore::new(
            registry.addons_for(&plan),
            repo.root(),
            AddonSettings::default(),
            Arc::new(EbuildProvider),
        );
        let scanner = Scanner::new(
            plan,
            store,
            Arc::new(EbuildProvider),
            Arc::new(BashGrammar),
            ScanOptions::with_jobs(4),
        );
        let mut sink = CollectSink::default();
        let summary = scanner.scan(&RepoSource::new(repo.root()), &mut sink);

        let internal: Vec<(&str, &str)> = sink
            .issues
            .iter()
            .filter(|i| i.kind == INTERNAL_ERROR)
            .map(|i| (i.check, i.message.as_str()))
            .collect();
        assert_eq!(
            internal,
            vec![
                ("NeedsShaky", "check skipped, addon shaky failed: index corrupt"),
                (
                    "NeedsLeaning",
                    "check skipped, addon leaning failed: dependency shaky failed: index corrupt"
                ),
            ]
        );
        assert!(sink
            .issues
            .iter()
            .filter(|i| i.kind == INTERNAL_ERROR)
            .all(|i| i.severity == Severity::Error));
        assert_eq!(summary.errors, 2);

        let seen: Vec<&str> = sink
            .issues
            .iter()
            .filter(|i| i.kind == "Seen")
            .map(|i| i.check)
            .collect();
        assert_eq!(seen.len(), 13);
        assert!(seen.iter().all(|c| *c == "Independent"));
    }

    #[test]
    fn test_parse_failure_reported_when_only_script_checks_selected() {
        let repo = fixture();
        let (issues, _) = run(repo.root(), Selection::from_lists(&["GlobCheck".into()], &[]), 3);
        let unparseable: Vec<(&str, &str)> = issues
            .iter()
            .filter(|i| i.kind == UNPARSEABLE_SCRIPT)
            .map(|i| (i.check, i.unit.as_str()))
            .collect();
        assert_eq!(unparseable, vec![("ShellSyntaxCheck", "dev-libs/foo-2")]);
        assert!(issues
            .iter()
            .all(|i| i.kind == UNPARSEABLE_SCRIPT || i.kind == UNSAFE_GLOB));
        assert_eq!(issues.len(), 13);
    }

    #[test]
    fn test_unreadable_unit() {
        let repo = RepoFixture::new().ebuild("dev-libs/foo", "1", "EAPI=8\nDEPEND=\"dev-libs/bar\n");
        let scanner = custom_scanner(repo.root(), ScanOptions::with_jobs(2));
        let mut sink = CollectSink::default();
        scanner.scan(&RepoSource::new(repo.root()), &mut sink);
        assert_eq!(sink.issues.len(), 1);
        assert_eq!(sink.issues[0].kind, UNREADABLE_UNIT);
        assert_eq!(sink.issues[0].check, SCANNER);
    }

    /// Requests a stop after the first accepted issue.
    struct Stopper {
        signal: StopSignal,
        inner: CollectSink,
    }

    impl ResultSink for Stopper {
        fn accept(&mut self, issue: Issue) {
            self.signal.stop();
            self.inner.accept(issue);
        }
    }

    #[test]
    fn test_cancellation_yields_prefix() {
        let repo = fixture();
        let full = {
            let scanner = custom_scanner(repo.root(), ScanOptions::with_jobs(2));
            let mut sink = CollectSink::default();
            scanner.scan(&RepoSource::new(repo.root()), &mut sink);
            sink.issues
        };

        let options = ScanOptions {
            jobs: 2,
            queue_capacity: 1,
            window: 2,
        };
        let scanner = custom_scanner(repo.root(), options);
        let mut sink = Stopper {
            signal: scanner.stop_signal(),
            inner: CollectSink::default(),
        };
        let summary = scanner.scan(&RepoSource::new(repo.root()), &mut sink);
        assert!(summary.cancelled);
        let partial = sink.inner.issues;
        assert!(!partial.is_empty());
        assert!(partial.len() < full.len());
        assert_eq!(partial[..], full[..partial.len()]);
    }
}
