//! pkgscan CLI binary entry point.
//! Resolves configuration, builds the scan plan and prints results.

use clap::Parser;
use pkgscan::addons::{AddonSettings, AddonStore, DiskCache};
use pkgscan::cli::{CacheCmd, Cli, Commands, ShowWhat};
use pkgscan::config::{self, CliOverrides, OutputMode};
use pkgscan::error::ConfigError;
use pkgscan::logging;
use pkgscan::metadata::{EbuildProvider, MetadataProvider};
use pkgscan::models::{internal, Scope};
use pkgscan::registry::{Registry, Selection};
use pkgscan::scheduler::{ScanOptions, Scanner};
use pkgscan::shell::BashGrammar;
use pkgscan::sink::{error_prefix, note_prefix, HumanSink, JsonSink};
use pkgscan::source::{RepoSource, Restriction};
use std::sync::Arc;

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match cli.cmd {
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            0
        }
        Commands::Scan {
            targets,
            repo_root,
            checks,
            skip_checks,
            jobs,
            output,
            no_cache,
            cache_dir,
            commits,
        } => {
            let overrides = CliOverrides {
                repo_root,
                jobs,
                output,
                checks,
                skip_checks,
                no_cache,
                cache_dir,
            };
            match scan(&overrides, &targets, commits) {
                Ok(true) => 1,
                Ok(false) => 0,
                Err(err) => {
                    eprintln!("{} {}", error_prefix(), err);
                    2
                }
            }
        }
        Commands::Show { what } => match Registry::builtin() {
            Ok(registry) => {
                show(&registry, what);
                0
            }
            Err(err) => {
                eprintln!("{} {}", error_prefix(), err);
                2
            }
        },
        Commands::Cache {
            cmd: CacheCmd::Clear {
                repo_root,
                cache_dir,
            },
        } => {
            let overrides = CliOverrides {
                repo_root,
                cache_dir,
                ..Default::default()
            };
            match config::resolve_effective(&overrides) {
                Ok(eff) => match DiskCache::new(&eff.cache_dir).clear() {
                    Ok(n) => {
                        println!("removed {n} cache entries from {}", eff.cache_dir.display());
                        0
                    }
                    Err(err) => {
                        eprintln!("{} {}", error_prefix(), err);
                        1
                    }
                },
                Err(err) => {
                    eprintln!("{} {}", error_prefix(), err);
                    2
                }
            }
        }
    };
    std::process::exit(code);
}

/// Run a scan; `Ok(true)` when an error-severity issue was reported.
fn scan(
    overrides: &CliOverrides,
    targets: &[String],
    commits: Vec<String>,
) -> Result<bool, ConfigError> {
    let eff = config::resolve_effective(overrides)?;
    if eff.config_path.is_none() {
        tracing::info!("no pkgscan config found; using defaults");
    }
    if !eff.repo_root.join("profiles").is_dir() {
        eprintln!(
            "{} {} has no profiles/ directory; is it an ebuild repository?",
            note_prefix(),
            eff.repo_root.display()
        );
    }

    let registry = Registry::builtin()?;
    let plan = registry.plan(&Selection::from_lists(&eff.checks, &eff.skip_checks))?;
    let restriction = Restriction::new(targets)?;

    let provider: Arc<dyn MetadataProvider> = Arc::new(EbuildProvider);
    let settings = AddonSettings {
        glsa_enabled: eff.glsa_enabled,
        glsa_dir: eff.glsa_dir.clone(),
    };
    let mut store = AddonStore::new(
        registry.addons_for(&plan),
        &eff.repo_root,
        settings,
        provider.clone(),
    );
    if eff.cache_enabled {
        store = store.with_persistence(Box::new(DiskCache::new(&eff.cache_dir)));
    }

    let scanner = Scanner::new(
        plan,
        store,
        provider,
        Arc::new(BashGrammar),
        ScanOptions::with_jobs(eff.jobs),
    );
    let source = RepoSource::new(&eff.repo_root)
        .with_restriction(restriction)
        .with_commits(commits);
    let summary = match eff.output {
        OutputMode::Human => scanner.scan(&source, &mut HumanSink::stdout()),
        OutputMode::Json => scanner.scan(&source, &mut JsonSink::stdout()),
    };
    Ok(summary.errors > 0)
}

fn show(registry: &Registry, what: ShowWhat) {
    match what {
        ShowWhat::Checks => {
            for check in registry.checks() {
                let addons: Vec<&str> =
                    check.required_addons().iter().map(|a| a.as_str()).collect();
                println!(
                    "{:<20} {:<10} {:<10} {}",
                    check.name(),
                    check.category(),
                    check.scope().as_str(),
                    addons.join(",")
                );
            }
        }
        ShowWhat::Scopes => {
            for scope in Scope::ALL {
                match scope.child() {
                    Some(child) => println!("{scope} (contains {child})"),
                    None => println!("{scope}"),
                }
            }
        }
        ShowWhat::Results => {
            for check in registry.checks() {
                for kind in check.known_results() {
                    println!("{:<32} {}", kind, check.name());
                }
            }
            for kind in [
                internal::INTERNAL_ERROR,
                internal::SKIPPED_CHECK,
                internal::UNREADABLE_UNIT,
            ] {
                println!("{:<32} {}", kind, internal::SCANNER);
            }
        }
    }
}
