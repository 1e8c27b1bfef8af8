//! CLI argument parsing via `clap`.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "pkgscan",
    version,
    about = "QA scanner for ebuild repositories",
    long_about = "pkgscan statically checks every version, package, category and the repository itself against a catalog of independent checks.\n\nConfiguration precedence: CLI > pkgscan.toml > defaults.",
    after_help = "Examples:\n  pkgscan scan\n  pkgscan scan dev-libs/foo 'app-misc/*' --checks shell\n  pkgscan scan --skip-checks glsa --output json\n  pkgscan show results",
    arg_required_else_help = true
)]
/// Top-level CLI options and subcommands.
pub struct Cli {
    /// Debug logging on stderr
    #[arg(short, long, global = true, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show version
    #[command(about = "Show version", long_about = "Print the current pkgscan version.")]
    Version,
    /// Scan a repository
    #[command(
        about = "Scan a repository",
        long_about = "Run the selected checks over the repository (or the targeted packages and categories). Exits 1 when an error-severity issue was reported, 2 on configuration errors.",
        after_help = "Examples:\n  pkgscan scan --repo-root /var/db/repos/gentoo\n  pkgscan scan sys-apps/portage --checks DependencyCheck,keywords"
    )]
    Scan {
        #[arg(help = "Target patterns: cat, cat/pkg, globs allowed (default: whole repository)")]
        targets: Vec<String>,
        #[arg(long, help = "Repository root (default: detected from current dir)")]
        repo_root: Option<String>,
        #[arg(long, value_delimiter = ',', help = "Checks to enable: names, categories or result kinds")]
        checks: Vec<String>,
        #[arg(long, value_delimiter = ',', help = "Checks to disable: names, categories or result kinds")]
        skip_checks: Vec<String>,
        #[arg(short, long, help = "Worker threads (default: available parallelism)")]
        jobs: Option<usize>,
        #[arg(long, help = "Output mode: human|json (default: human)")]
        output: Option<String>,
        #[arg(long, action = clap::ArgAction::SetTrue, help = "Do not read or write the addon cache")]
        no_cache: bool,
        #[arg(long, help = "Addon cache directory (default: .pkgscan/cache)")]
        cache_dir: Option<String>,
        #[arg(long, value_delimiter = ',', help = "Commit ids scanned after the repository")]
        commits: Vec<String>,
    },
    /// List registered checks, scopes or result kinds
    #[command(
        about = "Show catalog information",
        long_about = "List registered checks with their scope and addons, the scope hierarchy, or every result kind."
    )]
    Show {
        #[arg(value_enum)]
        what: ShowWhat,
    },
    /// Addon cache management
    Cache {
        #[command(subcommand)]
        cmd: CacheCmd,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ShowWhat {
    Checks,
    Scopes,
    Results,
}

#[derive(Subcommand)]
/// Subcommands for `pkgscan cache`
pub enum CacheCmd {
    /// Remove persisted addon values
    #[command(
        about = "Clear cache",
        long_about = "Remove every persisted addon value from the cache directory."
    )]
    Clear {
        #[arg(long, help = "Repository root (default: detected from current dir)")]
        repo_root: Option<String>,
        #[arg(long, help = "Addon cache directory (default: .pkgscan/cache)")]
        cache_dir: Option<String>,
    },
}
