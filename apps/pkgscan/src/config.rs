//! Configuration discovery and effective settings resolution.
//!
//! pkgscan reads `pkgscan.toml|yaml|yml` from the repository root (or the
//! closest ancestor) and merges it with CLI flags into an [`Effective`]
//! config. Defaults:
//! - `jobs`: available parallelism
//! - `output`: `human`
//! - `checks` / `skip_checks`: empty (every registered check)
//! - `cache.enabled`: true, `cache.dir`: `.pkgscan/cache`
//! - `glsa.enabled`: true, `glsa.dir`: `metadata/glsa`
//!
//! Overrides precedence: CLI > config file > defaults.

use crate::error::ConfigError;
use crate::scheduler::default_jobs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILES: &[&str] = &["pkgscan.toml", "pkgscan.yaml", "pkgscan.yml"];
pub const DEFAULT_CACHE_DIR: &str = ".pkgscan/cache";

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// `[cache]` section.
pub struct CacheCfg {
    pub enabled: Option<bool>,
    pub dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// `[glsa]` section.
pub struct GlsaCfg {
    pub enabled: Option<bool>,
    pub dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
/// Root configuration loaded from `pkgscan.toml|yaml`.
pub struct ScanConfig {
    pub jobs: Option<usize>,
    pub output: Option<String>,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub skip_checks: Vec<String>,
    pub cache: Option<CacheCfg>,
    pub glsa: Option<GlsaCfg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Some(OutputMode::Human),
            "json" => Some(OutputMode::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
/// Fully-resolved configuration used by commands after applying precedence.
pub struct Effective {
    pub repo_root: PathBuf,
    /// Config file that contributed, if any.
    pub config_path: Option<PathBuf>,
    pub jobs: usize,
    pub output: OutputMode,
    pub checks: Vec<String>,
    pub skip_checks: Vec<String>,
    pub cache_enabled: bool,
    pub cache_dir: PathBuf,
    pub glsa_enabled: bool,
    pub glsa_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Clone)]
/// Flags given on the command line; `None`/empty defers to the file.
pub struct CliOverrides {
    pub repo_root: Option<String>,
    pub jobs: Option<usize>,
    pub output: Option<String>,
    pub checks: Vec<String>,
    pub skip_checks: Vec<String>,
    pub no_cache: bool,
    pub cache_dir: Option<String>,
}

/// Walk upward from `start` to detect the repository root.
///
/// Stops at a directory holding a config file, `profiles/repo_name` or
/// `.git`; falls back to `start`.
pub fn detect_repo_root(start: &Path) -> PathBuf {
    let mut cur = start;
    loop {
        if CONFIG_FILES.iter().any(|f| cur.join(f).is_file())
            || cur.join("profiles").join("repo_name").is_file()
            || cur.join(".git").exists()
        {
            return cur.to_path_buf();
        }
        match cur.parent() {
            Some(p) => cur = p,
            None => return start.to_path_buf(),
        }
    }
}

/// Load `ScanConfig` from the first config file present under `root`.
pub fn load_config(root: &Path) -> Result<Option<(PathBuf, ScanConfig)>, ConfigError> {
    for name in CONFIG_FILES {
        let path = root.join(name);
        if !path.is_file() {
            continue;
        }
        let invalid = |reason: String| ConfigError::InvalidConfig {
            path: path.clone(),
            reason,
        };
        let text = fs::read_to_string(&path).map_err(|e| invalid(e.to_string()))?;
        let cfg: ScanConfig = if name.ends_with(".toml") {
            toml::from_str(&text).map_err(|e| invalid(e.to_string()))?
        } else {
            serde_yaml::from_str(&text).map_err(|e| invalid(e.to_string()))?
        };
        tracing::debug!(path = %path.display(), "loaded config");
        return Ok(Some((path, cfg)));
    }
    Ok(None)
}

fn resolve_dir(root: &Path, dir: &str) -> PathBuf {
    let p = Path::new(dir);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Resolve `Effective` by merging CLI flags, discovered config, and defaults.
pub fn resolve_effective(cli: &CliOverrides) -> Result<Effective, ConfigError> {
    let start = PathBuf::from(cli.repo_root.as_deref().unwrap_or("."));
    let repo_root = detect_repo_root(&start);
    let (config_path, cfg) = match load_config(&repo_root)? {
        Some((path, cfg)) => (Some(path), cfg),
        None => (None, ScanConfig::default()),
    };
    let file_path = || config_path.clone().unwrap_or_else(|| repo_root.clone());

    let jobs = cli.jobs.or(cfg.jobs).unwrap_or_else(default_jobs).max(1);

    let output_src = cli.output.clone().or(cfg.output);
    let output = match output_src {
        None => OutputMode::Human,
        Some(s) => OutputMode::parse(&s).ok_or_else(|| ConfigError::InvalidConfig {
            path: file_path(),
            reason: format!("unknown output mode {s:?} (expected human|json)"),
        })?,
    };

    let checks = if cli.checks.is_empty() {
        cfg.checks
    } else {
        cli.checks.clone()
    };
    let skip_checks = if cli.skip_checks.is_empty() {
        cfg.skip_checks
    } else {
        cli.skip_checks.clone()
    };

    let cache = cfg.cache.unwrap_or_default();
    let cache_enabled = !cli.no_cache && cache.enabled.unwrap_or(true);
    let cache_dir = cli
        .cache_dir
        .clone()
        .or(cache.dir)
        .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string());
    let cache_dir = resolve_dir(&repo_root, &cache_dir);

    let glsa = cfg.glsa.unwrap_or_default();
    let glsa_dir = glsa.dir.map(|d| resolve_dir(&repo_root, &d));

    Ok(Effective {
        jobs,
        output,
        checks,
        skip_checks,
        cache_enabled,
        cache_dir,
        glsa_enabled: glsa.enabled.unwrap_or(true),
        glsa_dir,
        config_path,
        repo_root,
    })
}
