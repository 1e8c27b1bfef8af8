//! Shared derived data ("addons") computed once per scan.
//!
//! An addon is computed lazily on first request through the [`AddonStore`],
//! published as an immutable `Arc`, and optionally persisted between scans
//! through a [`CachePersistence`] keyed by the repository identity.

pub mod cache;
pub mod glsa;
pub mod packages;
pub mod profiles;
pub mod store;
pub mod use_flags;

pub use cache::{CacheKey, CachePersistence, DiskCache};
pub use store::{AddonStore, Outcome};

use crate::error::AddonError;
use crate::metadata::MetadataProvider;
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A published addon value.
pub type AddonValue = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Stable addon name used in check declarations and cache keys.
pub struct AddonId(&'static str);

impl AddonId {
    pub const PACKAGES: AddonId = AddonId("packages");
    pub const PROFILES: AddonId = AddonId("profiles");
    pub const USE_FLAGS: AddonId = AddonId("use-flags");
    pub const GLSA: AddonId = AddonId("glsa");

    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for AddonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone)]
/// Addon knobs coming from configuration.
pub struct AddonSettings {
    pub glsa_enabled: bool,
    /// Advisory directory; defaults to `metadata/glsa` in the repository.
    pub glsa_dir: Option<PathBuf>,
}

impl Default for AddonSettings {
    fn default() -> Self {
        Self {
            glsa_enabled: true,
            glsa_dir: None,
        }
    }
}

/// What an addon sees while computing.
pub struct AddonContext<'a> {
    pub repo_root: &'a Path,
    pub settings: &'a AddonSettings,
    pub provider: &'a dyn MetadataProvider,
    pub(crate) store: &'a AddonStore,
}

impl AddonContext<'_> {
    /// Value of a declared dependency, computed through the store.
    pub fn dependency<T: Any + Send + Sync>(&self, id: AddonId) -> Result<Arc<T>, AddonError> {
        match self.store.get(id) {
            Outcome::Ready(v) => v
                .downcast::<T>()
                .map_err(|_| AddonError::failed(id.as_str(), "unexpected value type")),
            Outcome::Failed(reason) => Err(AddonError::failed(id.as_str(), reason)),
            Outcome::Disabled(reason) => Err(AddonError::disabled(id.as_str(), reason)),
        }
    }
}

/// A shared data source consumed by checks.
pub trait Addon: Send + Sync {
    fn id(&self) -> AddonId;

    fn depends_on(&self) -> &'static [AddonId] {
        &[]
    }

    fn compute(&self, ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError>;

    /// Format version of the persisted form; `None` keeps the addon in memory only.
    fn persist_version(&self) -> Option<u32> {
        None
    }

    fn encode(&self, _value: &AddonValue) -> Option<serde_json::Value> {
        None
    }

    fn decode(&self, _value: serde_json::Value) -> Option<AddonValue> {
        None
    }
}

/// The built-in addon catalog.
pub fn builtin() -> Vec<Arc<dyn Addon>> {
    vec![
        Arc::new(packages::PackagesAddon),
        Arc::new(profiles::ProfilesAddon),
        Arc::new(use_flags::UseFlagsAddon),
        Arc::new(glsa::GlsaAddon),
    ]
}
