//! Keyed addon store with first-writer-wins publication.
//!
//! Each addon id owns a slot holding a `OnceLock`. The first caller of
//! [`AddonStore::get`] runs the computation inside `get_or_init`; concurrent
//! callers for the same id block on that slot and receive the same `Arc`.

use super::cache::{repo_identity, CacheKey, CachePersistence};
use super::{Addon, AddonContext, AddonId, AddonSettings, AddonValue};
use crate::error::AddonError;
use crate::metadata::MetadataProvider;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

#[derive(Clone)]
/// Memoized result of an addon computation.
pub enum Outcome {
    Ready(AddonValue),
    Failed(String),
    Disabled(String),
}

impl std::fmt::Debug for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Ready(_) => f.write_str("Ready"),
            Outcome::Failed(r) => f.debug_tuple("Failed").field(r).finish(),
            Outcome::Disabled(r) => f.debug_tuple("Disabled").field(r).finish(),
        }
    }
}

type Slot = Arc<OnceLock<Outcome>>;

pub struct AddonStore {
    addons: BTreeMap<AddonId, Arc<dyn Addon>>,
    slots: RwLock<BTreeMap<AddonId, Slot>>,
    repo_root: PathBuf,
    settings: AddonSettings,
    provider: Arc<dyn MetadataProvider>,
    persistence: Option<Box<dyn CachePersistence>>,
    identity: OnceLock<String>,
}

impl AddonStore {
    pub fn new(
        addons: impl IntoIterator<Item = Arc<dyn Addon>>,
        repo_root: impl Into<PathBuf>,
        settings: AddonSettings,
        provider: Arc<dyn MetadataProvider>,
    ) -> Self {
        Self {
            addons: addons.into_iter().map(|a| (a.id(), a)).collect(),
            slots: RwLock::new(BTreeMap::new()),
            repo_root: repo_root.into(),
            settings,
            provider,
            persistence: None,
            identity: OnceLock::new(),
        }
    }

    /// Persist addon values across scans.
    pub fn with_persistence(mut self, persistence: Box<dyn CachePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn slot(&self, id: AddonId) -> Slot {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
        {
            return slot.clone();
        }
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    /// Value of `id`, computing it (and its dependencies) on first request.
    pub fn get(&self, id: AddonId) -> Outcome {
        self.slot(id).get_or_init(|| self.compute(id)).clone()
    }

    /// Typed view of a ready addon value.
    pub fn value<T: std::any::Any + Send + Sync>(&self, id: AddonId) -> Result<Arc<T>, AddonError> {
        match self.get(id) {
            Outcome::Ready(v) => v
                .downcast::<T>()
                .map_err(|_| AddonError::failed(id.as_str(), "unexpected value type")),
            Outcome::Failed(reason) => Err(AddonError::failed(id.as_str(), reason)),
            Outcome::Disabled(reason) => Err(AddonError::disabled(id.as_str(), reason)),
        }
    }

    /// Drop the published value; the next `get` recomputes into a fresh
    /// slot while holders of the old `Arc` keep reading the old value.
    pub fn invalidate(&self, id: AddonId) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(OnceLock::new()));
    }

    fn identity(&self) -> &str {
        self.identity.get_or_init(|| repo_identity(&self.repo_root))
    }

    fn compute(&self, id: AddonId) -> Outcome {
        let Some(addon) = self.addons.get(&id) else {
            return Outcome::Failed(format!("unknown addon {id}"));
        };
        for dep in addon.depends_on() {
            match self.get(*dep) {
                Outcome::Ready(_) => {}
                Outcome::Failed(reason) => {
                    return Outcome::Failed(format!("dependency {dep} failed: {reason}"))
                }
                Outcome::Disabled(reason) => {
                    return Outcome::Disabled(format!("dependency {dep} disabled: {reason}"))
                }
            }
        }

        let key = match (&self.persistence, addon.persist_version()) {
            (Some(_), Some(version)) => Some(CacheKey {
                addon: id.as_str().to_string(),
                version,
                identity: self.identity().to_string(),
            }),
            _ => None,
        };
        if let (Some(cache), Some(key)) = (&self.persistence, &key) {
            if let Some(value) = cache.load(key).and_then(|v| addon.decode(v)) {
                tracing::debug!(addon = %id, %key, "addon loaded from cache");
                return Outcome::Ready(value);
            }
        }

        tracing::debug!(addon = %id, "computing addon");
        let ctx = AddonContext {
            repo_root: &self.repo_root,
            settings: &self.settings,
            provider: self.provider.as_ref(),
            store: self,
        };
        let result = catch_unwind(AssertUnwindSafe(|| addon.compute(&ctx)));
        match result {
            Ok(Ok(value)) => {
                if let (Some(cache), Some(key)) = (&self.persistence, &key) {
                    if let Some(encoded) = addon.encode(&value) {
                        if let Err(err) = cache.store(key, &encoded) {
                            tracing::warn!(addon = %id, %err, "failed to persist addon");
                        }
                    }
                }
                Outcome::Ready(value)
            }
            Ok(Err(AddonError::Failed { reason, .. })) => {
                tracing::warn!(addon = %id, %reason, "addon failed");
                Outcome::Failed(reason)
            }
            Ok(Err(AddonError::Disabled { reason, .. })) => {
                tracing::info!(addon = %id, %reason, "addon disabled");
                Outcome::Disabled(reason)
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::warn!(addon = %id, %reason, "addon panicked");
                Outcome::Failed(reason)
            }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
