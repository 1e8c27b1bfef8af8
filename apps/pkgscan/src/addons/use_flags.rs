//! Known USE flags derived from the profiles tree.

use super::profiles::ProfileData;
use super::{Addon, AddonContext, AddonId, AddonValue};
use crate::error::AddonError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UseFlags {
    pub global: BTreeSet<String>,
    pub expand: BTreeSet<String>,
    pub local: BTreeMap<String, BTreeSet<String>>,
    /// Arch names double as implicit flags.
    pub implicit: BTreeSet<String>,
}

impl UseFlags {
    pub fn from_profiles(profiles: &ProfileData) -> Self {
        Self {
            global: profiles.global_use.clone(),
            expand: profiles.use_expand.clone(),
            local: profiles.local_use.clone(),
            implicit: profiles.arches.clone(),
        }
    }

    /// Whether `flag` is described anywhere in the repository.
    pub fn is_known(&self, flag: &str) -> bool {
        self.global.contains(flag)
            || self.expand.contains(flag)
            || self.implicit.contains(flag)
            || self.local.values().any(|flags| flags.contains(flag))
    }
}

pub struct UseFlagsAddon;

impl Addon for UseFlagsAddon {
    fn id(&self) -> AddonId {
        AddonId::USE_FLAGS
    }

    fn depends_on(&self) -> &'static [AddonId] {
        &[AddonId::PROFILES]
    }

    fn compute(&self, ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError> {
        let profiles = ctx.dependency::<ProfileData>(AddonId::PROFILES)?;
        Ok(Arc::new(UseFlags::from_profiles(&profiles)))
    }
}
