//! Process-wide registry of active plugin manifests.

use crate::manifest::DeclarativePluginManifest;
use crate::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

pub type ManifestMap = BTreeMap<String, DeclarativePluginManifest>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// Owner of the active manifests, keyed by plugin id.
///
/// Every write swaps in a whole new map.
#[derive(Default)]
pub struct ManifestStore {
    manifests: RwLock<Arc<ManifestMap>>,
}

impl ManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current map.
    pub fn snapshot(&self) -> Arc<ManifestMap> {
        let current = self.manifests.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*current)
    }

    pub fn get(&self, plugin_id: &str) -> Option<DeclarativePluginManifest> {
        self.snapshot().get(plugin_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Register `manifest`, replacing any manifest with the same plugin id.
    pub fn upsert(&self, manifest: DeclarativePluginManifest) -> Result<UpsertOutcome> {
        let mut current = self.manifests.write().map_err(|_| Error::Poisoned)?;
        let mut next = ManifestMap::clone(&**current);
        let plugin_id = manifest.plugin_id.clone();
        let outcome = match next.insert(plugin_id.clone(), manifest) {
            Some(_) => UpsertOutcome::Replaced,
            None => UpsertOutcome::Created,
        };
        *current = Arc::new(next);
        tracing::info!(plugin = %plugin_id, ?outcome, "manifest registered");
        Ok(outcome)
    }

    /// Swap in `base` with `manifest` registered on top of it.
    ///
    /// Manifests missing from `base` are dropped. The outcome reports whether
    /// the map being replaced already held `manifest`'s plugin id.
    pub fn restore(&self, base: ManifestMap, manifest: DeclarativePluginManifest) -> Result<UpsertOutcome> {
        let mut current = self.manifests.write().map_err(|_| Error::Poisoned)?;
        let plugin_id = manifest.plugin_id.clone();
        let outcome = if current.contains_key(&plugin_id) {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Created
        };
        let mut next = base;
        next.insert(plugin_id.clone(), manifest);
        let dropped = current.keys().filter(|id| !next.contains_key(*id)).count();
        *current = Arc::new(next);
        tracing::info!(plugin = %plugin_id, ?outcome, dropped, "manifests restored");
        Ok(outcome)
    }

    /// Replace the whole map if it is still `expected`.
    pub fn compare_and_swap(&self, expected: &Arc<ManifestMap>, next: ManifestMap) -> Result<()> {
        let mut current = self.manifests.write().map_err(|_| Error::Poisoned)?;
        if !Arc::ptr_eq(&*current, expected) {
            return Err(Error::ManifestConflict);
        }
        *current = Arc::new(next);
        Ok(())
    }

    /// Drop every manifest.
    pub fn clear(&self) -> Result<()> {
        let mut current = self.manifests.write().map_err(|_| Error::Poisoned)?;
        *current = Arc::new(ManifestMap::new());
        Ok(())
    }
}
