//! Immutable captures of a studio bundle.

use crate::Result;
use crate::manifest_store::ManifestMap;
use crate::publish::StudioDraftBundle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use storage::SnapshotRecord;
use uuid::Uuid;

/// A bundle captured at a point in time, with the manifests that were
/// registered alongside it. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioSnapshot {
    id: Uuid,
    created_at: DateTime<Utc>,
    reason: String,
    bundle: StudioDraftBundle,
    manifests: ManifestMap,
}

impl StudioSnapshot {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn bundle(&self) -> &StudioDraftBundle {
        &self.bundle
    }

    /// Manifest registry contents at capture time.
    pub fn manifests(&self) -> &ManifestMap {
        &self.manifests
    }

    pub(crate) fn with_manifests(mut self, manifests: ManifestMap) -> Self {
        self.manifests = manifests;
        self
    }

    /// Archive form for [`storage::EventStore::save_snapshot`].
    pub fn to_record(&self) -> Result<SnapshotRecord> {
        Ok(SnapshotRecord {
            id: self.id,
            created_at: self.created_at,
            reason: self.reason.clone(),
            bundle: serde_json::to_value(&self.bundle)?,
            manifests: serde_json::to_value(&self.manifests)?,
        })
    }

    /// Restore an archived snapshot. The bundle is only decoded here; it is
    /// validated again when replayed.
    pub fn from_record(record: SnapshotRecord) -> Result<Self> {
        Ok(Self {
            id: record.id,
            created_at: record.created_at,
            reason: record.reason,
            bundle: serde_json::from_value(record.bundle)?,
            manifests: match record.manifests {
                Value::Null => ManifestMap::new(),
                manifests => serde_json::from_value(manifests)?,
            },
        })
    }
}

/// Capture a deep copy of `draft`.
pub fn create_studio_snapshot(reason: impl Into<String>, draft: &StudioDraftBundle) -> StudioSnapshot {
    StudioSnapshot {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        reason: reason.into(),
        bundle: draft.clone(),
        manifests: ManifestMap::new(),
    }
}
