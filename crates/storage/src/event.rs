//! Audit event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Channel carrying preflight, publish and rollback results.
pub const PUBLISH_CHANNEL: &str = "publish";

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A bundle went through preflight.
    Preflight { ok: bool, message: String },
    /// A bundle was committed, or rejected before commit.
    Publish {
        ok: bool,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot_id: Option<Uuid>,
    },
    /// A snapshot was replayed.
    Rollback {
        ok: bool,
        message: String,
        snapshot_id: Uuid,
    },
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Preflight { .. } => "preflight",
            Self::Publish { .. } => "publish",
            Self::Rollback { .. } => "rollback",
        }
    }

    pub fn ok(&self) -> bool {
        match self {
            Self::Preflight { ok, .. } | Self::Publish { ok, .. } | Self::Rollback { ok, .. } => *ok,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Preflight { message, .. }
            | Self::Publish { message, .. }
            | Self::Rollback { message, .. } => message,
        }
    }
}

/// An entry in the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub channel: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(channel: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// An event on the publish channel.
    pub fn publish(kind: EventKind) -> Self {
        Self::new(PUBLISH_CHANNEL, kind)
    }
}

/// An archived studio snapshot.
///
/// The bundle and the manifest map are kept as opaque JSON; callers own
/// their shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub reason: String,
    pub bundle: serde_json::Value,
    /// Plugin manifests active when the snapshot was taken.
    #[serde(default)]
    pub manifests: serde_json::Value,
}

/// Snapshot listing row, without the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub reason: String,
}
