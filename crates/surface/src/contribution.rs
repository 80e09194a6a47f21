//! Toolbar and panel contributions offered by mods, packages and users.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Merge slot shared by every toolbar contribution.
pub const TOOLBAR_SLOT: &str = "toolbar";
/// Merge slot shared by every panel contribution.
pub const PANEL_SLOT: &str = "panel";

/// How the presentation layer is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MountMode {
    WindowHost,
    WindowStudent,
    Embedded,
}

/// Toolbar group a contribution declares; packages allow-list these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolbarGroup {
    Navigation,
    Playback,
    Drawing,
    Authoring,
    Utility,
}

impl ToolbarGroup {
    pub const ALL: [ToolbarGroup; 5] = [
        Self::Navigation,
        Self::Playback,
        Self::Drawing,
        Self::Authoring,
        Self::Utility,
    ];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Playback => "playback",
            Self::Drawing => "drawing",
            Self::Authoring => "authoring",
            Self::Utility => "utility",
        }
    }
}

/// Panel slot a contribution declares; packages allow-list these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelSlot {
    Left,
    Right,
    Bottom,
}

impl PanelSlot {
    pub const ALL: [PanelSlot; 3] = [Self::Left, Self::Right, Self::Bottom];

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Bottom => "bottom",
        }
    }
}

/// Why a contribution was rejected during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RejectReason {
    EmptyId,
    EmptyLabel,
    EmptyCommand,
    EmptyComponent,
    UnknownGroup { group: String },
    UnknownSlot { slot: String },
    /// The merged value's id does not match the rule identity.
    IdMismatch { item_id: String, value_id: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyId => f.write_str("id must not be empty"),
            Self::EmptyLabel => f.write_str("label must not be empty"),
            Self::EmptyCommand => f.write_str("commandId must not be empty"),
            Self::EmptyComponent => f.write_str("component must not be empty"),
            Self::UnknownGroup { group } => write!(f, "unknown toolbar group '{group}'"),
            Self::UnknownSlot { slot } => write!(f, "unknown panel slot '{slot}'"),
            Self::IdMismatch { item_id, value_id } => {
                write!(f, "rule targets '{item_id}' but carries '{value_id}'")
            }
        }
    }
}

/// A normalized contribution ready for gating and merging.
pub trait Contribution: Clone {
    fn id(&self) -> &str;
    fn order(&self) -> Option<i64>;
    /// Group or slot name the package allow-list is checked against.
    fn scope(&self) -> &'static str;
    /// Re-check normalization invariants on an already typed value.
    fn validate(&self) -> Result<(), RejectReason>;
}

/// An untyped contribution as authored.
pub trait RawContribution: Clone {
    type Normalized: Contribution;
    fn normalize(&self) -> Result<Self::Normalized, RejectReason>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawToolbarItem {
    pub id: String,
    pub label: String,
    pub command_id: String,
    pub group: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolbarContribution {
    pub id: String,
    pub label: String,
    pub command_id: String,
    pub group: ToolbarGroup,
    pub order: Option<i64>,
    pub payload: Value,
}

impl RawContribution for RawToolbarItem {
    type Normalized = ToolbarContribution;

    fn normalize(&self) -> Result<ToolbarContribution, RejectReason> {
        let group = self.group.trim();
        let contribution = ToolbarContribution {
            id: self.id.trim().to_string(),
            label: self.label.trim().to_string(),
            command_id: self.command_id.trim().to_string(),
            group: ToolbarGroup::parse(group).ok_or_else(|| RejectReason::UnknownGroup {
                group: group.to_string(),
            })?,
            order: self.order,
            payload: self.payload.clone(),
        };
        contribution.validate()?;
        Ok(contribution)
    }
}

impl Contribution for ToolbarContribution {
    fn id(&self) -> &str {
        &self.id
    }

    fn order(&self) -> Option<i64> {
        self.order
    }

    fn scope(&self) -> &'static str {
        self.group.as_str()
    }

    fn validate(&self) -> Result<(), RejectReason> {
        if self.id.trim().is_empty() {
            return Err(RejectReason::EmptyId);
        }
        if self.label.trim().is_empty() {
            return Err(RejectReason::EmptyLabel);
        }
        if self.command_id.trim().is_empty() {
            return Err(RejectReason::EmptyCommand);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPanelItem {
    pub id: String,
    pub title: String,
    pub slot: String,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelContribution {
    pub id: String,
    pub title: String,
    pub slot: PanelSlot,
    pub component: String,
    pub order: Option<i64>,
    pub payload: Value,
}

impl RawContribution for RawPanelItem {
    type Normalized = PanelContribution;

    fn normalize(&self) -> Result<PanelContribution, RejectReason> {
        let slot = self.slot.trim();
        let contribution = PanelContribution {
            id: self.id.trim().to_string(),
            title: self.title.trim().to_string(),
            slot: PanelSlot::parse(slot).ok_or_else(|| RejectReason::UnknownSlot {
                slot: slot.to_string(),
            })?,
            component: self.component.trim().to_string(),
            order: self.order,
            payload: self.payload.clone(),
        };
        contribution.validate()?;
        Ok(contribution)
    }
}

impl Contribution for PanelContribution {
    fn id(&self) -> &str {
        &self.id
    }

    fn order(&self) -> Option<i64> {
        self.order
    }

    fn scope(&self) -> &'static str {
        self.slot.as_str()
    }

    fn validate(&self) -> Result<(), RejectReason> {
        if self.id.trim().is_empty() {
            return Err(RejectReason::EmptyId);
        }
        if self.title.trim().is_empty() {
            return Err(RejectReason::EmptyLabel);
        }
        if self.component.trim().is_empty() {
            return Err(RejectReason::EmptyComponent);
        }
        Ok(())
    }
}

/// A mod currently registered with the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredMod {
    pub id: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub toolbar: Vec<RawToolbarItem>,
    #[serde(default)]
    pub panels: Vec<RawPanelItem>,
}

/// Mods in precedence order: priority descending, then id ascending.
pub fn mods_by_precedence(mods: &[RegisteredMod]) -> Vec<&RegisteredMod> {
    let mut sorted: Vec<_> = mods.iter().collect();
    sorted.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
    sorted
}
