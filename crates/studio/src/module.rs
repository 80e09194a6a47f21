//! Authored module and layout drafts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Where a module mounts. Closed set; anything else fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleSlot {
    ToolbarTop,
    ToolbarBottom,
    PanelLeft,
    PanelRight,
}

impl ModuleSlot {
    pub const ALL: [ModuleSlot; 4] = [
        Self::ToolbarTop,
        Self::ToolbarBottom,
        Self::PanelLeft,
        Self::PanelRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolbarTop => "toolbar-top",
            Self::ToolbarBottom => "toolbar-bottom",
            Self::PanelLeft => "panel-left",
            Self::PanelRight => "panel-right",
        }
    }

    pub fn is_toolbar(&self) -> bool {
        matches!(self, Self::ToolbarTop | Self::ToolbarBottom)
    }
}

impl fmt::Display for ModuleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command a module dispatches when activated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleAction {
    pub command_id: String,
    #[serde(default)]
    pub payload: Value,
}

impl ModuleAction {
    pub fn command(command_id: impl Into<String>) -> Self {
        Self {
            command_id: command_id.into(),
            payload: Value::Null,
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDraft {
    pub id: String,
    #[serde(default)]
    pub label: String,
    pub slot: ModuleSlot,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub order: i64,
    pub action: ModuleAction,
}

impl ModuleDraft {
    /// An enabled module with `order` 0, labelled by its id.
    pub fn new(id: impl Into<String>, slot: ModuleSlot, command_id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            slot,
            enabled: true,
            order: 0,
            action: ModuleAction::command(command_id),
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = order;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Explicit per-slot ordering plus the set of hidden slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutDraft {
    #[serde(default)]
    pub slot_order: BTreeMap<ModuleSlot, Vec<String>>,
    #[serde(default)]
    pub hidden_slots: BTreeSet<ModuleSlot>,
}

impl LayoutDraft {
    pub fn is_hidden(&self, slot: ModuleSlot) -> bool {
        self.hidden_slots.contains(&slot)
    }

    /// Position of `module_id` in the explicit order for `slot`, if listed.
    pub fn position(&self, slot: ModuleSlot, module_id: &str) -> Option<usize> {
        self.slot_order
            .get(&slot)?
            .iter()
            .position(|id| id.trim() == module_id)
    }
}
