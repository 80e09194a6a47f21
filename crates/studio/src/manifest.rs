//! Declarative plugin manifests derived from module drafts.

use crate::module::{LayoutDraft, ModuleDraft, ModuleSlot};
use policy::validate::{identifier, index, join, ROOT};
use policy::{Validated, ValidationCode, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

pub const MANIFEST_VERSION: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestEntryType {
    Button,
    Panel,
}

impl ManifestEntryType {
    pub fn for_slot(slot: ModuleSlot) -> Self {
        if slot.is_toolbar() { Self::Button } else { Self::Panel }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestProps {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManifestAction {
    pub command_id: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManifestUiEntry {
    pub id: String,
    pub slot: ModuleSlot,
    #[serde(rename = "type")]
    pub entry_type: ManifestEntryType,
    pub props: ManifestProps,
    pub action: ManifestAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeclarativePluginManifest {
    pub manifest_version: u64,
    pub plugin_id: String,
    pub ui: Vec<ManifestUiEntry>,
}

/// Build the manifest for `plugin_id` from drafts.
///
/// Only enabled modules in visible slots are included. Entries are grouped
/// by slot; inside a slot, modules named in the layout's explicit order come
/// first in that order, then the rest by module order, ties by id.
pub fn build_manifest(plugin_id: &str, modules: &[ModuleDraft], layout: &LayoutDraft) -> DeclarativePluginManifest {
    let mut visible: Vec<&ModuleDraft> = modules
        .iter()
        .filter(|m| m.enabled && !layout.is_hidden(m.slot))
        .collect();

    visible.sort_by(|a, b| {
        let rank = |m: &ModuleDraft| {
            let position = layout.position(m.slot, m.id.trim());
            (m.slot, position.is_none(), position.unwrap_or_default(), m.order)
        };
        rank(*a).cmp(&rank(*b)).then_with(|| a.id.trim().cmp(b.id.trim()))
    });

    let ui = visible
        .into_iter()
        .map(|m| {
            let id = m.id.trim().to_string();
            let label = match m.label.trim() {
                "" => id.clone(),
                label => label.to_string(),
            };
            ManifestUiEntry {
                id,
                slot: m.slot,
                entry_type: ManifestEntryType::for_slot(m.slot),
                props: ManifestProps { label },
                action: ManifestAction {
                    command_id: m.action.command_id.trim().to_string(),
                    payload: m.action.payload.clone(),
                },
            }
        })
        .collect();

    DeclarativePluginManifest {
        manifest_version: MANIFEST_VERSION,
        plugin_id: plugin_id.trim().to_string(),
        ui,
    }
}

pub fn validate_manifest(manifest: &DeclarativePluginManifest) -> Validated<()> {
    if manifest.manifest_version != MANIFEST_VERSION {
        return Err(ValidationError::new(
            ValidationCode::InvalidVersion,
            join(ROOT, "manifestVersion"),
            format!("expected {MANIFEST_VERSION}, found {}", manifest.manifest_version),
        ));
    }
    identifier(&manifest.plugin_id, &join(ROOT, "pluginId"))?;

    let ui = join(ROOT, "ui");
    let mut seen = BTreeSet::new();
    for (i, entry) in manifest.ui.iter().enumerate() {
        let path = index(&ui, i);
        identifier(&entry.id, &join(&path, "id"))?;
        if !seen.insert(entry.id.as_str()) {
            return Err(ValidationError::new(
                ValidationCode::Duplicate,
                join(&path, "id"),
                format!("duplicate ui entry '{}'", entry.id),
            ));
        }
        if entry.entry_type != ManifestEntryType::for_slot(entry.slot) {
            return Err(ValidationError::new(
                ValidationCode::InvalidValue,
                join(&path, "type"),
                format!("slot {} cannot host this entry type", entry.slot),
            ));
        }
        if entry.props.label.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationCode::InvalidValue,
                join(&join(&path, "props"), "label"),
                "must not be empty",
            ));
        }
        if entry.action.command_id.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationCode::InvalidValue,
                join(&join(&path, "action"), "commandId"),
                "must not be empty",
            ));
        }
    }
    Ok(())
}

/// Parse and validate a manifest from untyped JSON.
pub fn parse_manifest(raw: &Value) -> Validated<DeclarativePluginManifest> {
    let manifest: DeclarativePluginManifest = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::new(ValidationCode::InvalidType, ROOT, e.to_string()))?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module(id: &str, slot: ModuleSlot, order: i64) -> ModuleDraft {
        ModuleDraft::new(id, slot, "nextStep").with_order(order)
    }

    fn ids(manifest: &DeclarativePluginManifest) -> Vec<&str> {
        manifest.ui.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn single_toolbar_module() {
        let modules = vec![module("m1", ModuleSlot::ToolbarBottom, 0)];
        let manifest = build_manifest("lesson", &modules, &LayoutDraft::default());
        assert_eq!(ids(&manifest), vec!["m1"]);
        assert_eq!(manifest.ui[0].entry_type, ManifestEntryType::Button);
        assert_eq!(manifest.ui[0].props.label, "m1");
        assert!(validate_manifest(&manifest).is_ok());
    }

    #[test]
    fn filters_disabled_and_hidden_slots() {
        let modules = vec![
            module("a", ModuleSlot::ToolbarTop, 0),
            module("b", ModuleSlot::ToolbarTop, 1).disabled(),
            module("c", ModuleSlot::PanelLeft, 0),
        ];
        let layout = LayoutDraft {
            hidden_slots: [ModuleSlot::PanelLeft].into(),
            ..LayoutDraft::default()
        };
        assert_eq!(ids(&build_manifest("p", &modules, &layout)), vec!["a"]);
    }

    #[test]
    fn explicit_slot_order_then_module_order_then_id() {
        let modules = vec![
            module("z", ModuleSlot::ToolbarTop, 5),
            module("y", ModuleSlot::ToolbarTop, 1),
            module("b", ModuleSlot::ToolbarTop, 1),
            module("listed", ModuleSlot::ToolbarTop, 9),
            module("panel", ModuleSlot::PanelRight, 0),
        ];
        let layout = LayoutDraft {
            slot_order: [(ModuleSlot::ToolbarTop, vec!["listed".to_string(), "z".to_string()])].into(),
            ..LayoutDraft::default()
        };
        let manifest = build_manifest("p", &modules, &layout);
        assert_eq!(ids(&manifest), vec!["listed", "z", "b", "y", "panel"]);
        assert_eq!(manifest.ui[4].entry_type, ManifestEntryType::Panel);
    }

    #[test]
    fn build_is_deterministic() {
        let modules = vec![
            module("b", ModuleSlot::ToolbarTop, 0),
            module("a", ModuleSlot::ToolbarTop, 0),
        ];
        let first = build_manifest("p", &modules, &LayoutDraft::default());
        let mut reversed = modules.clone();
        reversed.reverse();
        assert_eq!(first, build_manifest("p", &reversed, &LayoutDraft::default()));
    }

    #[test]
    fn validation_catches_bad_entries() {
        let modules = vec![
            module("a", ModuleSlot::ToolbarTop, 0),
            module("a", ModuleSlot::ToolbarTop, 1),
        ];
        let err = validate_manifest(&build_manifest("p", &modules, &LayoutDraft::default())).unwrap_err();
        assert_eq!(err.code, ValidationCode::Duplicate);
        assert_eq!(err.path, "$.ui[1].id");

        let modules = vec![module("Bad Id", ModuleSlot::ToolbarTop, 0)];
        let err = validate_manifest(&build_manifest("p", &modules, &LayoutDraft::default())).unwrap_err();
        assert_eq!(err.code, ValidationCode::PatternMismatch);

        let mut blank = module("a", ModuleSlot::ToolbarTop, 0);
        blank.action.command_id = String::new();
        let err = validate_manifest(&build_manifest("p", &[blank], &LayoutDraft::default())).unwrap_err();
        assert_eq!(err.path, "$.ui[0].action.commandId");
    }

    #[test]
    fn parse_rejects_unknown_fields_and_versions() {
        let valid = json!({
            "manifestVersion": 1,
            "pluginId": "lesson",
            "ui": [{
                "id": "m1", "slot": "toolbar-top", "type": "button",
                "props": { "label": "Next" }, "action": { "commandId": "nextStep" }
            }]
        });
        assert_eq!(parse_manifest(&valid).unwrap().ui.len(), 1);

        let mut extra = valid.clone();
        extra["extra"] = json!(true);
        assert_eq!(parse_manifest(&extra).unwrap_err().code, ValidationCode::InvalidType);

        let mut version = valid.clone();
        version["manifestVersion"] = json!(2);
        assert_eq!(parse_manifest(&version).unwrap_err().code, ValidationCode::InvalidVersion);

        let mut mismatched = valid;
        mismatched["ui"][0]["type"] = json!("panel");
        assert_eq!(parse_manifest(&mismatched).unwrap_err().path, "$.ui[0].type");
    }
}
