//! Contribution bridge: gates, filters and merges mod UI contributions
//! before they reach presentation.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. gather rules from the package, mod and user layers
//! 2. normalize each value
//! 3. gate on mount mode and role
//! 4. drop values outside the active package's allow-list
//! 5. merge the layers
//! 6. re-validate merged entries
//! 7. sort by `(order, id)`
//! 8. subtract reserved ids
//!
//! Gating runs before the merge so a denied layer cannot win a merge by
//! arriving later.

use crate::contribution::{
    Contribution, MountMode, PANEL_SLOT, PanelContribution, RawContribution, RawPanelItem,
    RawToolbarItem, RegisteredMod, RejectReason, TOOLBAR_SLOT, ToolbarContribution,
    mods_by_precedence,
};
use crate::layer::{Layer, LayerName, MergeDiagnostic, UiItemRule, compare_order_then_id, merge_layers};
use crate::package::{ModPackageRegistry, PackageAllowList};
use policy::gates::{can_mount_mod_panel_for_role, can_mount_mod_toolbar_for_role};
use policy::{ExecutionRole, RolePolicyDocument};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// End-user override rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverrides {
    #[serde(default)]
    pub toolbar: Vec<UiItemRule<RawToolbarItem>>,
    #[serde(default)]
    pub panels: Vec<UiItemRule<RawPanelItem>>,
}

/// A contribution dropped by the package allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedContribution {
    pub layer: LayerName,
    pub item_id: String,
    pub scope: String,
}

/// A contribution dropped for failing normalization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedContribution {
    pub layer: LayerName,
    pub item_id: String,
    pub reason: RejectReason,
}

/// Everything the bridge decided for one surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeResolution<T> {
    /// Whether the role/mount gate was open.
    pub mounted: bool,
    /// Final ordered list for presentation.
    pub items: Vec<T>,
    /// Normalized mod runtime contributions, before overrides and policy
    /// filtering.
    pub raw: Vec<T>,
    /// Contributions dropped by the package allow-list, one per layer entry.
    pub blocked: Vec<BlockedContribution>,
    pub rejected: Vec<RejectedContribution>,
    pub merge_diagnostics: Vec<MergeDiagnostic>,
}

impl<T> Default for BridgeResolution<T> {
    fn default() -> Self {
        Self {
            mounted: false,
            items: Vec::new(),
            raw: Vec::new(),
            blocked: Vec::new(),
            rejected: Vec::new(),
            merge_diagnostics: Vec::new(),
        }
    }
}

/// Allow-list check for one normalized contribution.
trait AllowListed {
    fn allowed_by(&self, allow: &PackageAllowList) -> bool;
}

impl AllowListed for ToolbarContribution {
    fn allowed_by(&self, allow: &PackageAllowList) -> bool {
        allow.allows_group(self.group)
    }
}

impl AllowListed for PanelContribution {
    fn allowed_by(&self, allow: &PackageAllowList) -> bool {
        allow.allows_slot(self.slot)
    }
}

/// Read-only view over everything that contributes UI.
pub struct ContributionBridge<'a> {
    policy: &'a RolePolicyDocument,
    packages: &'a ModPackageRegistry,
    mods: &'a [RegisteredMod],
    user: &'a UserOverrides,
}

impl<'a> ContributionBridge<'a> {
    pub fn new(
        policy: &'a RolePolicyDocument,
        packages: &'a ModPackageRegistry,
        mods: &'a [RegisteredMod],
        user: &'a UserOverrides,
    ) -> Self {
        Self {
            policy,
            packages,
            mods,
            user,
        }
    }

    /// Full toolbar resolution, including what was dropped and why.
    pub fn resolve_toolbar(
        &self,
        mount_mode: MountMode,
        role: ExecutionRole,
        reserved_ids: Option<&BTreeSet<String>>,
        active_package_id: Option<&str>,
    ) -> BridgeResolution<ToolbarContribution> {
        let package_rules = match self.packages.resolve_active(active_package_id) {
            Ok(Some(package)) => package.toolbar_items.clone(),
            _ => Vec::new(),
        };
        let mod_rules: Vec<_> = self
            .mods_in_fold_order()
            .flat_map(|m| m.toolbar.iter())
            .map(|item| UiItemRule::add(TOOLBAR_SLOT, item.id.trim(), item.clone()).with_order(item.order))
            .collect();

        let gate_open = mount_mode == MountMode::WindowHost
            && can_mount_mod_toolbar_for_role(self.policy, role);

        resolve_contributions(
            [
                (LayerName::Package, package_rules),
                (LayerName::Mod, mod_rules),
                (LayerName::User, self.user.toolbar.clone()),
            ],
            gate_open,
            &self.packages.allow_list_for(active_package_id),
            reserved_ids,
        )
    }

    pub fn list_resolved_mod_toolbar_contributions(
        &self,
        mount_mode: MountMode,
        role: ExecutionRole,
        reserved_ids: Option<&BTreeSet<String>>,
        active_package_id: Option<&str>,
    ) -> Vec<ToolbarContribution> {
        self.resolve_toolbar(mount_mode, role, reserved_ids, active_package_id)
            .items
    }

    /// Full panel resolution, including what was dropped and why.
    pub fn resolve_panels(
        &self,
        role: ExecutionRole,
        active_package_id: Option<&str>,
    ) -> BridgeResolution<PanelContribution> {
        let package_rules = match self.packages.resolve_active(active_package_id) {
            Ok(Some(package)) => package.panel_items.clone(),
            _ => Vec::new(),
        };
        let mod_rules: Vec<_> = self
            .mods_in_fold_order()
            .flat_map(|m| m.panels.iter())
            .map(|item| UiItemRule::add(PANEL_SLOT, item.id.trim(), item.clone()).with_order(item.order))
            .collect();

        resolve_contributions(
            [
                (LayerName::Package, package_rules),
                (LayerName::Mod, mod_rules),
                (LayerName::User, self.user.panels.clone()),
            ],
            can_mount_mod_panel_for_role(self.policy, role),
            &self.packages.allow_list_for(active_package_id),
            None,
        )
    }

    pub fn list_resolved_mod_panel_contributions(
        &self,
        role: ExecutionRole,
        active_package_id: Option<&str>,
    ) -> Vec<PanelContribution> {
        self.resolve_panels(role, active_package_id).items
    }

    /// Lowest-precedence mod first, so higher-priority mods win the fold.
    fn mods_in_fold_order(&self) -> impl Iterator<Item = &'a RegisteredMod> {
        mods_by_precedence(self.mods).into_iter().rev()
    }
}

fn resolve_contributions<R>(
    sources: [(LayerName, Vec<UiItemRule<R>>); 3],
    gate_open: bool,
    allow: &PackageAllowList,
    reserved_ids: Option<&BTreeSet<String>>,
) -> BridgeResolution<R::Normalized>
where
    R: RawContribution,
    R::Normalized: AllowListed,
{
    let mut resolution = BridgeResolution::default();

    // normalize
    let mut layers = Vec::with_capacity(sources.len());
    for (name, rules) in sources {
        let mut normalized = Vec::with_capacity(rules.len());
        for rule in rules {
            let value = match &rule.value {
                Some(raw) => match raw.normalize() {
                    Ok(value) => Some(value),
                    Err(reason) => {
                        resolution.rejected.push(RejectedContribution {
                            layer: name,
                            item_id: rule.item_id.trim().to_string(),
                            reason,
                        });
                        continue;
                    }
                },
                None => None,
            };
            if let (LayerName::Mod, Some(value)) = (name, &value) {
                resolution.raw.push(value.clone());
            }
            normalized.push(rule.with_value(value));
        }
        layers.push(Layer::new(name, normalized));
    }

    // role / mount gate
    if !gate_open {
        tracing::debug!(offered = resolution.raw.len(), "contribution surface not mounted for role");
        return resolution;
    }
    resolution.mounted = true;

    // package allow-list; blocked identities stay blocked across layers
    let mut blocked_ids = BTreeSet::new();
    for layer in &mut layers {
        let name = layer.name;
        layer.rules.retain(|rule| match &rule.value {
            Some(value) if !value.allowed_by(allow) => {
                let (slot_id, item_id) = rule.identity();
                resolution.blocked.push(BlockedContribution {
                    layer: name,
                    item_id: item_id.to_string(),
                    scope: value.scope().to_string(),
                });
                blocked_ids.insert((slot_id.to_string(), item_id.to_string()));
                false
            }
            _ => true,
        });
    }
    if !resolution.blocked.is_empty() {
        tracing::debug!(blocked = resolution.blocked.len(), "contributions outside package allow-list");
    }

    let merged = merge_layers(&layers);
    resolution.merge_diagnostics = merged.diagnostics;

    // re-validate merged entries
    let mut items = Vec::with_capacity(merged.items.len());
    for entry in merged.items {
        if blocked_ids.contains(&(entry.slot_id.clone(), entry.item_id.clone())) {
            continue;
        }
        let check = entry.value.validate().and_then(|()| {
            if entry.value.id().trim() == entry.item_id {
                Ok(())
            } else {
                Err(RejectReason::IdMismatch {
                    item_id: entry.item_id.clone(),
                    value_id: entry.value.id().to_string(),
                })
            }
        });
        match check {
            Ok(()) => items.push((entry.order.or(entry.value.order()), entry.value)),
            Err(reason) => resolution.rejected.push(RejectedContribution {
                layer: entry.layer,
                item_id: entry.item_id,
                reason,
            }),
        }
    }

    items.sort_by(|(a_order, a), (b_order, b)| compare_order_then_id(*a_order, a.id(), *b_order, b.id()));

    resolution.items = items
        .into_iter()
        .map(|(_, item)| item)
        .filter(|item| reserved_ids.is_none_or(|reserved| !reserved.contains(item.id())))
        .collect();
    resolution
}
