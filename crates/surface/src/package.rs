//! Distributable mod packages and the active-package registry.

use crate::contribution::{PanelSlot, RawPanelItem, RawToolbarItem, ToolbarGroup};
use crate::layer::UiItemRule;
use crate::toolbar::{ToolbarActionSurfaceRule, ToolbarSurfaceResolver};
use crate::{Error, Result};
use policy::validate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Groups and slots a package lets contributions occupy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAllowList {
    #[serde(default)]
    pub toolbar_groups: BTreeSet<ToolbarGroup>,
    #[serde(default)]
    pub panel_slots: BTreeSet<PanelSlot>,
}

impl PackageAllowList {
    /// Every group and slot; used when no package is active.
    pub fn base() -> Self {
        Self {
            toolbar_groups: ToolbarGroup::ALL.into_iter().collect(),
            panel_slots: PanelSlot::ALL.into_iter().collect(),
        }
    }

    /// Nothing allowed.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn allows_group(&self, group: ToolbarGroup) -> bool {
        self.toolbar_groups.contains(&group)
    }

    pub fn allows_slot(&self, slot: PanelSlot) -> bool {
        self.panel_slots.contains(&slot)
    }
}

/// A mod package as distributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModPackageDefinition {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub toolbar_items: Vec<UiItemRule<RawToolbarItem>>,
    #[serde(default)]
    pub panel_items: Vec<UiItemRule<RawPanelItem>>,
    #[serde(default)]
    pub toolbar_surfaces: Vec<ToolbarActionSurfaceRule>,
    #[serde(default)]
    pub allow: PackageAllowList,
}

impl ModPackageDefinition {
    /// Load a package definition from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse a package definition from JSON.
    pub fn parse(json: &str) -> Result<Self> {
        let mut package: Self = serde_json::from_str(json)?;
        package.id = package.id.trim().to_string();
        validate::identifier(&package.id, "$.id")?;
        Ok(package)
    }
}

/// Known packages plus the id of the active one.
#[derive(Debug, Clone, Default)]
pub struct ModPackageRegistry {
    packages: BTreeMap<String, ModPackageDefinition>,
    active: Option<String>,
}

impl ModPackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a package, replacing any package with the same id.
    /// Returns `true` if one was replaced.
    pub fn register(&mut self, package: ModPackageDefinition) -> bool {
        self.packages.insert(package.id.clone(), package).is_some()
    }

    pub fn set_active(&mut self, id: Option<&str>) -> Result<()> {
        match id.map(str::trim) {
            Some(id) if !self.packages.contains_key(id) => Err(Error::UnknownPackage(id.to_string())),
            Some(id) => {
                self.active = Some(id.to_string());
                Ok(())
            }
            None => {
                self.active = None;
                Ok(())
            }
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&ModPackageDefinition> {
        self.packages.get(id.trim())
    }

    pub fn packages(&self) -> impl Iterator<Item = &ModPackageDefinition> {
        self.packages.values()
    }

    /// Resolve the package an explicit id (or the registry's active id) names.
    ///
    /// `Ok(None)` means no package is active; `Err(id)` means the named
    /// package is not registered.
    pub fn resolve_active<'a>(
        &'a self,
        explicit: Option<&'a str>,
    ) -> std::result::Result<Option<&'a ModPackageDefinition>, &'a str> {
        match explicit.or(self.active.as_deref()) {
            None => Ok(None),
            Some(id) => self.get(id).map(Some).ok_or(id),
        }
    }

    /// Allow-list in force for `active_package_id`.
    ///
    /// No active package means the base allow-list; an unknown package id
    /// means nothing is allowed.
    pub fn allow_list_for(&self, active_package_id: Option<&str>) -> PackageAllowList {
        match self.resolve_active(active_package_id) {
            Ok(None) => PackageAllowList::base(),
            Ok(Some(package)) => package.allow.clone(),
            Err(id) => {
                tracing::debug!(package = id, "active package is not registered; allowing nothing");
                PackageAllowList::none()
            }
        }
    }

    /// Toolbar resolver with the active package's surface overrides applied.
    pub fn toolbar_resolver(&self, active_package_id: Option<&str>, cutover_enabled: bool) -> ToolbarSurfaceResolver {
        let overrides: &[ToolbarActionSurfaceRule] = match self.resolve_active(active_package_id) {
            Ok(Some(package)) => package.toolbar_surfaces.as_slice(),
            _ => &[],
        };
        ToolbarSurfaceResolver::new(overrides, cutover_enabled)
    }
}
