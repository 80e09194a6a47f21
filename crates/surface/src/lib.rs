//! UI surface resolution for mods.
//!
//! Everything that decides *what a mod may show, and where* lives here:
//!
//! - [`layer`] folds package, mod and user rules into one ordered list.
//! - [`toolbar`] places built-in toolbar actions per mode and viewport.
//! - [`package`] holds distributable packages and their allow-lists.
//! - [`bridge`] gates and merges mod toolbar and panel contributions.

pub mod bridge;
pub mod contribution;
mod error;
pub mod layer;
pub mod package;
pub mod toolbar;

pub use bridge::{BlockedContribution, BridgeResolution, ContributionBridge, RejectedContribution, UserOverrides};
pub use contribution::{
    MountMode, PanelContribution, PanelSlot, RegisteredMod, ToolbarContribution, ToolbarGroup,
};
pub use error::{Error, Result};
pub use layer::{Layer, LayerName, MergeResult, ResourceLayerSet, RuleOperation, UiItemRule, merge_layers};
pub use package::{ModPackageDefinition, ModPackageRegistry, PackageAllowList};
pub use toolbar::{ResolvedToolbarPlan, ToolbarMode, ToolbarSurface, ToolbarSurfaceResolver, Viewport};
