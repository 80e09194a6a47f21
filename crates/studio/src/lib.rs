//! Mod studio: authoring drafts and the publish pipeline.
//!
//! An author edits a [`StudioDraftBundle`] (policy, layout, modules, theme,
//! template). [`preflight_studio_publish`] validates it without side effects;
//! [`Studio`] commits it atomically and can roll back to any
//! [`StudioSnapshot`].
//!
//! ```
//! use std::sync::Arc;
//! use policy::PolicyStore;
//! use studio::{ManifestStore, ModuleDraft, ModuleSlot, Studio, StudioDraftBundle};
//!
//! let studio = Studio::new(Arc::new(PolicyStore::new()), Arc::new(ManifestStore::new()));
//! let mut draft = StudioDraftBundle::default();
//! draft.modules.push(ModuleDraft::new("next", ModuleSlot::ToolbarBottom, "nextStep"));
//!
//! let outcome = studio.publish_studio_draft_bundle(&draft)?;
//! assert_eq!(outcome.message(), "manifest studio created");
//! # Ok::<(), studio::Error>(())
//! ```

pub mod diagnostics;
mod error;
pub mod manifest;
mod manifest_store;
pub mod module;
mod publish;
mod snapshot;
pub mod template;
pub mod theme;

pub use diagnostics::{
    DiagnosticCode, DiagnosticInput, DiagnosticLevel, ModuleDiagnostic, can_apply, diagnose,
};
pub use error::{Error, Result};
pub use manifest::{DeclarativePluginManifest, build_manifest, parse_manifest, validate_manifest};
pub use manifest_store::{ManifestMap, ManifestStore, UpsertOutcome};
pub use module::{LayoutDraft, ModuleAction, ModuleDraft, ModuleSlot};
pub use publish::{
    Preflight, PreflightReport, PublishOutcome, PublishReceipt, PublishStage, StageFailure, Studio,
    StudioDraftBundle, preflight_studio_publish,
};
pub use snapshot::{StudioSnapshot, create_studio_snapshot};
pub use template::TemplateDraft;
pub use theme::{ThemeDraft, ThemePreset};
