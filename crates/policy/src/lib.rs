//! Role policy engine with default-deny semantics.
//!
//! Core principle: **anything not explicitly allowed is denied.**
//!
//! - [`validate_role_policy_document`] turns untyped JSON into a
//!   [`RolePolicyDocument`], rejecting the whole document on any deviation.
//! - [`RolePolicyDocument::resolve`] answers `(role, surface, action)` lookups.
//! - [`PolicyStore`] owns the process-wide active document.
//! - The [`gates`] module exposes the boolean checks used by dispatch and
//!   presentation code.
//! - [`tool`] and [`capability`] validate declarative tool descriptors.

pub mod capability;
mod error;
pub mod gates;
mod policy;
mod store;
pub mod tool;
pub mod validate;

pub use capability::{CapabilityDescriptor, CapabilityKind};
pub use error::{Error, Result};
pub use gates::ExecutionRole;
pub use policy::{
    ActionDecisions, Decision, RoleEntry, RolePolicyDocument, builtin_document,
    validate_role_policy_document,
};
pub use store::PolicyStore;
pub use tool::{ToolRegistryEntry, validate_tool_registry, validate_tool_registry_entry};
pub use validate::{Validated, ValidationCode, ValidationError};
