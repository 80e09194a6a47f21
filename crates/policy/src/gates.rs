//! Boolean gates consumed by presentation and command-dispatch layers.
//!
//! Each gate is a single lookup against a [`RolePolicyDocument`] on one of
//! the well-known surfaces below. None of them has an allow-by-default path.

use crate::RolePolicyDocument;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known policy surfaces.
pub mod surfaces {
    pub const COMMAND_DISPATCH: &str = "command.dispatch";
    pub const COMMAND_APPROVAL: &str = "command.approval";
    pub const TOOL_EXECUTE: &str = "tool.execute";
    pub const TOOL_APPROVAL: &str = "tool.approval";
    pub const UI_VISIBILITY: &str = "ui.visibility";
    pub const MOD_TOOLBAR: &str = "mod.toolbar";
    pub const MOD_PANEL: &str = "mod.panel";
}

/// Action checked on the `mod.*` surfaces before contributions are mounted.
pub const MOUNT_ACTION: &str = "mount";

/// Role a live-session participant executes as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionRole {
    Host,
    #[default]
    Student,
}

impl ExecutionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Student => "student",
        }
    }
}

impl fmt::Display for ExecutionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a raw role claim to an execution role.
///
/// Only an explicit `host` claim yields [`ExecutionRole::Host`]; anything else,
/// including a missing claim, executes with student privileges.
pub fn resolve_execution_role(raw: Option<&str>) -> ExecutionRole {
    match raw.map(str::trim) {
        Some(role) if role.eq_ignore_ascii_case("host") => ExecutionRole::Host,
        _ => ExecutionRole::Student,
    }
}

pub fn can_dispatch_command_for_role(
    doc: &RolePolicyDocument,
    role: ExecutionRole,
    command_id: &str,
) -> bool {
    doc.resolve(role.as_str(), surfaces::COMMAND_DISPATCH, command_id)
        .is_allowed()
}

pub fn can_execute_tool_for_role(doc: &RolePolicyDocument, role: ExecutionRole, tool_id: &str) -> bool {
    doc.resolve(role.as_str(), surfaces::TOOL_EXECUTE, tool_id)
        .is_allowed()
}

/// Whether a command the role cannot dispatch directly should be queued for
/// host approval instead of being dropped.
pub fn should_queue_command_approval_for_role(
    doc: &RolePolicyDocument,
    role: ExecutionRole,
    command_id: &str,
) -> bool {
    !can_dispatch_command_for_role(doc, role, command_id)
        && doc
            .resolve(role.as_str(), surfaces::COMMAND_APPROVAL, command_id)
            .is_allowed()
}

/// Tool counterpart of [`should_queue_command_approval_for_role`].
pub fn should_queue_tool_approval_for_role(
    doc: &RolePolicyDocument,
    role: ExecutionRole,
    tool_id: &str,
) -> bool {
    !can_execute_tool_for_role(doc, role, tool_id)
        && doc
            .resolve(role.as_str(), surfaces::TOOL_APPROVAL, tool_id)
            .is_allowed()
}

pub fn can_access_layout_visibility_for_role(
    doc: &RolePolicyDocument,
    role: ExecutionRole,
    action: &str,
) -> bool {
    doc.resolve(role.as_str(), surfaces::UI_VISIBILITY, action)
        .is_allowed()
}

pub fn can_mount_mod_toolbar_for_role(doc: &RolePolicyDocument, role: ExecutionRole) -> bool {
    doc.resolve(role.as_str(), surfaces::MOD_TOOLBAR, MOUNT_ACTION)
        .is_allowed()
}

pub fn can_mount_mod_panel_for_role(doc: &RolePolicyDocument, role: ExecutionRole) -> bool {
    doc.resolve(role.as_str(), surfaces::MOD_PANEL, MOUNT_ACTION)
        .is_allowed()
}
