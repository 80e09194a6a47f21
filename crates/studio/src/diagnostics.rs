//! Conflict detection over draft modules and runtime contributions.
//!
//! Every check runs; nothing short-circuits. Each duplicated value yields a
//! single diagnostic no matter how many times it occurs.

use crate::module::ModuleDraft;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use surface::{BlockedContribution, RegisteredMod, ToolbarContribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    /// Blocks publish.
    Error,
    /// Informational only.
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    MissingId,
    DuplicateId,
    DuplicateOrder,
    MissingCommand,
    CommandCatalogEmpty,
    UnknownCommand,
    PriorityCollision,
    DuplicateToolbarId,
    DuplicateCommand,
    BlockedContributions,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingId => "missing-id",
            Self::DuplicateId => "duplicate-id",
            Self::DuplicateOrder => "duplicate-order",
            Self::MissingCommand => "missing-command",
            Self::CommandCatalogEmpty => "command-catalog-empty",
            Self::UnknownCommand => "unknown-command",
            Self::PriorityCollision => "priority-collision",
            Self::DuplicateToolbarId => "duplicate-toolbar-id",
            Self::DuplicateCommand => "duplicate-command",
            Self::BlockedContributions => "blocked-contributions",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDiagnostic {
    pub level: DiagnosticLevel,
    pub code: DiagnosticCode,
    pub message: String,
}

impl ModuleDiagnostic {
    fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            code,
            message: message.into(),
        }
    }

    fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl fmt::Display for ModuleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Inputs to [`diagnose`]. Empty slices skip the corresponding checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticInput<'a> {
    pub modules: &'a [ModuleDraft],
    /// Known command ids. `None` skips command checks entirely.
    pub known_commands: Option<&'a [String]>,
    /// Mod runtime toolbar contributions, before overrides and filtering.
    pub toolbar_raw: &'a [ToolbarContribution],
    /// Toolbar contributions the package allow-list dropped.
    pub toolbar_blocked: &'a [BlockedContribution],
    pub registered_mods: &'a [RegisteredMod],
}

impl<'a> DiagnosticInput<'a> {
    pub fn modules(modules: &'a [ModuleDraft]) -> Self {
        Self {
            modules,
            ..Self::default()
        }
    }
}

pub fn diagnose(input: &DiagnosticInput<'_>) -> Vec<ModuleDiagnostic> {
    let enabled: Vec<&ModuleDraft> = input.modules.iter().filter(|m| m.enabled).collect();
    let mut diagnostics = Vec::new();
    check_module_ids(&enabled, &mut diagnostics);
    check_module_orders(&enabled, &mut diagnostics);
    if let Some(catalog) = input.known_commands {
        check_commands(&enabled, catalog, &mut diagnostics);
    }
    check_priorities(input.registered_mods, &mut diagnostics);
    check_toolbar(input.toolbar_raw, &mut diagnostics);
    check_blocked(input.toolbar_blocked, &mut diagnostics);
    diagnostics
}

/// True when nothing blocks publish.
pub fn can_apply(diagnostics: &[ModuleDiagnostic]) -> bool {
    !diagnostics.iter().any(ModuleDiagnostic::is_error)
}

pub fn first_error(diagnostics: &[ModuleDiagnostic]) -> Option<&ModuleDiagnostic> {
    diagnostics.iter().find(|d| d.is_error())
}

/// Values that occur more than once, with their count, in sorted order.
fn duplicates<K: Ord>(values: impl IntoIterator<Item = K>) -> Vec<(K, usize)> {
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_insert(0usize) += 1;
    }
    counts.into_iter().filter(|(_, n)| *n > 1).collect()
}

fn check_module_ids(enabled: &[&ModuleDraft], out: &mut Vec<ModuleDiagnostic>) {
    for module in enabled.iter().filter(|m| m.id.trim().is_empty()) {
        out.push(ModuleDiagnostic::error(
            DiagnosticCode::MissingId,
            format!("enabled module '{}' has no id", module.label.trim()),
        ));
    }
    let ids = enabled.iter().map(|m| m.id.trim()).filter(|id| !id.is_empty());
    for (id, count) in duplicates(ids) {
        out.push(ModuleDiagnostic::error(
            DiagnosticCode::DuplicateId,
            format!("module id '{id}' is used by {count} enabled modules"),
        ));
    }
}

fn check_module_orders(enabled: &[&ModuleDraft], out: &mut Vec<ModuleDiagnostic>) {
    for (order, count) in duplicates(enabled.iter().map(|m| m.order)) {
        out.push(ModuleDiagnostic::warning(
            DiagnosticCode::DuplicateOrder,
            format!("order {order} is shared by {count} enabled modules; ties resolve by id"),
        ));
    }
}

fn check_commands(enabled: &[&ModuleDraft], catalog: &[String], out: &mut Vec<ModuleDiagnostic>) {
    let known: BTreeSet<&str> = catalog.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
    if known.is_empty() {
        out.push(ModuleDiagnostic::warning(
            DiagnosticCode::CommandCatalogEmpty,
            "command catalog is empty; command ids were not checked",
        ));
    }
    for module in enabled {
        let command = module.action.command_id.trim();
        if command.is_empty() {
            out.push(ModuleDiagnostic::error(
                DiagnosticCode::MissingCommand,
                format!("module '{}' has no command", module.id.trim()),
            ));
        } else if !known.is_empty() && !known.contains(command) {
            out.push(ModuleDiagnostic::error(
                DiagnosticCode::UnknownCommand,
                format!("module '{}' references unknown command '{command}'", module.id.trim()),
            ));
        }
    }
}

fn check_priorities(mods: &[RegisteredMod], out: &mut Vec<ModuleDiagnostic>) {
    let mut by_priority: BTreeMap<i32, Vec<&str>> = BTreeMap::new();
    for registered in mods {
        by_priority.entry(registered.priority).or_default().push(registered.id.as_str());
    }
    for (priority, mut ids) in by_priority.into_iter().rev() {
        if ids.len() > 1 {
            ids.sort_unstable();
            out.push(ModuleDiagnostic::warning(
                DiagnosticCode::PriorityCollision,
                format!("mods {} share priority {priority}; resolved by id", ids.join(", ")),
            ));
        }
    }
}

fn check_toolbar(raw: &[ToolbarContribution], out: &mut Vec<ModuleDiagnostic>) {
    for (id, count) in duplicates(raw.iter().map(|c| c.id.as_str())) {
        out.push(ModuleDiagnostic::error(
            DiagnosticCode::DuplicateToolbarId,
            format!("toolbar id '{id}' is contributed {count} times"),
        ));
    }

    let mut by_command: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for contribution in raw {
        by_command
            .entry(contribution.command_id.as_str())
            .or_default()
            .insert(contribution.id.as_str());
    }
    for (command, ids) in by_command {
        if ids.len() > 1 {
            let ids: Vec<_> = ids.into_iter().collect();
            out.push(ModuleDiagnostic::warning(
                DiagnosticCode::DuplicateCommand,
                format!("toolbar items {} all dispatch '{command}'", ids.join(", ")),
            ));
        }
    }
}

fn check_blocked(blocked: &[BlockedContribution], out: &mut Vec<ModuleDiagnostic>) {
    let dropped: BTreeSet<&str> = blocked.iter().map(|b| b.item_id.as_str()).collect();
    if !dropped.is_empty() {
        out.push(ModuleDiagnostic::warning(
            DiagnosticCode::BlockedContributions,
            format!("{} toolbar contribution(s) dropped by policy", dropped.len()),
        ));
    }
}
