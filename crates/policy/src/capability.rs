//! Capability descriptors declared by tools and mods.

use crate::validate::{self, Validated, ValidationCode, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capability types a tool may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    BoardRead,
    BoardWrite,
    SessionBroadcast,
    NetHttp,
    MediaCapture,
    AiGenerate,
}

impl CapabilityKind {
    /// Capabilities with effects visible to every session participant.
    pub fn is_broadcasting(&self) -> bool {
        matches!(self, Self::BoardWrite | Self::SessionBroadcast)
    }
}

/// A declared capability with optional scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityDescriptor {
    pub capability_id: String,
    pub kind: CapabilityKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>, // e.g., page id, domain, model name
    #[serde(default)]
    pub requires_approval: bool,
}

const DESCRIPTOR_KEYS: &[&str] = &["capabilityId", "kind", "scopes", "requiresApproval"];

const KIND_NAMES: &str =
    "board_read, board_write, session_broadcast, net_http, media_capture, ai_generate";

/// Normalized key names that must never appear in declarative descriptors.
const SECRET_KEYS: &[&str] = &[
    "apikey",
    "secret",
    "password",
    "token",
    "accesstoken",
    "privatekey",
    "clientsecret",
    "credential",
    "credentials",
];

/// Whether `key` looks like it would carry a secret.
pub fn is_secret_like(key: &str) -> bool {
    let normalized: String = key
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | '.' | ' '))
        .flat_map(char::to_lowercase)
        .collect();
    SECRET_KEYS.contains(&normalized.as_str())
}

/// Recursively reject secret-like keys anywhere inside `value`.
pub fn reject_secret_fields(value: &Value, path: &str) -> Validated<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = validate::join(path, key);
                if is_secret_like(key) {
                    return Err(ValidationError::new(
                        ValidationCode::ForbiddenField,
                        child_path,
                        format!("secret-like field '{key}' is not allowed in declarative descriptors"),
                    ));
                }
                reject_secret_fields(child, &child_path)?;
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| reject_secret_fields(item, &validate::index(path, i))),
        _ => Ok(()),
    }
}

/// Validate one raw capability descriptor.
pub fn validate_capability_descriptor(raw: &Value, path: &str) -> Validated<CapabilityDescriptor> {
    let map = validate::record(raw, path)?;
    validate::only_keys(map, DESCRIPTOR_KEYS, path)?;
    reject_secret_fields(raw, path)?;

    let capability_id = validate::non_empty_str(
        validate::required(map, "capabilityId", path)?,
        &validate::join(path, "capabilityId"),
    )?;
    let kind = validate::one_of(
        validate::required(map, "kind", path)?,
        &validate::join(path, "kind"),
        KIND_NAMES,
    )?;

    let mut scopes = Vec::new();
    if let Some(raw_scopes) = validate::optional(map, "scopes") {
        let scopes_path = validate::join(path, "scopes");
        for (i, scope) in validate::list(raw_scopes, &scopes_path)?.iter().enumerate() {
            let scope = validate::non_empty_str(scope, &validate::index(&scopes_path, i))?;
            scopes.push(scope.to_string());
        }
    }

    let requires_approval = match validate::optional(map, "requiresApproval") {
        Some(v) => validate::boolean(v, &validate::join(path, "requiresApproval"))?,
        None => false,
    };

    Ok(CapabilityDescriptor {
        capability_id: capability_id.to_string(),
        kind,
        scopes,
        requires_approval,
    })
}
