//! Role policy documents and decision lookup.

use crate::validate::{self, ROOT, Validated, ValidationCode, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Outcome of a role-policy lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    #[default]
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Action name → decision.
pub type ActionDecisions = BTreeMap<String, Decision>;

/// Per-role grants, keyed by surface name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub surfaces: BTreeMap<String, ActionDecisions>,
}

/// A validated role-policy document.
///
/// Instances are only produced by [`validate_role_policy_document`] or the
/// built-in constructors, so `default_decision` is always [`Decision::Deny`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePolicyDocument {
    version: u64,
    default_decision: Decision,
    roles: BTreeMap<String, RoleEntry>,
}

const BUILTIN_POLICY: &str = include_str!("builtin_policy.json");

const ROOT_KEYS: &[&str] = &["version", "defaultDecision", "roles"];
const ROLE_KEYS: &[&str] = &["surfaces"];

impl RolePolicyDocument {
    /// A document with no grants at all: every lookup resolves to deny.
    pub fn deny_all() -> Self {
        Self {
            version: 1,
            default_decision: Decision::Deny,
            roles: BTreeMap::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn default_decision(&self) -> Decision {
        self.default_decision
    }

    pub fn roles(&self) -> &BTreeMap<String, RoleEntry> {
        &self.roles
    }

    /// Look up the decision for `(role, surface, action)`.
    ///
    /// Blank inputs and misses at any level resolve to the default decision.
    pub fn resolve(&self, role: &str, surface: &str, action: &str) -> Decision {
        let (role, surface, action) = (role.trim(), surface.trim(), action.trim());
        if role.is_empty() || surface.is_empty() || action.is_empty() {
            return self.default_decision;
        }
        self.roles
            .get(role)
            .and_then(|entry| entry.surfaces.get(surface))
            .and_then(|actions| actions.get(action))
            .copied()
            .unwrap_or(self.default_decision)
    }

    /// Serialize back to the persisted JSON shape.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Structurally validate a raw role-policy document.
///
/// The whole document is rejected on the first deviation; there is no partial
/// acceptance. An absent `defaultDecision` is forced to `deny`; any present
/// value other than the string `"deny"` is rejected.
pub fn validate_role_policy_document(raw: &Value) -> Validated<RolePolicyDocument> {
    let root = validate::record(raw, ROOT)?;
    validate::only_keys(root, ROOT_KEYS, ROOT)?;

    let version_path = validate::join(ROOT, "version");
    let version = validate::required(root, "version", ROOT)?;
    let version = validate::positive_integer(version, &version_path).map_err(|_| {
        ValidationError::new(
            ValidationCode::InvalidVersion,
            &version_path,
            format!("version must be a positive integer, found {version}"),
        )
    })?;

    if let Some(default) = root.get("defaultDecision") {
        if default.as_str() != Some("deny") {
            return Err(ValidationError::new(
                ValidationCode::DefaultNotDeny,
                validate::join(ROOT, "defaultDecision"),
                format!("defaultDecision must be \"deny\", found {default}"),
            ));
        }
    }

    let roles_path = validate::join(ROOT, "roles");
    let raw_roles = validate::record(validate::required(root, "roles", ROOT)?, &roles_path)?;
    let mut roles = BTreeMap::new();
    for (role, entry) in raw_roles {
        let role_path = validate::join(&roles_path, role);
        validate::non_empty_key(role, &role_path)?;
        roles.insert(role.clone(), validate_role_entry(entry, &role_path)?);
    }

    Ok(RolePolicyDocument {
        version,
        default_decision: Decision::Deny,
        roles,
    })
}

fn validate_role_entry(raw: &Value, path: &str) -> Validated<RoleEntry> {
    let entry = validate::record(raw, path)?;
    validate::only_keys(entry, ROLE_KEYS, path)?;

    let surfaces_path = validate::join(path, "surfaces");
    let raw_surfaces = validate::record(validate::required(entry, "surfaces", path)?, &surfaces_path)?;

    let mut surfaces = BTreeMap::new();
    for (surface, actions) in raw_surfaces {
        let surface_path = validate::join(&surfaces_path, surface);
        validate::non_empty_key(surface, &surface_path)?;
        let raw_actions = validate::record(actions, &surface_path)?;

        let mut decisions = ActionDecisions::new();
        for (action, decision) in raw_actions {
            let action_path = validate::join(&surface_path, action);
            validate::non_empty_key(action, &action_path)?;
            decisions.insert(action.clone(), parse_decision(decision, &action_path)?);
        }
        surfaces.insert(surface.clone(), decisions);
    }

    Ok(RoleEntry { surfaces })
}

fn parse_decision(value: &Value, path: &str) -> Validated<Decision> {
    match value.as_str() {
        Some("allow") => Ok(Decision::Allow),
        Some("deny") => Ok(Decision::Deny),
        _ => Err(ValidationError::new(
            ValidationCode::InvalidDecision,
            path,
            format!("decision must be \"allow\" or \"deny\", found {value}"),
        )),
    }
}

/// The compiled-in policy document.
///
/// Validated once per process. If the embedded document fails validation the
/// deny-all document is used instead, so a broken build never grants access.
pub fn builtin_document() -> &'static RolePolicyDocument {
    static BUILTIN: OnceLock<RolePolicyDocument> = OnceLock::new();
    BUILTIN.get_or_init(|| compile_builtin(BUILTIN_POLICY))
}

fn compile_builtin(source: &str) -> RolePolicyDocument {
    let raw: Value = match serde_json::from_str(source) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(error = %e, "built-in policy is not valid JSON, falling back to deny-all");
            return RolePolicyDocument::deny_all();
        }
    };
    match validate_role_policy_document(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "built-in policy failed validation, falling back to deny-all");
            RolePolicyDocument::deny_all()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "version": 1,
            "defaultDecision": "deny",
            "roles": {
                "student": {
                    "surfaces": {
                        "ui.visibility": { "show-student-player-bar": "allow" }
                    }
                },
                "host": {
                    "surfaces": {
                        "command.dispatch": { "nextStep": "allow", "clearBoard": "deny" }
                    }
                }
            }
        })
    }

    #[test]
    fn valid_document_resolves_grants() {
        let doc = validate_role_policy_document(&sample()).unwrap();
        assert_eq!(doc.resolve("host", "command.dispatch", "nextStep"), Decision::Allow);
        assert_eq!(doc.resolve("host", "command.dispatch", "clearBoard"), Decision::Deny);
        assert_eq!(
            doc.resolve(" student ", "ui.visibility", "show-student-player-bar"),
            Decision::Allow
        );
    }

    #[test]
    fn misses_resolve_to_deny() {
        let doc = validate_role_policy_document(&sample()).unwrap();
        assert_eq!(doc.resolve("guest", "command.dispatch", "nextStep"), Decision::Deny);
        assert_eq!(doc.resolve("host", "tool.execute", "nextStep"), Decision::Deny);
        assert_eq!(doc.resolve("host", "command.dispatch", "unknown"), Decision::Deny);
        assert_eq!(doc.resolve("", "command.dispatch", "nextStep"), Decision::Deny);
        assert_eq!(doc.resolve("host", "  ", "nextStep"), Decision::Deny);
    }

    #[test]
    fn student_grant_does_not_leak_to_host() {
        let doc = validate_role_policy_document(&sample()).unwrap();
        assert_eq!(
            doc.resolve("host", "ui.visibility", "show-student-player-bar"),
            Decision::Deny
        );
    }

    #[test]
    fn rejects_default_allow() {
        let mut raw = sample();
        raw["defaultDecision"] = json!("allow");
        let err = validate_role_policy_document(&raw).unwrap_err();
        assert_eq!(err.code, ValidationCode::DefaultNotDeny);

        raw["defaultDecision"] = json!(false);
        let err = validate_role_policy_document(&raw).unwrap_err();
        assert_eq!(err.code, ValidationCode::DefaultNotDeny);
    }

    #[test]
    fn missing_default_is_forced_to_deny() {
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("defaultDecision");
        let doc = validate_role_policy_document(&raw).unwrap();
        assert_eq!(doc.default_decision(), Decision::Deny);
    }

    #[test]
    fn rejects_unknown_keys() {
        let mut raw = sample();
        raw["extra"] = json!(true);
        let err = validate_role_policy_document(&raw).unwrap_err();
        assert_eq!(err.code, ValidationCode::UnknownKey);

        let mut raw = sample();
        raw["roles"]["host"]["priority"] = json!(1);
        let err = validate_role_policy_document(&raw).unwrap_err();
        assert_eq!(err.code, ValidationCode::UnknownKey);
        assert_eq!(err.path, "$.roles.host.priority");
    }

    #[test]
    fn rejects_bad_versions() {
        for bad in [json!(0), json!(-1), json!(1.5), json!("1"), Value::Null] {
            let mut raw = sample();
            raw["version"] = bad;
            let err = validate_role_policy_document(&raw).unwrap_err();
            assert_eq!(err.code, ValidationCode::InvalidVersion);
        }
        let mut raw = sample();
        raw.as_object_mut().unwrap().remove("version");
        assert_eq!(
            validate_role_policy_document(&raw).unwrap_err().code,
            ValidationCode::MissingField
        );
    }

    #[test]
    fn rejects_non_decision_values() {
        for bad in [json!(true), json!("ALLOW"), json!(1), json!({"allow": true})] {
            let mut raw = sample();
            raw["roles"]["host"]["surfaces"]["command.dispatch"]["nextStep"] = bad;
            let err = validate_role_policy_document(&raw).unwrap_err();
            assert_eq!(err.code, ValidationCode::InvalidDecision);
            assert_eq!(err.path, "$.roles.host.surfaces[\"command.dispatch\"].nextStep");
        }
    }

    #[test]
    fn rejects_blank_keys() {
        let mut raw = sample();
        raw["roles"][" "] = json!({"surfaces": {}});
        assert_eq!(
            validate_role_policy_document(&raw).unwrap_err().code,
            ValidationCode::EmptyKey
        );

        let mut raw = sample();
        raw["roles"]["host"]["surfaces"]["command.dispatch"][""] = json!("allow");
        assert_eq!(
            validate_role_policy_document(&raw).unwrap_err().code,
            ValidationCode::EmptyKey
        );
    }

    #[test]
    fn rejects_missing_surfaces_and_non_records() {
        let mut raw = sample();
        raw["roles"]["host"] = json!({});
        assert_eq!(
            validate_role_policy_document(&raw).unwrap_err().code,
            ValidationCode::MissingField
        );
        assert_eq!(
            validate_role_policy_document(&json!([])).unwrap_err().code,
            ValidationCode::NotARecord
        );
    }

    #[test]
    fn builtin_document_is_valid() {
        let raw: Value = serde_json::from_str(BUILTIN_POLICY).unwrap();
        let doc = validate_role_policy_document(&raw).unwrap();
        assert_eq!(builtin_document(), &doc);
        assert!(doc.resolve("host", "mod.toolbar", "mount").is_allowed());
        assert!(!doc.resolve("student", "mod.toolbar", "mount").is_allowed());
    }

    #[test]
    fn broken_builtin_falls_back_to_deny_all() {
        let doc = compile_builtin(r#"{"version": 1, "defaultDecision": "allow", "roles": {}}"#);
        assert_eq!(doc, RolePolicyDocument::deny_all());
        assert_eq!(compile_builtin("not json"), RolePolicyDocument::deny_all());
    }

    #[test]
    fn round_trips_persisted_shape() {
        let doc = validate_role_policy_document(&sample()).unwrap();
        let value = doc.to_value();
        assert_eq!(value["defaultDecision"], json!("deny"));
        assert_eq!(validate_role_policy_document(&value).unwrap(), doc);
    }
}
