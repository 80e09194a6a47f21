//! Declarative tool-registry entries.

use crate::capability::{CapabilityDescriptor, reject_secret_fields, validate_capability_descriptor};
use crate::validate::{self, ROOT, Validated, ValidationCode, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    Board,
    Media,
    Assessment,
    Generation,
    Utility,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    Trusted,
    Reviewed,
    Untrusted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Free,
    Low,
    Medium,
    High,
}

/// Where a tool runs. At least one target is always present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcp_server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_runtime_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimit {
    pub max_calls: u64,
    pub window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPolicy {
    pub timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_tier: Option<CostTier>,
    pub trust_level: TrustLevel,
}

/// A validated tool-registry entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRegistryEntry {
    pub tool_id: String,
    pub category: ToolCategory,
    pub input_schema: Value,
    pub output_schema: Value,
    pub capabilities: Vec<CapabilityDescriptor>,
    pub execution: ExecutionTarget,
    pub policy: ToolPolicy,
}

const ENTRY_KEYS: &[&str] = &[
    "toolId",
    "category",
    "inputSchema",
    "outputSchema",
    "capabilities",
    "execution",
    "policy",
];
const EXECUTION_KEYS: &[&str] = &["mcpServerId", "endpointRef", "localRuntimeId"];
const POLICY_KEYS: &[&str] = &["timeoutMs", "rateLimit", "costTier", "trustLevel"];
const RATE_LIMIT_KEYS: &[&str] = &["maxCalls", "windowMs"];
const SCHEMA_TYPES: &[&str] = &[
    "object", "array", "string", "number", "integer", "boolean", "null",
];

/// Validate a single raw tool-registry entry at `path`.
pub fn validate_tool_registry_entry(raw: &Value, path: &str) -> Validated<ToolRegistryEntry> {
    let map = validate::record(raw, path)?;
    validate::only_keys(map, ENTRY_KEYS, path)?;

    let tool_id = validate::non_empty_str(
        validate::required(map, "toolId", path)?,
        &validate::join(path, "toolId"),
    )?;
    let category = validate::one_of(
        validate::required(map, "category", path)?,
        &validate::join(path, "category"),
        "board, media, assessment, generation, utility",
    )?;

    let input_schema = validate::required(map, "inputSchema", path)?;
    validate_schema(input_schema, &validate::join(path, "inputSchema"))?;
    let output_schema = validate::required(map, "outputSchema", path)?;
    validate_schema(output_schema, &validate::join(path, "outputSchema"))?;

    let caps_path = validate::join(path, "capabilities");
    let mut capabilities = Vec::new();
    for (i, cap) in validate::list(validate::required(map, "capabilities", path)?, &caps_path)?
        .iter()
        .enumerate()
    {
        capabilities.push(validate_capability_descriptor(cap, &validate::index(&caps_path, i))?);
    }

    let execution = validate_execution(
        validate::required(map, "execution", path)?,
        &validate::join(path, "execution"),
    )?;
    let policy = validate_policy(
        validate::required(map, "policy", path)?,
        &validate::join(path, "policy"),
    )?;

    if policy.trust_level == TrustLevel::Untrusted {
        if let Some(i) = capabilities
            .iter()
            .position(|c| c.kind.is_broadcasting() && !c.requires_approval)
        {
            return Err(ValidationError::new(
                ValidationCode::InvalidValue,
                validate::index(&caps_path, i),
                "untrusted tools must require approval for broadcasting capabilities",
            ));
        }
    }

    Ok(ToolRegistryEntry {
        tool_id: tool_id.to_string(),
        category,
        input_schema: input_schema.clone(),
        output_schema: output_schema.clone(),
        capabilities,
        execution,
        policy,
    })
}

/// Validate a whole registry: a list of entries with unique tool ids.
pub fn validate_tool_registry(raw: &Value) -> Validated<Vec<ToolRegistryEntry>> {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    for (i, item) in validate::list(raw, ROOT)?.iter().enumerate() {
        let path = validate::index(ROOT, i);
        let entry = validate_tool_registry_entry(item, &path)?;
        if !seen.insert(entry.tool_id.clone()) {
            return Err(ValidationError::new(
                ValidationCode::Duplicate,
                validate::join(&path, "toolId"),
                format!("duplicate toolId '{}'", entry.tool_id),
            ));
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn validate_schema(raw: &Value, path: &str) -> Validated<()> {
    reject_secret_fields(raw, path)?;
    check_schema_shape(raw, path)
}

fn check_schema_shape(raw: &Value, path: &str) -> Validated<()> {
    let map = validate::record(raw, path)?;
    let type_path = validate::join(path, "type");
    let ty = validate::non_empty_str(validate::required(map, "type", path)?, &type_path)?;
    if !SCHEMA_TYPES.contains(&ty) {
        return Err(ValidationError::new(
            ValidationCode::InvalidValue,
            type_path,
            format!("unknown schema type '{ty}'"),
        ));
    }

    if let Some(props) = validate::optional(map, "properties") {
        let props_path = validate::join(path, "properties");
        for (name, schema) in validate::record(props, &props_path)? {
            let prop_path = validate::join(&props_path, name);
            validate::non_empty_key(name, &prop_path)?;
            check_schema_shape(schema, &prop_path)?;
        }
    }
    if let Some(items) = validate::optional(map, "items") {
        check_schema_shape(items, &validate::join(path, "items"))?;
    }
    Ok(())
}

fn validate_execution(raw: &Value, path: &str) -> Validated<ExecutionTarget> {
    let map = validate::record(raw, path)?;
    validate::only_keys(map, EXECUTION_KEYS, path)?;

    let target = ExecutionTarget {
        mcp_server_id: optional_id(map, "mcpServerId", path)?,
        endpoint_ref: optional_id(map, "endpointRef", path)?,
        local_runtime_id: optional_id(map, "localRuntimeId", path)?,
    };
    if target.mcp_server_id.is_none() && target.endpoint_ref.is_none() && target.local_runtime_id.is_none() {
        return Err(ValidationError::new(
            ValidationCode::MissingField,
            path,
            "execution needs at least one of mcpServerId, endpointRef, localRuntimeId",
        ));
    }
    Ok(target)
}

fn optional_id(map: &Map<String, Value>, key: &str, path: &str) -> Validated<Option<String>> {
    validate::optional(map, key)
        .map(|v| validate::non_empty_str(v, &validate::join(path, key)).map(str::to_string))
        .transpose()
}

fn validate_policy(raw: &Value, path: &str) -> Validated<ToolPolicy> {
    let map = validate::record(raw, path)?;
    validate::only_keys(map, POLICY_KEYS, path)?;

    let timeout_ms = validate::positive_integer(
        validate::required(map, "timeoutMs", path)?,
        &validate::join(path, "timeoutMs"),
    )?;

    let rate_limit = match validate::optional(map, "rateLimit") {
        Some(v) => {
            let rl_path = validate::join(path, "rateLimit");
            let rl = validate::record(v, &rl_path)?;
            validate::only_keys(rl, RATE_LIMIT_KEYS, &rl_path)?;
            Some(RateLimit {
                max_calls: validate::positive_integer(
                    validate::required(rl, "maxCalls", &rl_path)?,
                    &validate::join(&rl_path, "maxCalls"),
                )?,
                window_ms: validate::positive_integer(
                    validate::required(rl, "windowMs", &rl_path)?,
                    &validate::join(&rl_path, "windowMs"),
                )?,
            })
        }
        None => None,
    };

    let cost_tier = validate::optional(map, "costTier")
        .map(|v| validate::one_of(v, &validate::join(path, "costTier"), "free, low, medium, high"))
        .transpose()?;

    let trust_level = validate::one_of(
        validate::required(map, "trustLevel", path)?,
        &validate::join(path, "trustLevel"),
        "trusted, reviewed, untrusted",
    )?;

    Ok(ToolPolicy {
        timeout_ms,
        rate_limit,
        cost_tier,
        trust_level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry() -> Value {
        json!({
            "toolId": "board.summarize",
            "category": "board",
            "inputSchema": {
                "type": "object",
                "properties": { "pageId": { "type": "string" } }
            },
            "outputSchema": { "type": "string" },
            "capabilities": [
                { "capabilityId": "read-board", "kind": "board_read" }
            ],
            "execution": { "mcpServerId": "board-tools" },
            "policy": { "timeoutMs": 5000, "trustLevel": "reviewed", "costTier": "low" }
        })
    }

    #[test]
    fn accepts_well_formed_entry() {
        let tool = validate_tool_registry_entry(&entry(), ROOT).unwrap();
        assert_eq!(tool.tool_id, "board.summarize");
        assert_eq!(tool.category, ToolCategory::Board);
        assert_eq!(tool.policy.cost_tier, Some(CostTier::Low));
        assert_eq!(tool.execution.mcp_server_id.as_deref(), Some("board-tools"));
    }

    #[test]
    fn requires_an_execution_target() {
        let mut raw = entry();
        raw["execution"] = json!({});
        let err = validate_tool_registry_entry(&raw, ROOT).unwrap_err();
        assert_eq!(err.code, ValidationCode::MissingField);
        assert_eq!(err.path, "$.execution");
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut raw = entry();
        raw["policy"]["timeoutMs"] = json!(0);
        let err = validate_tool_registry_entry(&raw, ROOT).unwrap_err();
        assert_eq!(err.path, "$.policy.timeoutMs");
    }

    #[test]
    fn rejects_secret_in_schema() {
        let mut raw = entry();
        raw["inputSchema"]["properties"]["api_key"] = json!({"type": "string"});
        let err = validate_tool_registry_entry(&raw, ROOT).unwrap_err();
        assert_eq!(err.code, ValidationCode::ForbiddenField);
        assert_eq!(err.path, "$.inputSchema.properties.api_key");
    }

    #[test]
    fn rejects_unknown_schema_type() {
        let mut raw = entry();
        raw["outputSchema"] = json!({"type": "blob"});
        assert_eq!(
            validate_tool_registry_entry(&raw, ROOT).unwrap_err().code,
            ValidationCode::InvalidValue
        );
    }

    #[test]
    fn untrusted_broadcast_needs_approval() {
        let mut raw = entry();
        raw["policy"]["trustLevel"] = json!("untrusted");
        raw["capabilities"] = json!([{ "capabilityId": "draw", "kind": "board_write" }]);
        let err = validate_tool_registry_entry(&raw, ROOT).unwrap_err();
        assert_eq!(err.path, "$.capabilities[0]");

        raw["capabilities"][0]["requiresApproval"] = json!(true);
        assert!(validate_tool_registry_entry(&raw, ROOT).is_ok());
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let err = validate_tool_registry(&json!([entry(), entry()])).unwrap_err();
        assert_eq!(err.code, ValidationCode::Duplicate);
        assert_eq!(err.path, "$[1].toolId");
    }
}
