//! Execution plan validation
//!
//! The planning collaborator returns a JSON document describing how to
//! containerize a project. That payload is untrusted: it may be wrapped in a
//! Markdown code fence, miss fields, or use the wrong shapes. [`validate`]
//! turns it into a typed [`ExecutionPlan`] or a [`PlanError`] the caller
//! branches on. The Dockerfile content is carried as an opaque string.
//!
//! Keys are snake_case; the camelCase spellings are accepted as aliases.

use crate::errors::PlanError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

/// Longest raw-payload excerpt carried by [`PlanError::InvalidPlanFormat`]
pub const EXCERPT_LIMIT: usize = 500;

/// Required plan fields, in the order they are checked
pub const REQUIRED_FIELDS: [&str; 4] = ["dockerfile_content", "image_name", "container_name", "ports"];

/// How a running server talks to its client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Standard input/output
    Stdio,
    /// Network (SSE/HTTP)
    #[default]
    Sse,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::Sse => "sse",
        }
    }

    pub fn is_stdio(&self) -> bool {
        matches!(self, Self::Stdio)
    }

    /// Interpret a declared transport; anything that is not `stdio` is network
    pub fn from_declared(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            None => Self::Sse,
            Some(v) if v == "stdio" => Self::Stdio,
            Some(v) if v == "sse" || v.is_empty() => Self::Sse,
            Some(other) => {
                warn!("Unknown transport type '{}', treating as sse", other);
                Self::Sse
            }
        }
    }
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TransportType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::from_declared(raw.as_deref()))
    }
}

/// Validated description of how to build and run a server image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub dockerfile_content: String,
    pub image_name: String,
    pub container_name: String,
    /// container port -> host port
    pub ports: IndexMap<String, String>,
    pub environment_variables: IndexMap<String, String>,
    /// Names only; values are supplied at run time
    pub required_secrets: Vec<String>,
    /// host path -> container path
    pub volumes: IndexMap<String, String>,
    pub startup_command: Option<String>,
    pub health_check: Option<Value>,
    pub has_existing_dockerfile: bool,
    pub transport_type: TransportType,
}

/// Parse and validate a raw plan payload
#[instrument(skip(raw), fields(installation = %installation_name, bytes = raw.len()))]
pub fn validate(raw: &str, installation_name: &str) -> Result<ExecutionPlan, PlanError> {
    let body = strip_code_fence(raw);

    let value: Value = serde_json::from_str(body).map_err(|e| invalid_format(e.to_string(), raw))?;
    let Value::Object(object) = value else {
        return Err(invalid_format("plan must be a JSON object".to_string(), raw));
    };

    if let Some(ports) = field(&object, "ports") {
        if !ports.is_object() {
            return Err(PlanError::InvalidPortsShape);
        }
    }
    for name in REQUIRED_FIELDS {
        if field(&object, name).map_or(true, Value::is_null) {
            return Err(PlanError::MissingPlanField(name.to_string()));
        }
    }

    let plan = ExecutionPlan {
        dockerfile_content: required_string(&object, "dockerfile_content", raw)?,
        image_name: required_string(&object, "image_name", raw)?,
        container_name: required_string(&object, "container_name", raw)?,
        ports: string_map(&object, "ports", raw)?,
        environment_variables: string_map(&object, "environment_variables", raw)?,
        required_secrets: string_list(&object, "required_secrets", raw)?,
        volumes: string_map(&object, "volumes", raw)?,
        startup_command: optional_string(&object, "startup_command", raw)?
            .filter(|cmd| !cmd.trim().is_empty()),
        health_check: field(&object, "health_check").filter(|v| !v.is_null()).cloned(),
        has_existing_dockerfile: flag(&object, "has_existing_dockerfile", raw)?,
        transport_type: TransportType::from_declared(
            optional_string(&object, "transport_type", raw)?.as_deref(),
        ),
    };

    debug!(
        image = %plan.image_name,
        transport = %plan.transport_type,
        ports = plan.ports.len(),
        "Validated execution plan"
    );
    Ok(plan)
}

/// Remove surrounding whitespace and an optional ```json / ``` fence
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// At most [`EXCERPT_LIMIT`] characters of `raw`, marked when cut
pub fn excerpt(raw: &str) -> String {
    if raw.chars().count() <= EXCERPT_LIMIT {
        raw.to_string()
    } else {
        let cut: String = raw.chars().take(EXCERPT_LIMIT).collect();
        format!("{}...", cut)
    }
}

fn invalid_format(message: String, raw: &str) -> PlanError {
    PlanError::InvalidPlanFormat {
        message,
        excerpt: excerpt(raw),
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).or_else(|| object.get(&camel_case(name)))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn required_string(object: &Map<String, Value>, name: &str, raw: &str) -> Result<String, PlanError> {
    optional_string(object, name, raw)?.ok_or_else(|| PlanError::MissingPlanField(name.to_string()))
}

fn optional_string(
    object: &Map<String, Value>,
    name: &str,
    raw: &str,
) -> Result<Option<String>, PlanError> {
    match field(object, name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value)
            .map(Some)
            .ok_or_else(|| invalid_format(format!("'{}' must be a string", name), raw)),
    }
}

fn string_map(
    object: &Map<String, Value>,
    name: &str,
    raw: &str,
) -> Result<IndexMap<String, String>, PlanError> {
    match field(object, name) {
        None | Some(Value::Null) => Ok(IndexMap::new()),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(key, value)| {
                scalar_to_string(value)
                    .map(|v| (key.clone(), v))
                    .ok_or_else(|| {
                        invalid_format(format!("'{}.{}' must be a scalar value", name, key), raw)
                    })
            })
            .collect(),
        Some(_) => Err(invalid_format(format!("'{}' must be an object", name), raw)),
    }
}

fn string_list(object: &Map<String, Value>, name: &str, raw: &str) -> Result<Vec<String>, PlanError> {
    match field(object, name) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                scalar_to_string(item)
                    .ok_or_else(|| invalid_format(format!("'{}' entries must be strings", name), raw))
            })
            .collect(),
        Some(_) => Err(invalid_format(format!("'{}' must be a list", name), raw)),
    }
}

fn flag(object: &Map<String, Value>, name: &str, raw: &str) -> Result<bool, PlanError> {
    match field(object, name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(invalid_format(format!("'{}' must be a boolean", name), raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "dockerfile_content": "FROM python:3.12-slim\nCMD [\"python\", \"server.py\"]",
        "image_name": "mcp-o-r",
        "container_name": "mcp-o-r-container",
        "ports": {"8000": "8000"}
    }"#;

    #[test]
    fn test_minimal_plan_gets_defaults() {
        let plan = validate(MINIMAL, "o-r").unwrap();
        assert_eq!(plan.image_name, "mcp-o-r");
        assert_eq!(plan.container_name, "mcp-o-r-container");
        assert_eq!(plan.ports.get("8000").map(String::as_str), Some("8000"));
        assert!(plan.environment_variables.is_empty());
        assert!(plan.required_secrets.is_empty());
        assert!(plan.volumes.is_empty());
        assert_eq!(plan.startup_command, None);
        assert_eq!(plan.health_check, None);
        assert!(!plan.has_existing_dockerfile);
        assert_eq!(plan.transport_type, TransportType::Sse);
    }

    #[test]
    fn test_fenced_payload_validates_identically() {
        let plain = validate(MINIMAL, "o-r").unwrap();
        let tagged = validate(&format!("```json\n{}\n```", MINIMAL), "o-r").unwrap();
        let bare = validate(&format!("  ```\n{}\n```\n", MINIMAL), "o-r").unwrap();
        assert_eq!(plain, tagged);
        assert_eq!(plain, bare);
    }

    #[test]
    fn test_ports_list_is_rejected_regardless_of_other_fields() {
        let err = validate(r#"{"ports": ["8000:8000"]}"#, "o-r").unwrap_err();
        assert_eq!(err, PlanError::InvalidPortsShape);

        let err = validate(
            r#"{"dockerfile_content": "FROM x", "image_name": "i", "container_name": "c", "ports": [8000]}"#,
            "o-r",
        )
        .unwrap_err();
        assert_eq!(err, PlanError::InvalidPortsShape);

        let err = validate(
            r#"{"dockerfile_content": "FROM x", "image_name": "i", "container_name": "c", "ports": null}"#,
            "o-r",
        )
        .unwrap_err();
        assert_eq!(err, PlanError::InvalidPortsShape);
    }

    #[test]
    fn test_missing_required_fields_named_in_order() {
        let err = validate(r#"{"image_name": "i", "container_name": "c", "ports": {}}"#, "o-r")
            .unwrap_err();
        assert_eq!(err, PlanError::MissingPlanField("dockerfile_content".to_string()));

        let err = validate(r#"{"dockerfile_content": "FROM x", "image_name": "i", "container_name": "c"}"#, "o-r")
            .unwrap_err();
        assert_eq!(err, PlanError::MissingPlanField("ports".to_string()));

        let err = validate(
            r#"{"dockerfile_content": "FROM x", "image_name": null, "container_name": "c", "ports": {}}"#,
            "o-r",
        )
        .unwrap_err();
        assert_eq!(err, PlanError::MissingPlanField("image_name".to_string()));
    }

    #[test]
    fn test_invalid_json_carries_truncated_excerpt() {
        let raw = format!("Here is the plan: {}", "x".repeat(1000));
        match validate(&raw, "o-r").unwrap_err() {
            PlanError::InvalidPlanFormat { excerpt, .. } => {
                assert_eq!(excerpt.chars().count(), EXCERPT_LIMIT + 3);
                assert!(excerpt.starts_with("Here is the plan"));
                assert!(excerpt.ends_with("..."));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        match validate("[1, 2]", "o-r").unwrap_err() {
            PlanError::InvalidPlanFormat { excerpt, .. } => assert_eq!(excerpt, "[1, 2]"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_camel_case_aliases_and_scalar_coercion() {
        let raw = r#"{
            "dockerfileContent": "FROM node:20",
            "imageName": "img",
            "containerName": "ctr",
            "ports": {"3000": 3000, "3001": "4001"},
            "environmentVariables": {"DEBUG": true, "WORKERS": 4},
            "requiredSecrets": ["API_KEY"],
            "startupCommand": "node dist/index.js --port 3000",
            "healthCheck": {"path": "/health"},
            "hasExistingDockerfile": true,
            "transportType": "STDIO"
        }"#;
        let plan = validate(raw, "o-r").unwrap();
        assert_eq!(plan.dockerfile_content, "FROM node:20");
        assert_eq!(
            plan.ports.iter().map(|(k, v)| format!("{k}:{v}")).collect::<Vec<_>>(),
            vec!["3000:3000", "3001:4001"]
        );
        assert_eq!(plan.environment_variables["DEBUG"], "true");
        assert_eq!(plan.environment_variables["WORKERS"], "4");
        assert_eq!(plan.required_secrets, vec!["API_KEY"]);
        assert_eq!(
            plan.startup_command.as_deref(),
            Some("node dist/index.js --port 3000")
        );
        assert!(plan.health_check.is_some());
        assert!(plan.has_existing_dockerfile);
        assert_eq!(plan.transport_type, TransportType::Stdio);
    }

    #[test]
    fn test_nested_values_are_format_errors() {
        let raw = r#"{"dockerfile_content": "FROM x", "image_name": "i", "container_name": "c",
                      "ports": {}, "environment_variables": {"A": {"nested": 1}}}"#;
        assert!(matches!(
            validate(raw, "o-r"),
            Err(PlanError::InvalidPlanFormat { .. })
        ));
    }

    #[test]
    fn test_transport_declarations() {
        assert_eq!(TransportType::from_declared(None), TransportType::Sse);
        assert_eq!(TransportType::from_declared(Some("Stdio")), TransportType::Stdio);
        assert_eq!(TransportType::from_declared(Some("sse")), TransportType::Sse);
        assert_eq!(TransportType::from_declared(Some("http")), TransportType::Sse);
        assert_eq!(TransportType::Stdio.to_string(), "stdio");
    }
}
