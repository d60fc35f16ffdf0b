//! Skill catalog types.
//!
//! A skill is described by a manifest document (JSON or YAML) and bound to
//! an in-process handler by name. The manifest format is:
//!
//! ```yaml
//! name: read_file
//! description: Read a text file
//! handler: file_operations.read_file
//! enabled: true
//! parameters:
//!   type: object
//!   properties:
//!     file_path: { type: string }
//!     encoding: { type: string, default: utf-8 }
//!   required: [file_path]
//! metadata:
//!   category: filesystem
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::SkillError;
use super::handler::SkillHandler;

// ─── Parameter Schema ────────────────────────────────────────────────────────

/// Declared parameters of a skill (JSON-schema subset: `properties`,
/// `required`, per-property `type` and `default`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSchema(Value);

impl Default for ParameterSchema {
    fn default() -> Self {
        Self(serde_json::json!({"type": "object", "properties": {}}))
    }
}

impl ParameterSchema {
    /// Validate and wrap a schema document. `null` means "no parameters".
    pub fn parse(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(ref obj) => {
                if let Some(props) = obj.get("properties") {
                    if !props.is_object() {
                        return Err("'properties' must be a mapping".into());
                    }
                }
                if let Some(required) = obj.get("required") {
                    let all_strings = required
                        .as_array()
                        .map(|arr| arr.iter().all(|v| v.is_string()))
                        .unwrap_or(false);
                    if !all_strings {
                        return Err("'required' must be a list of field names".into());
                    }
                }
                Ok(Self(value))
            }
            other => Err(format!("parameters must be a mapping, got {other}")),
        }
    }

    /// The raw schema, as presented to the LLM.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Declared properties, if any.
    pub fn properties(&self) -> Option<&Map<String, Value>> {
        self.0.get("properties").and_then(|p| p.as_object())
    }

    /// Names of required fields, in declaration order.
    pub fn required(&self) -> Vec<&str> {
        self.0
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Whether `field` is required.
    pub fn is_required(&self, field: &str) -> bool {
        self.required().contains(&field)
    }

    /// Declared default for an optional field.
    pub fn default_for(&self, field: &str) -> Option<&Value> {
        self.properties()
            .and_then(|props| props.get(field))
            .and_then(|prop| prop.get("default"))
    }
}

// ─── Manifest ────────────────────────────────────────────────────────────────

fn default_enabled() -> bool {
    true
}

/// A skill manifest as found on disk, before handler binding.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillManifest {
    /// Unique skill name. Falls back to the file stem when absent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Value,
    /// Handler reference resolved against the `HandlerTable`.
    #[serde(default)]
    pub handler: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

// ─── SkillDefinition ─────────────────────────────────────────────────────────

/// A loaded skill: manifest data plus its bound handler (if any).
///
/// Immutable between reloads.
#[derive(Clone)]
pub struct SkillDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
    /// The handler reference named in the manifest.
    pub handler_ref: String,
    /// The bound handler. `None` when `handler_ref` matched nothing.
    pub handler: Option<Arc<dyn SkillHandler>>,
    pub enabled: bool,
    pub metadata: Map<String, Value>,
}

impl fmt::Debug for SkillDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("handler_ref", &self.handler_ref)
            .field("bound", &self.handler.is_some())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl SkillDefinition {
    /// Build a definition from a manifest. `fallback_name` is used when the
    /// manifest omits `name` (normally the file stem).
    pub fn from_manifest(
        manifest: SkillManifest,
        fallback_name: &str,
        handler: Option<Arc<dyn SkillHandler>>,
    ) -> Result<Self, SkillError> {
        let name = manifest
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string());
        if name.trim().is_empty() {
            return Err(SkillError::InvalidDefinition {
                source_name: fallback_name.to_string(),
                reason: "skill has no name".into(),
            });
        }

        let parameters =
            ParameterSchema::parse(manifest.parameters).map_err(|reason| {
                SkillError::InvalidDefinition {
                    source_name: name.clone(),
                    reason,
                }
            })?;

        Ok(Self {
            name,
            description: manifest.description,
            parameters,
            handler_ref: manifest.handler,
            handler,
            enabled: manifest.enabled,
            metadata: manifest.metadata,
        })
    }

    /// The key used to look the handler up: the manifest's `handler`, or the
    /// skill name when that is empty.
    pub fn handler_key(&self) -> &str {
        if self.handler_ref.trim().is_empty() {
            &self.name
        } else {
            &self.handler_ref
        }
    }
}

// ─── SkillResult ─────────────────────────────────────────────────────────────

/// Structured result of a skill invocation.
///
/// Serializes flat: `{"success": bool, "error"?: text, ...domain fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl SkillResult {
    /// A successful result carrying `data`.
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            data,
        }
    }

    /// A failed result with an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: Map::new(),
        }
    }

    /// Normalise whatever a handler returned.
    ///
    /// Objects keep their fields; a missing `success` counts as success.
    /// Anything else is wrapped as `{"success": true, "output": value}`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut obj) => {
                let success = obj
                    .remove("success")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(true);
                let error = match obj.remove("error") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s),
                    Some(other) => Some(other.to_string()),
                };
                Self {
                    success,
                    error,
                    data: obj,
                }
            }
            Value::Null => Self::ok(Map::new()),
            other => {
                let mut data = Map::new();
                data.insert("output".into(), other);
                Self::ok(data)
            }
        }
    }

    /// Mark this result as a cancellation (never executed).
    pub fn cancelled(reason: impl Into<String>) -> Self {
        let mut data = Map::new();
        data.insert("cancelled".into(), Value::Bool(true));
        Self {
            success: false,
            error: Some(reason.into()),
            data,
        }
    }

    /// Flat JSON form.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({"success": self.success, "error": self.error})
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_required_and_defaults() {
        let schema = ParameterSchema::parse(json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "timeout": {"type": "integer", "default": 30}
            },
            "required": ["command"]
        }))
        .unwrap();
        assert_eq!(schema.required(), vec!["command"]);
        assert!(schema.is_required("command"));
        assert!(!schema.is_required("timeout"));
        assert_eq!(schema.default_for("timeout"), Some(&json!(30)));
        assert_eq!(schema.default_for("command"), None);
    }

    #[test]
    fn test_schema_rejects_non_mapping() {
        assert!(ParameterSchema::parse(json!("string")).is_err());
        assert!(ParameterSchema::parse(json!({"required": "path"})).is_err());
        assert!(ParameterSchema::parse(json!({"properties": []})).is_err());
    }

    #[test]
    fn test_null_schema_is_empty_object() {
        let schema = ParameterSchema::parse(Value::Null).unwrap();
        assert!(schema.properties().unwrap().is_empty());
        assert!(schema.required().is_empty());
    }

    #[test]
    fn test_manifest_defaults() {
        let manifest: SkillManifest = serde_yaml::from_str("description: x").unwrap();
        assert!(manifest.enabled);
        assert!(manifest.name.is_none());
        assert!(manifest.handler.is_empty());

        let def = SkillDefinition::from_manifest(manifest, "from_stem", None).unwrap();
        assert_eq!(def.name, "from_stem");
        assert_eq!(def.handler_key(), "from_stem");
    }

    #[test]
    fn test_from_manifest_rejects_bad_parameters() {
        let manifest: SkillManifest =
            serde_json::from_value(json!({"name": "bad", "parameters": 5})).unwrap();
        let err = SkillDefinition::from_manifest(manifest, "bad", None).unwrap_err();
        assert!(matches!(err, SkillError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_result_from_object_without_success() {
        let result = SkillResult::from_value(json!({"content": "abc"}));
        assert!(result.success);
        assert_eq!(result.data.get("content"), Some(&json!("abc")));
    }

    #[test]
    fn test_result_from_failed_object() {
        let result =
            SkillResult::from_value(json!({"success": false, "error": "nope", "path": "/x"}));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("nope"));
        assert_eq!(result.data.get("path"), Some(&json!("/x")));
    }

    #[test]
    fn test_result_from_scalar_is_wrapped() {
        let result = SkillResult::from_value(json!(42));
        assert!(result.success);
        assert_eq!(result.data.get("output"), Some(&json!(42)));
    }

    #[test]
    fn test_result_serializes_flat() {
        let result = SkillResult::failure("Skill not found: foo");
        let value = result.to_value();
        assert_eq!(value, json!({"success": false, "error": "Skill not found: foo"}));
    }

    #[test]
    fn test_cancelled_result() {
        let result = SkillResult::cancelled("denied");
        assert!(!result.success);
        assert_eq!(result.data.get("cancelled"), Some(&json!(true)));
    }
}
