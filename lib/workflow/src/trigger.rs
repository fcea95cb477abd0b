//! Triggers: named entry points that start executions.
//!
//! A trigger declares an `input_mapping` describing the payload it accepts.
//! Starting an execution through a trigger validates the payload against
//! that mapping before anything is written.

use crate::error::EngineError;
use miniflow_core::{TriggerId, WorkflowId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The accepted type of a trigger payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerFieldType {
    /// A JSON string.
    Str,
    /// A JSON integer.
    Int,
    /// Any JSON number.
    Float,
    /// A JSON boolean.
    Bool,
    /// A JSON array.
    List,
    /// A JSON object.
    Dict,
}

impl TriggerFieldType {
    /// Returns true when the JSON value matches this type.
    #[must_use]
    pub fn matches(&self, value: &JsonValue) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::List => value.is_array(),
            Self::Dict => value.is_object(),
        }
    }

    /// Returns the canonical name of this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::List => "list",
            Self::Dict => "dict",
        }
    }
}

impl fmt::Display for TriggerFieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerFieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "str" | "string" | "text" => Ok(Self::Str),
            "int" | "integer" => Ok(Self::Int),
            "float" | "number" => Ok(Self::Float),
            "bool" | "boolean" => Ok(Self::Bool),
            "list" | "array" => Ok(Self::List),
            "dict" | "object" | "json" => Ok(Self::Dict),
            other => Err(format!("unsupported type '{other}'")),
        }
    }
}

/// One field of a trigger's declared input mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerField {
    /// Accepted type; absent means untyped.
    #[serde(rename = "type", default)]
    pub field_type: Option<String>,
    /// Whether the field must be present in the payload.
    #[serde(default)]
    pub required: bool,
    /// Default substituted when the field is absent.
    #[serde(default)]
    pub value: Option<JsonValue>,
}

/// A trigger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Unique identifier.
    pub id: TriggerId,
    /// The workflow this trigger starts.
    pub workflow_id: WorkflowId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Declared payload shape, by field name.
    pub input_mapping: BTreeMap<String, TriggerField>,
}

impl Trigger {
    /// Validates a payload against this trigger's input mapping.
    ///
    /// An empty mapping accepts anything. Required fields must be present;
    /// absent fields fall back to their declared default before the type
    /// check; a present value must match its declared type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first offending field.
    pub fn validate_input(&self, input_data: &JsonValue) -> Result<(), EngineError> {
        if self.input_mapping.is_empty() {
            return Ok(());
        }

        let data = input_data.as_object().ok_or_else(|| {
            EngineError::invalid_input(
                "trigger_data",
                format!("trigger data must be an object, got {}", json_kind(input_data)),
            )
        })?;

        for (name, field) in &self.input_mapping {
            if field.required && !data.contains_key(name) {
                return Err(EngineError::invalid_input(
                    name.clone(),
                    format!("parameter '{name}' is required"),
                ));
            }

            let value = data.get(name).or(field.value.as_ref());
            let (Some(value), Some(type_str)) = (value, field.field_type.as_deref()) else {
                continue;
            };
            if value.is_null() || type_str.is_empty() {
                continue;
            }

            let field_type: TriggerFieldType = type_str.parse().map_err(|e: String| {
                EngineError::invalid_input(name.clone(), format!("{e} for parameter '{name}'"))
            })?;

            if !field_type.matches(value) {
                return Err(EngineError::invalid_input(
                    name.clone(),
                    format!(
                        "parameter '{name}' must be a {field_type}, got {}",
                        json_kind(value)
                    ),
                ));
            }
        }

        Ok(())
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
