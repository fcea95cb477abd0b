//! Declared node parameters and their extraction rules.
//!
//! A node declares its parameters as a mapping of name to spec. At launch
//! time the specs are narrowed to `{type, value}` pairs that travel on the
//! `ExecutionInput` row; the resolver later interprets the value (literal or
//! `${kind:body}` reference) and coerces it to the declared type.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A parameter as declared on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Declared target type (alias form, e.g. "int", "string", "json").
    #[serde(rename = "type")]
    pub param_type: String,
    /// Configured value; may be a literal or a reference token.
    #[serde(default)]
    pub value: Option<JsonValue>,
    /// Whether a value must be configured.
    #[serde(default)]
    pub required: bool,
    /// Fallback used when no value is configured.
    #[serde(default)]
    pub default_value: Option<JsonValue>,
}

/// A parameter as carried on an `ExecutionInput` row: the effective value
/// plus the declared type, nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEntry {
    /// Declared target type (alias form).
    #[serde(rename = "type")]
    pub param_type: String,
    /// The effective configured value.
    pub value: JsonValue,
}

/// Narrows declared parameter specs to `{type, value}` entries.
///
/// Every parameter must end up with a value: the configured one, or the
/// declared default. A required parameter with neither fails the launch.
///
/// # Errors
///
/// Returns `InvalidInput` naming the parameter when no value can be
/// determined.
pub fn extract_input_params(
    specs: &BTreeMap<String, ParamSpec>,
) -> Result<BTreeMap<String, ParamEntry>, EngineError> {
    let mut extracted = BTreeMap::new();

    for (name, spec) in specs {
        let configured = spec.value.clone().filter(|v| !v.is_null());

        if spec.required && configured.is_none() {
            return Err(EngineError::invalid_input(
                name.clone(),
                format!("missing required value for field '{name}'"),
            ));
        }

        let value = match configured {
            Some(value) => value,
            None => match spec.default_value.clone().filter(|v| !v.is_null()) {
                Some(default) => default,
                None => {
                    return Err(EngineError::invalid_input(
                        name.clone(),
                        format!("missing required value for field '{name}'"),
                    ));
                }
            },
        };

        extracted.insert(
            name.clone(),
            ParamEntry {
                param_type: spec.param_type.clone(),
                value,
            },
        );
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(
        param_type: &str,
        value: Option<JsonValue>,
        required: bool,
        default_value: Option<JsonValue>,
    ) -> ParamSpec {
        ParamSpec {
            param_type: param_type.to_string(),
            value,
            required,
            default_value,
        }
    }

    #[test]
    fn extracts_configured_values() {
        let mut specs = BTreeMap::new();
        specs.insert("x".to_string(), spec("int", Some(json!("42")), true, None));

        let extracted = extract_input_params(&specs).expect("should extract");
        assert_eq!(extracted["x"].value, json!("42"));
        assert_eq!(extracted["x"].param_type, "int");
    }

    #[test]
    fn falls_back_to_default() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "host".to_string(),
            spec("string", None, false, Some(json!("localhost"))),
        );

        let extracted = extract_input_params(&specs).expect("should extract");
        assert_eq!(extracted["host"].value, json!("localhost"));
    }

    #[test]
    fn required_without_value_fails() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "key".to_string(),
            spec("string", None, true, Some(json!("fallback"))),
        );

        let err = extract_input_params(&specs).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput { .. }));
        assert!(err.to_string().contains("key"));
    }

    #[test]
    fn optional_without_value_or_default_fails() {
        let mut specs = BTreeMap::new();
        specs.insert("p".to_string(), spec("string", None, false, None));

        assert!(extract_input_params(&specs).is_err());
    }

    #[test]
    fn null_value_counts_as_missing() {
        let mut specs = BTreeMap::new();
        specs.insert(
            "p".to_string(),
            spec("string", Some(JsonValue::Null), false, Some(json!("d"))),
        );

        let extracted = extract_input_params(&specs).expect("should extract");
        assert_eq!(extracted["p"].value, json!("d"));
    }

    #[test]
    fn param_spec_serde_uses_type_key() {
        let raw = json!({
            "type": "integer",
            "value": "${trigger:n}",
            "required": true
        });
        let spec: ParamSpec = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(spec.param_type, "integer");
        assert_eq!(spec.value, Some(json!("${trigger:n}")));
        assert!(spec.required);
        assert_eq!(spec.default_value, None);
    }
}
