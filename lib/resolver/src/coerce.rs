//! Type coercion for resolved parameter values.
//!
//! Each parameter declares a target type in alias form ("int", "number",
//! "json", ...). The accepted alias sets are configurable; the defaults
//! match the canonical set. Coercion is idempotent: feeding a coerced value
//! back through the same target type is a no-op.

use miniflow_workflow::error::EngineError;
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// String forms accepted as true by boolean coercion.
const TRUE_VALUES: [&str; 4] = ["true", "1", "yes", "on"];

/// String forms accepted as false by boolean coercion. The empty string is
/// false.
const FALSE_VALUES: [&str; 5] = ["false", "0", "no", "off", ""];

/// The six coercion targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    /// Any value, stringified.
    String,
    /// Integers, truncated floats and integer strings.
    Integer,
    /// Numbers and numeric strings.
    Float,
    /// Booleans and the configured true/false string sets.
    Boolean,
    /// Arrays and JSON strings parsing to arrays.
    Array,
    /// Objects and JSON strings parsing to objects.
    Object,
}

/// Configurable alias sets for the six target types.
///
/// Loaded from the `[scheduler_service]` configuration section; the
/// defaults match the canonical alias set. INI values are comma-separated
/// (`accepted_integer_values = number, integer, int`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TypeAliases {
    /// Aliases resolving to [`TargetType::String`].
    #[serde(deserialize_with = "alias_list")]
    pub accepted_string_values: Vec<String>,
    /// Aliases resolving to [`TargetType::Integer`].
    #[serde(deserialize_with = "alias_list")]
    pub accepted_integer_values: Vec<String>,
    /// Aliases resolving to [`TargetType::Float`].
    #[serde(deserialize_with = "alias_list")]
    pub accepted_float_values: Vec<String>,
    /// Aliases resolving to [`TargetType::Boolean`].
    #[serde(deserialize_with = "alias_list")]
    pub accepted_boolean_values: Vec<String>,
    /// Aliases resolving to [`TargetType::Array`].
    #[serde(deserialize_with = "alias_list")]
    pub accepted_array_values: Vec<String>,
    /// Aliases resolving to [`TargetType::Object`].
    #[serde(deserialize_with = "alias_list")]
    pub accepted_object_values: Vec<String>,
}

/// Accepts either a sequence of strings or one comma-separated string.
fn alias_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct AliasListVisitor;

    impl<'de> serde::de::Visitor<'de> for AliasListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a list of aliases or a comma-separated string")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value
                .split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::SeqAccess<'de>,
        {
            let mut items = Vec::new();
            while let Some(item) = seq.next_element::<String>()? {
                items.push(item);
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(AliasListVisitor)
}

impl Default for TypeAliases {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(ToString::to_string).collect();
        Self {
            accepted_string_values: list(&["string", "text", "str"]),
            accepted_integer_values: list(&["number", "integer", "int"]),
            accepted_float_values: list(&["float"]),
            accepted_boolean_values: list(&["bool", "boolean"]),
            accepted_array_values: list(&["array", "list"]),
            accepted_object_values: list(&["object", "dict", "json"]),
        }
    }
}

impl TypeAliases {
    /// Resolves a declared type alias to its target type.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the parameter when the alias is not in
    /// any accepted set.
    pub fn resolve(&self, param_name: &str, alias: &str) -> Result<TargetType, EngineError> {
        let alias = alias.trim().to_ascii_lowercase();
        let sets = [
            (&self.accepted_string_values, TargetType::String),
            (&self.accepted_integer_values, TargetType::Integer),
            (&self.accepted_float_values, TargetType::Float),
            (&self.accepted_boolean_values, TargetType::Boolean),
            (&self.accepted_array_values, TargetType::Array),
            (&self.accepted_object_values, TargetType::Object),
        ];

        for (set, target) in sets {
            if set.iter().any(|a| a == &alias) {
                return Ok(target);
            }
        }

        Err(EngineError::invalid_input(
            param_name,
            format!(
                "type conversion failed for '{param_name}': unknown target type '{alias}'. \
                 Valid types: string, text, str, number, integer, int, float, boolean, bool, \
                 array, list, object, dict, json"
            ),
        ))
    }
}

/// Coerces a resolved value to its declared target type.
///
/// # Errors
///
/// Returns `InvalidInput` naming the parameter when the value cannot be
/// converted.
pub fn coerce_value(
    param_name: &str,
    value: &JsonValue,
    target: TargetType,
) -> Result<JsonValue, EngineError> {
    match target {
        TargetType::String => to_string(param_name, value),
        TargetType::Integer => to_integer(param_name, value),
        TargetType::Float => to_float(param_name, value),
        TargetType::Boolean => to_boolean(param_name, value),
        TargetType::Array => to_array(param_name, value),
        TargetType::Object => to_object(param_name, value),
    }
}

fn conversion_error(param_name: &str, value: &JsonValue, target: &str) -> EngineError {
    EngineError::invalid_input(
        param_name,
        format!(
            "type conversion failed for '{param_name}': cannot convert {} to {target}",
            json_kind(value)
        ),
    )
}

fn to_string(param_name: &str, value: &JsonValue) -> Result<JsonValue, EngineError> {
    let text = match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
        JsonValue::Null => return Err(conversion_error(param_name, value, "string")),
    };
    Ok(JsonValue::String(text))
}

fn to_integer(param_name: &str, value: &JsonValue) -> Result<JsonValue, EngineError> {
    match value {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(JsonValue::from(i))
            } else if let Some(f) = n.as_f64() {
                // Fractional values truncate toward zero.
                Ok(JsonValue::from(f.trunc() as i64))
            } else {
                Err(conversion_error(param_name, value, "integer"))
            }
        }
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map(JsonValue::from)
            .map_err(|_| conversion_error(param_name, value, "integer")),
        _ => Err(conversion_error(param_name, value, "integer")),
    }
}

fn to_float(param_name: &str, value: &JsonValue) -> Result<JsonValue, EngineError> {
    match value {
        JsonValue::Number(n) => n
            .as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| conversion_error(param_name, value, "float")),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| conversion_error(param_name, value, "float")),
        _ => Err(conversion_error(param_name, value, "float")),
    }
}

fn to_boolean(param_name: &str, value: &JsonValue) -> Result<JsonValue, EngineError> {
    let text = match value {
        JsonValue::Bool(b) => return Ok(JsonValue::Bool(*b)),
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        _ => return Err(conversion_error(param_name, value, "boolean")),
    };

    let normalized = text.trim().to_ascii_lowercase();
    if TRUE_VALUES.contains(&normalized.as_str()) {
        Ok(JsonValue::Bool(true))
    } else if FALSE_VALUES.contains(&normalized.as_str()) {
        Ok(JsonValue::Bool(false))
    } else {
        Err(EngineError::invalid_input(
            param_name,
            format!(
                "type conversion failed for '{param_name}': cannot convert '{text}' to boolean. \
                 Valid true values: true, 1, yes, on. \
                 Valid false values: false, 0, no, off, empty string"
            ),
        ))
    }
}

fn to_array(param_name: &str, value: &JsonValue) -> Result<JsonValue, EngineError> {
    match value {
        JsonValue::Array(_) => Ok(value.clone()),
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(s) {
            Ok(JsonValue::Array(items)) => Ok(JsonValue::Array(items)),
            Ok(other) => Err(EngineError::invalid_input(
                param_name,
                format!(
                    "type conversion failed for '{param_name}': JSON parsed to {}, not array",
                    json_kind(&other)
                ),
            )),
            Err(e) => Err(EngineError::invalid_input(
                param_name,
                format!(
                    "type conversion failed for '{param_name}': cannot parse JSON array: {e}"
                ),
            )),
        },
        _ => Err(conversion_error(param_name, value, "array")),
    }
}

fn to_object(param_name: &str, value: &JsonValue) -> Result<JsonValue, EngineError> {
    match value {
        JsonValue::Object(_) => Ok(value.clone()),
        JsonValue::String(s) => match serde_json::from_str::<JsonValue>(s) {
            Ok(JsonValue::Object(map)) => Ok(JsonValue::Object(map)),
            Ok(other) => Err(EngineError::invalid_input(
                param_name,
                format!(
                    "type conversion failed for '{param_name}': JSON parsed to {}, not object",
                    json_kind(&other)
                ),
            )),
            Err(e) => Err(EngineError::invalid_input(
                param_name,
                format!(
                    "type conversion failed for '{param_name}': cannot parse JSON object: {e}"
                ),
            )),
        },
        _ => Err(conversion_error(param_name, value, "object")),
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coerce(value: JsonValue, target: TargetType) -> Result<JsonValue, EngineError> {
        coerce_value("p", &value, target)
    }

    #[test]
    fn alias_lists_deserialize_from_comma_separated_strings() {
        let aliases: TypeAliases = serde_json::from_value(json!({
            "accepted_integer_values": "number, integer, int, count",
        }))
        .expect("deserialize");
        assert_eq!(
            aliases.accepted_integer_values,
            vec!["number", "integer", "int", "count"]
        );
        // Untouched sets keep their defaults.
        assert_eq!(aliases.accepted_float_values, vec!["float"]);
        assert_eq!(aliases.resolve("p", "count").unwrap(), TargetType::Integer);
    }

    #[test]
    fn alias_resolution() {
        let aliases = TypeAliases::default();
        assert_eq!(aliases.resolve("p", "int").unwrap(), TargetType::Integer);
        assert_eq!(aliases.resolve("p", "NUMBER").unwrap(), TargetType::Integer);
        assert_eq!(aliases.resolve("p", " text ").unwrap(), TargetType::String);
        assert_eq!(aliases.resolve("p", "json").unwrap(), TargetType::Object);
        assert_eq!(aliases.resolve("p", "list").unwrap(), TargetType::Array);
        assert!(aliases.resolve("p", "tuple").is_err());
    }

    #[test]
    fn integer_from_numeric_string() {
        assert_eq!(coerce(json!("42"), TargetType::Integer).unwrap(), json!(42));
        assert_eq!(
            coerce(json!(" 7 "), TargetType::Integer).unwrap(),
            json!(7)
        );
        assert!(coerce(json!("3.5"), TargetType::Integer).is_err());
        assert!(coerce(json!("abc"), TargetType::Integer).is_err());
    }

    #[test]
    fn integer_truncates_floats() {
        assert_eq!(
            coerce(json!(3.9), TargetType::Integer).unwrap(),
            json!(3)
        );
        assert_eq!(
            coerce(json!(-3.9), TargetType::Integer).unwrap(),
            json!(-3)
        );
    }

    #[test]
    fn float_accepts_ints_and_strings() {
        assert_eq!(
            coerce(json!(3), TargetType::Float).unwrap(),
            json!(3.0)
        );
        assert_eq!(
            coerce(json!("2.5"), TargetType::Float).unwrap(),
            json!(2.5)
        );
        assert!(coerce(json!("x"), TargetType::Float).is_err());
    }

    #[test]
    fn boolean_string_sets() {
        for truthy in ["true", "1", "yes", "on", "YES", " On "] {
            assert_eq!(
                coerce(json!(truthy), TargetType::Boolean).unwrap(),
                json!(true),
                "expected '{truthy}' to be true"
            );
        }
        for falsy in ["false", "0", "no", "off", "", "OFF"] {
            assert_eq!(
                coerce(json!(falsy), TargetType::Boolean).unwrap(),
                json!(false),
                "expected '{falsy}' to be false"
            );
        }
        assert!(coerce(json!("maybe"), TargetType::Boolean).is_err());
        assert_eq!(
            coerce(json!(1), TargetType::Boolean).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn array_from_json_string() {
        assert_eq!(
            coerce(json!("[1, 2, 3]"), TargetType::Array).unwrap(),
            json!([1, 2, 3])
        );
        assert!(coerce(json!("{\"a\": 1}"), TargetType::Array).is_err());
        assert!(coerce(json!("not json"), TargetType::Array).is_err());
        assert!(coerce(json!(5), TargetType::Array).is_err());
    }

    #[test]
    fn object_from_json_string() {
        assert_eq!(
            coerce(json!("{\"a\": 1}"), TargetType::Object).unwrap(),
            json!({"a": 1})
        );
        assert!(coerce(json!("[1]"), TargetType::Object).is_err());
    }

    #[test]
    fn string_from_anything_but_null() {
        assert_eq!(
            coerce(json!(42), TargetType::String).unwrap(),
            json!("42")
        );
        assert_eq!(
            coerce(json!(true), TargetType::String).unwrap(),
            json!("true")
        );
        assert_eq!(
            coerce(json!([1, 2]), TargetType::String).unwrap(),
            json!("[1,2]")
        );
        assert!(coerce(JsonValue::Null, TargetType::String).is_err());
    }

    #[test]
    fn coercion_is_idempotent() {
        let cases = [
            (json!("42"), TargetType::Integer),
            (json!("2.5"), TargetType::Float),
            (json!("yes"), TargetType::Boolean),
            (json!("[1, 2]"), TargetType::Array),
            (json!("{\"k\": \"v\"}"), TargetType::Object),
            (json!([1, 2]), TargetType::String),
        ];

        for (value, target) in cases {
            let once = coerce_value("p", &value, target).expect("first coercion");
            let twice = coerce_value("p", &once, target).expect("second coercion");
            assert_eq!(once, twice, "coercion not idempotent for {value:?}");
        }
    }
}
