//! Dotted-path evaluation over JSON data.
//!
//! Paths look like `data.items[0].name`: dot-separated keys with
//! integer-indexed array accesses. The splitter first carves out `[…]`
//! groups, then splits the rest on dots, so keys and indexes can interleave
//! freely.

use miniflow_workflow::error::EngineError;
use serde_json::Value as JsonValue;

/// One step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(i64),
}

/// Splits a path string into segments.
///
/// An empty path yields no segments (the whole value). An unclosed `[` is
/// treated as part of a key, which then simply fails the lookup.
///
/// # Errors
///
/// Returns `InvalidInput` when a bracket group does not contain an integer.
pub fn split_path(path: &str) -> Result<Vec<PathSegment>, EngineError> {
    let mut segments = Vec::new();
    let mut rest = path;

    while !rest.is_empty() {
        match rest.find('[') {
            Some(open) if rest[open..].contains(']') => {
                let close = open + rest[open..].find(']').unwrap_or(0);
                push_keys(&mut segments, &rest[..open]);

                let raw_index = &rest[open + 1..close];
                let index: i64 = raw_index.parse().map_err(|_| {
                    EngineError::invalid(format!("invalid array index: [{raw_index}]"))
                })?;
                segments.push(PathSegment::Index(index));

                rest = &rest[close + 1..];
            }
            _ => {
                push_keys(&mut segments, rest);
                break;
            }
        }
    }

    Ok(segments)
}

fn push_keys(segments: &mut Vec<PathSegment>, chunk: &str) {
    for key in chunk.split('.') {
        if !key.is_empty() {
            segments.push(PathSegment::Key(key.to_string()));
        }
    }
}

/// Walks a parsed path into a JSON value.
///
/// # Errors
///
/// Returns `InvalidInput` on missing keys, out-of-range indexes and
/// attempts to traverse non-container values.
pub fn lookup<'a>(
    segments: &[PathSegment],
    context: &'a JsonValue,
) -> Result<&'a JsonValue, EngineError> {
    if segments.is_empty() {
        return Ok(context);
    }

    if !context.is_object() && !context.is_array() {
        return Err(EngineError::invalid(format!(
            "cannot resolve path on non-nested data of type {}",
            json_kind(context)
        )));
    }

    let mut current = context;
    for segment in segments {
        match segment {
            PathSegment::Index(index) => {
                let Some(array) = current.as_array() else {
                    return Err(EngineError::invalid(format!(
                        "cannot access array index '[{index}]' on non-list data"
                    )));
                };
                let len = array.len();
                if *index < 0 || *index as usize >= len {
                    return Err(EngineError::invalid(format!(
                        "array index '{index}' out of range (length: {len})"
                    )));
                }
                current = &array[*index as usize];
            }
            PathSegment::Key(key) => {
                let Some(object) = current.as_object() else {
                    return Err(EngineError::invalid(format!(
                        "cannot access key '{key}' on non-object data"
                    )));
                };
                current = object.get(key).ok_or_else(|| {
                    EngineError::invalid(format!("key '{key}' not found in data"))
                })?;
            }
        }
    }

    Ok(current)
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

    #[test]
    fn splits_keys_and_indexes() {
        let segments = split_path("data.items[0].name").expect("should split");
        assert_eq!(
            segments,
            vec![
                PathSegment::Key("data".to_string()),
                PathSegment::Key("items".to_string()),
                PathSegment::Index(0),
                PathSegment::Key("name".to_string()),
            ]
        );
    }

    #[test]
    fn empty_path_yields_no_segments() {
        assert!(split_path("").expect("should split").is_empty());
    }

    #[test]
    fn bare_index_path() {
        let segments = split_path("[2]").expect("should split");
        assert_eq!(segments, vec![PathSegment::Index(2)]);
    }

    #[test]
    fn rejects_non_integer_index() {
        let err = split_path("items[first]").unwrap_err();
        assert!(err.to_string().contains("invalid array index"));
    }

    #[test]
    fn lookup_nested_value() {
        let context = json!({"data": {"items": [{"name": "test"}]}});
        let segments = split_path("data.items[0].name").expect("should split");
        let value = lookup(&segments, &context).expect("should find");
        assert_eq!(value, &json!("test"));
    }

    #[test]
    fn empty_path_returns_whole_context() {
        let context = json!({"k": 1});
        let value = lookup(&[], &context).expect("should find");
        assert_eq!(value, &context);
    }

    #[test]
    fn missing_key_names_the_key() {
        let context = json!({"a": 1});
        let segments = split_path("b").expect("should split");
        let err = lookup(&segments, &context).unwrap_err();
        assert!(err.to_string().contains("key 'b' not found"));
    }

    #[test]
    fn index_out_of_range() {
        let context = json!({"items": [1, 2]});
        let segments = split_path("items[5]").expect("should split");
        let err = lookup(&segments, &context).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn negative_index_is_out_of_range() {
        let context = json!([1, 2, 3]);
        let segments = split_path("[-1]").expect("should split");
        assert!(lookup(&segments, &context).is_err());
    }

    #[test]
    fn index_into_object_fails() {
        let context = json!({"a": {"b": 1}});
        let segments = split_path("a[0]").expect("should split");
        let err = lookup(&segments, &context).unwrap_err();
        assert!(err.to_string().contains("non-list"));
    }

    #[test]
    fn key_into_scalar_fails() {
        let context = json!(42);
        let segments = split_path("a").expect("should split");
        let err = lookup(&segments, &context).unwrap_err();
        assert!(err.to_string().contains("non-nested"));
    }
}
