//! Schema document helpers
//!
//! Structural views over JSON Schema content used by the compatibility
//! checker and the cast engine.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Merge `allOf` parts into a single `{properties, required, additionalProperties}` view
///
/// Parts are flattened recursively in order; later parts overwrite earlier
/// property definitions and the schema's own keywords overwrite both.
/// `required` is the union of all parts. `$ref` entries are not followed.
pub fn flatten(schema: &Value) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();
    let mut additional: Option<Value> = None;

    let mut merge = |part: &Value| {
        if let Some(props) = part.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                properties.insert(name.clone(), prop.clone());
            }
        }
        if let Some(req) = part.get("required").and_then(Value::as_array) {
            for name in req {
                if !required.contains(name) {
                    required.push(name.clone());
                }
            }
        }
        if let Some(value) = part.get("additionalProperties") {
            additional = Some(value.clone());
        }
    };

    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        for part in parts.iter().filter(|p| p.is_object()) {
            merge(&flatten(part));
        }
    }
    merge(schema);

    let mut flat = Map::new();
    flat.insert("properties".into(), Value::Object(properties));
    flat.insert("required".into(), Value::Array(required));
    if let Some(additional) = additional {
        flat.insert("additionalProperties".into(), additional);
    }
    Value::Object(flat)
}

/// The `properties` object, or an empty map
pub fn properties(schema: &Value) -> Map<String, Value> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// String entries of `required`
pub fn required_set(schema: &Value) -> BTreeSet<String> {
    string_items(schema, "required").into_iter().collect()
}

/// The keyword as a string, empty when absent or not a string
pub fn type_of<'a>(schema: &'a Value, key: &str) -> &'a str {
    schema.get(key).and_then(Value::as_str).unwrap_or("")
}

pub fn number(schema: &Value, key: &str) -> Option<f64> {
    schema.get(key).and_then(Value::as_f64)
}

/// String members of an array keyword such as `enum` or `required`
pub fn string_items(schema: &Value, key: &str) -> Vec<String> {
    schema
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `additionalProperties` as a boolean; anything but `false` allows extras
pub fn allows_additional(schema: &Value) -> bool {
    schema
        .get("additionalProperties")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Render a bound without trailing zeros: `5`, `2.5`
pub fn format_bound(value: f64) -> String {
    let text = format!("{value:.10}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_merges_all_of() {
        let schema = json!({
            "allOf": [
                {
                    "properties": {"id": {"type": "string"}, "kind": {"type": "string"}},
                    "required": ["id"],
                    "additionalProperties": true
                },
                {
                    "allOf": [{"properties": {"kind": {"type": "integer"}}, "required": ["kind"]}],
                    "additionalProperties": false
                }
            ],
            "properties": {"name": {"type": "string"}},
            "required": ["id", "name"]
        });

        let flat = flatten(&schema);
        let props = properties(&flat);
        assert_eq!(props.len(), 3);
        assert_eq!(props["kind"]["type"], "integer");
        assert_eq!(flat["required"], json!(["id", "kind", "name"]));
        assert!(!allows_additional(&flat));
    }

    #[test]
    fn test_top_level_additional_properties_wins() {
        let schema = json!({
            "allOf": [{"additionalProperties": false}],
            "additionalProperties": true
        });
        assert!(allows_additional(&flatten(&schema)));
        assert!(allows_additional(&json!({})));
    }

    #[test]
    fn test_flatten_ignores_refs() {
        let flat = flatten(&json!({"allOf": [{"$ref": "gts://gts.x.core.events.event.v1~"}]}));
        assert!(properties(&flat).is_empty());
    }

    #[test]
    fn test_format_bound() {
        assert_eq!(format_bound(5.0), "5");
        assert_eq!(format_bound(2.5), "2.5");
        assert_eq!(format_bound(0.0), "0");
        assert_eq!(format_bound(-3.25), "-3.25");
    }

    #[test]
    fn test_accessors() {
        let schema = json!({"type": "string", "enum": ["a", 1, "b"], "minLength": 2});
        assert_eq!(type_of(&schema, "type"), "string");
        assert_eq!(type_of(&schema, "format"), "");
        assert_eq!(string_items(&schema, "enum"), vec!["a", "b"]);
        assert_eq!(number(&schema, "minLength"), Some(2.0));
        assert!(required_set(&schema).is_empty());
    }
}
