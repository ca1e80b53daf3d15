//! `id@path` attribute selectors

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::EntityLookup;
use crate::validate::json_kind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeResult {
    pub gts_id: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_fields: Vec<String>,
}

impl AttributeResult {
    fn failed(gts_id: &str, path: &str, error: String, available_fields: Vec<String>) -> Self {
        Self {
            gts_id: gts_id.to_string(),
            path: path.to_string(),
            error: Some(error),
            available_fields,
            ..Default::default()
        }
    }
}

/// Resolve `selector` (`gts.a.b.c.d.v1~x.y.z.w.v1@field.list[0].name`)
pub fn get_attribute<L: EntityLookup + ?Sized>(lookup: &L, selector: &str) -> AttributeResult {
    let Some((gts_id, path)) = selector.split_once('@').filter(|(_, path)| !path.is_empty()) else {
        let gts_id = selector.split('@').next().unwrap_or(selector);
        return AttributeResult::failed(
            gts_id,
            "",
            "Attribute selector requires '@path' in the identifier".to_string(),
            Vec::new(),
        );
    };

    match lookup.get(gts_id) {
        Some(entity) => resolve_path(gts_id, path, entity.content()),
        None => AttributeResult::failed(
            gts_id,
            path,
            format!("Entity not found: {gts_id}"),
            Vec::new(),
        ),
    }
}

/// Walk `path` through `content`; `/` and `.` both separate keys
pub fn resolve_path(gts_id: &str, path: &str, content: &Value) -> AttributeResult {
    let mut current = content;

    for part in split_path(path) {
        let is_index = part.starts_with('[') && part.ends_with(']');
        current = match current {
            Value::Object(map) => match map.get(part.as_str()).filter(|_| !is_index) {
                Some(next) => next,
                None => {
                    return AttributeResult::failed(
                        gts_id,
                        path,
                        format!("Path not found at segment '{part}' in '{path}', see available fields"),
                        object_fields(map, ""),
                    )
                }
            },
            Value::Array(items) => {
                let digits = if is_index { &part[1..part.len() - 1] } else { part.as_str() };
                let Ok(idx) = digits.parse::<usize>() else {
                    return AttributeResult::failed(
                        gts_id,
                        path,
                        format!("Expected list index at segment '{part}'"),
                        array_fields(items, ""),
                    );
                };
                match items.get(idx) {
                    Some(next) => next,
                    None => {
                        return AttributeResult::failed(
                            gts_id,
                            path,
                            format!("Index out of range at segment '{part}'"),
                            array_fields(items, ""),
                        )
                    }
                }
            }
            scalar => {
                return AttributeResult::failed(
                    gts_id,
                    path,
                    format!("Cannot descend into {} at segment '{part}'", json_kind(scalar)),
                    Vec::new(),
                )
            }
        };
    }

    AttributeResult {
        gts_id: gts_id.to_string(),
        path: path.to_string(),
        value: Some(current.clone()),
        resolved: true,
        ..Default::default()
    }
}

/// `a.b[0]/c` -> `a`, `b`, `[0]`, `c`
fn split_path(path: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for segment in path.split(['.', '/']).filter(|s| !s.is_empty()) {
        let mut rest = segment;
        while let Some(open) = rest.find('[') {
            let Some(close) = rest[open..].find(']').map(|c| open + c) else {
                break;
            };
            if open > 0 {
                parts.push(rest[..open].to_string());
            }
            parts.push(rest[open..=close].to_string());
            rest = &rest[close + 1..];
        }
        if !rest.is_empty() {
            parts.push(rest.to_string());
        }
    }
    parts
}

fn object_fields(map: &Map<String, Value>, prefix: &str) -> Vec<String> {
    let mut fields = Vec::new();
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        fields.push(path.clone());
        fields.extend(nested_fields(value, &path));
    }
    fields
}

fn array_fields(items: &[Value], prefix: &str) -> Vec<String> {
    let mut fields = Vec::new();
    for (idx, value) in items.iter().enumerate() {
        let path = format!("{prefix}[{idx}]");
        fields.push(path.clone());
        fields.extend(nested_fields(value, &path));
    }
    fields
}

fn nested_fields(value: &Value, path: &str) -> Vec<String> {
    match value {
        Value::Object(map) => object_fields(map, path),
        Value::Array(items) => array_fields(items, path),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::entity::JsonEntity;
    use crate::registry::GtsStore;
    use serde_json::json;

    const ID: &str = "gts.x.test.attr.user.v1~x.app.users.alice.v1";

    fn store() -> GtsStore {
        let mut store = GtsStore::new();
        store
            .register(JsonEntity::new(
                json!({
                    "id": ID,
                    "name": "Alice",
                    "address": {"city": "Berlin", "zip": "10115"},
                    "roles": [{"name": "admin"}, {"name": "dev"}]
                }),
                &ExtractionConfig::default(),
            ))
            .unwrap();
        store
    }

    #[test]
    fn test_resolves_nested_paths() {
        let store = store();
        let result = get_attribute(&store, &format!("{ID}@address.city"));
        assert!(result.resolved);
        assert_eq!(result.value, Some(json!("Berlin")));

        let result = get_attribute(&store, &format!("{ID}@roles[1].name"));
        assert_eq!(result.value, Some(json!("dev")));

        let result = get_attribute(&store, &format!("{ID}@roles/0/name"));
        assert_eq!(result.value, Some(json!("admin")));
    }

    #[test]
    fn test_missing_selector() {
        let result = get_attribute(&store(), ID);
        assert!(!result.resolved);
        assert_eq!(
            result.error.as_deref(),
            Some("Attribute selector requires '@path' in the identifier")
        );
    }

    #[test]
    fn test_unknown_entity() {
        let result = get_attribute(&store(), "gts.x.test.attr.user.v1~x.app.users.bob.v1@name");
        assert_eq!(
            result.error.as_deref(),
            Some("Entity not found: gts.x.test.attr.user.v1~x.app.users.bob.v1")
        );
    }

    #[test]
    fn test_path_errors_list_fields() {
        let store = store();
        let result = get_attribute(&store, &format!("{ID}@address.street"));
        assert_eq!(
            result.error.as_deref(),
            Some("Path not found at segment 'street' in 'address.street', see available fields")
        );
        assert_eq!(result.available_fields, vec!["city", "zip"]);

        let result = get_attribute(&store, &format!("{ID}@roles[5]"));
        assert_eq!(result.error.as_deref(), Some("Index out of range at segment '[5]'"));
        assert!(result.available_fields.contains(&"[1].name".to_string()));

        let result = get_attribute(&store, &format!("{ID}@roles.first"));
        assert_eq!(result.error.as_deref(), Some("Expected list index at segment 'first'"));

        let result = get_attribute(&store, &format!("{ID}@name.first"));
        assert_eq!(
            result.error.as_deref(),
            Some("Cannot descend into string at segment 'first'")
        );
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a.b[0]/c"), vec!["a", "b", "[0]", "c"]);
        assert_eq!(split_path("m[1][2]"), vec!["m", "[1]", "[2]"]);
        assert_eq!(split_path("broken[1"), vec!["broken[1"]);
    }
}
