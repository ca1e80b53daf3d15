//! Schema compatibility checking
//!
//! Compares two schema versions in one direction at a time:
//! - backward: consumers built for the new schema can read old data, so the
//!   new schema must not tighten anything
//! - forward: consumers built for the old schema can read new data, so the
//!   new schema must not relax anything
//!
//! Violations are collected as readable messages rather than returned as
//! errors; a check never fails outright.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::GtsError;
use crate::id::{GtsId, Segment};
use crate::registry::EntityLookup;
use crate::schema::{flatten, format_bound, number, properties, required_set, string_items, type_of};
use crate::version::Direction;

/// Which way a schema change is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    Backward,
    Forward,
}

/// Bound keyword pairs checked for each primitive type
const BOUNDS: &[(&[&str], &str, &str)] = &[
    (&["number", "integer"], "minimum", "maximum"),
    (&["string"], "minLength", "maxLength"),
    (&["array"], "minItems", "maxItems"),
];

/// Result of comparing two schemas in both directions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatibilityReport {
    #[serde(rename = "from")]
    pub from_id: String,
    #[serde(rename = "to")]
    pub to_id: String,
    #[serde(rename = "old")]
    pub old_id: String,
    #[serde(rename = "new")]
    pub new_id: String,
    pub direction: Direction,
    pub added_properties: Vec<String>,
    pub removed_properties: Vec<String>,
    pub changed_properties: Vec<BTreeMap<String, String>>,
    pub is_fully_compatible: bool,
    pub is_backward_compatible: bool,
    pub is_forward_compatible: bool,
    pub incompatibility_reasons: Vec<String>,
    pub backward_errors: Vec<String>,
    pub forward_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompatibilityReport {
    /// Empty report between two identifiers
    pub fn new(old_id: &str, new_id: &str, direction: Direction) -> Self {
        Self {
            from_id: old_id.to_string(),
            to_id: new_id.to_string(),
            old_id: old_id.to_string(),
            new_id: new_id.to_string(),
            direction,
            ..Default::default()
        }
    }

    /// Report for a comparison that could not run
    pub fn unavailable(old_id: &str, new_id: &str, reason: String) -> Self {
        Self {
            backward_errors: vec![reason.clone()],
            forward_errors: vec![reason],
            ..Self::new(old_id, new_id, Direction::Unknown)
        }
    }
}

/// Compatibility checker for schema versions
pub struct CompatibilityChecker {
    mode: CheckMode,
}

impl CompatibilityChecker {
    pub fn new(mode: CheckMode) -> Self {
        Self { mode }
    }

    pub fn backward() -> Self {
        Self::new(CheckMode::Backward)
    }

    pub fn forward() -> Self {
        Self::new(CheckMode::Forward)
    }

    pub fn mode(&self) -> CheckMode {
        self.mode
    }

    /// Compare two schemas; compatible when no violations were found
    pub fn check(&self, old: &Value, new: &Value) -> (bool, Vec<String>) {
        let mut violations = Vec::new();
        self.detect_violations(old, new, &mut violations);
        (violations.is_empty(), violations)
    }

    fn detect_violations(&self, old: &Value, new: &Value, violations: &mut Vec<String>) {
        let old_flat = flatten(old);
        let new_flat = flatten(new);
        let old_props = properties(&old_flat);
        let new_props = properties(&new_flat);
        let old_required = required_set(&old_flat);
        let new_required = required_set(&new_flat);

        match self.mode {
            CheckMode::Backward => {
                let added = difference(&new_required, &old_required);
                if !added.is_empty() {
                    violations.push(format!("Added required properties: {}", added.join(", ")));
                }
            }
            CheckMode::Forward => {
                let removed = difference(&old_required, &new_required);
                if !removed.is_empty() {
                    violations.push(format!("Removed required properties: {}", removed.join(", ")));
                }
            }
        }

        let common: BTreeSet<&String> = old_props.keys().filter(|k| new_props.contains_key(*k)).collect();
        for name in common {
            let old_prop = &old_props[name];
            let new_prop = &new_props[name];

            let old_type = type_of(old_prop, "type");
            let new_type = type_of(new_prop, "type");
            if !old_type.is_empty() && !new_type.is_empty() && old_type != new_type {
                violations.push(format!(
                    "Property '{name}' type changed from {old_type} to {new_type}"
                ));
            }

            self.check_enum(name, old_prop, new_prop, violations);
            self.check_bounds(name, old_prop, new_prop, violations);

            if old_type == "object" && new_type == "object" {
                let (_, nested) = self.check(old_prop, new_prop);
                violations.extend(nested.into_iter().map(|v| format!("Property '{name}': {v}")));
            }

            if old_type == "array" && new_type == "array" {
                if let (Some(old_items), Some(new_items)) = (
                    old_prop.get("items").filter(|i| i.is_object()),
                    new_prop.get("items").filter(|i| i.is_object()),
                ) {
                    let (_, nested) = self.check(old_items, new_items);
                    violations.extend(
                        nested
                            .into_iter()
                            .map(|v| format!("Property '{name}' array items: {v}")),
                    );
                }
            }
        }
    }

    fn check_enum(&self, name: &str, old: &Value, new: &Value, violations: &mut Vec<String>) {
        let old_values: BTreeSet<String> = string_items(old, "enum").into_iter().collect();
        let new_values: BTreeSet<String> = string_items(new, "enum").into_iter().collect();
        if old_values.is_empty() || new_values.is_empty() {
            return;
        }

        match self.mode {
            CheckMode::Backward => {
                let added = difference(&new_values, &old_values);
                if !added.is_empty() {
                    violations.push(format!(
                        "Property '{name}' added enum values: {}",
                        added.join(", ")
                    ));
                }
            }
            CheckMode::Forward => {
                let removed = difference(&old_values, &new_values);
                if !removed.is_empty() {
                    violations.push(format!(
                        "Property '{name}' removed enum values: {}",
                        removed.join(", ")
                    ));
                }
            }
        }
    }

    /// Bounds are chosen by the old property's declared type
    fn check_bounds(&self, name: &str, old: &Value, new: &Value, violations: &mut Vec<String>) {
        let prop_type = type_of(old, "type");
        let Some((_, min_key, max_key)) = BOUNDS.iter().find(|(types, _, _)| types.contains(&prop_type)) else {
            return;
        };

        let (old_min, new_min) = (number(old, min_key), number(new, min_key));
        let (old_max, new_max) = (number(old, max_key), number(new, max_key));

        match self.mode {
            CheckMode::Backward => {
                match (old_min, new_min) {
                    (Some(o), Some(n)) if n > o => violations.push(format!(
                        "Property '{name}' {min_key} increased from {} to {}",
                        format_bound(o),
                        format_bound(n)
                    )),
                    (None, Some(n)) => violations.push(format!(
                        "Property '{name}' added {min_key} constraint: {}",
                        format_bound(n)
                    )),
                    _ => {}
                }
                match (old_max, new_max) {
                    (Some(o), Some(n)) if n < o => violations.push(format!(
                        "Property '{name}' {max_key} decreased from {} to {}",
                        format_bound(o),
                        format_bound(n)
                    )),
                    (None, Some(n)) => violations.push(format!(
                        "Property '{name}' added {max_key} constraint: {}",
                        format_bound(n)
                    )),
                    _ => {}
                }
            }
            CheckMode::Forward => {
                match (old_min, new_min) {
                    (Some(o), Some(n)) if n < o => violations.push(format!(
                        "Property '{name}' {min_key} decreased from {} to {}",
                        format_bound(o),
                        format_bound(n)
                    )),
                    (Some(_), None) => {
                        violations.push(format!("Property '{name}' removed {min_key} constraint"))
                    }
                    _ => {}
                }
                match (old_max, new_max) {
                    (Some(o), Some(n)) if n > o => violations.push(format!(
                        "Property '{name}' {max_key} increased from {} to {}",
                        format_bound(o),
                        format_bound(n)
                    )),
                    (Some(_), None) => {
                        violations.push(format!("Property '{name}' removed {max_key} constraint"))
                    }
                    _ => {}
                }
            }
        }
    }
}

fn difference(a: &BTreeSet<String>, b: &BTreeSet<String>) -> Vec<String> {
    a.difference(b).cloned().collect()
}

/// New schema readers can consume old data
pub fn check_backward(old: &Value, new: &Value) -> (bool, Vec<String>) {
    CompatibilityChecker::backward().check(old, new)
}

/// Old schema readers can consume new data
pub fn check_forward(old: &Value, new: &Value) -> (bool, Vec<String>) {
    CompatibilityChecker::forward().check(old, new)
}

/// Compare the minor versions of the two identifiers' final segments
pub fn infer_direction(from_id: &str, to_id: &str) -> Direction {
    let (Ok(from), Ok(to)) = (GtsId::parse(from_id), GtsId::parse(to_id)) else {
        return Direction::Unknown;
    };
    match (from.last_segment(), to.last_segment()) {
        (Segment::Concrete(from), Segment::Concrete(to)) => from.version.direction_to(&to.version),
        _ => Direction::Unknown,
    }
}

/// Top-level property names present only on one side, and type changes
fn property_changes(
    old: &Value,
    new: &Value,
) -> (Vec<String>, Vec<String>, Vec<BTreeMap<String, String>>) {
    let old_props = properties(&flatten(old));
    let new_props = properties(&flatten(new));

    let added = new_props.keys().filter(|k| !old_props.contains_key(*k)).cloned().collect();
    let removed = old_props.keys().filter(|k| !new_props.contains_key(*k)).cloned().collect();
    let changed = old_props
        .iter()
        .filter_map(|(name, old_prop)| {
            let new_prop = new_props.get(name)?;
            let (old_type, new_type) = (type_of(old_prop, "type"), type_of(new_prop, "type"));
            (!old_type.is_empty() && !new_type.is_empty() && old_type != new_type).then(|| {
                BTreeMap::from([
                    ("property".to_string(), name.clone()),
                    ("old_type".to_string(), old_type.to_string()),
                    ("new_type".to_string(), new_type.to_string()),
                ])
            })
        })
        .collect();
    (added, removed, changed)
}

/// Compare two registered schemas
pub fn check_compatibility<L: EntityLookup + ?Sized>(
    lookup: &L,
    old_id: &str,
    new_id: &str,
) -> CompatibilityReport {
    let schema = |id: &str| match lookup.get(id) {
        None => Err(GtsError::SchemaNotFound(id.to_string())),
        Some(entity) if !entity.is_schema() => Err(GtsError::NotASchema(id.to_string())),
        Some(entity) => Ok(entity.content()),
    };

    let (old, new) = match (schema(old_id), schema(new_id)) {
        (Ok(old), Ok(new)) => (old, new),
        (Err(err), _) | (_, Err(err)) => {
            debug!(old_id, new_id, error = %err, "compatibility check skipped");
            return CompatibilityReport::unavailable(old_id, new_id, err.to_string());
        }
    };

    let (is_backward, backward_errors) = check_backward(old, new);
    let (is_forward, forward_errors) = check_forward(old, new);
    let (added, removed, changed) = property_changes(old, new);
    let direction = infer_direction(old_id, new_id);

    debug!(
        old_id,
        new_id,
        %direction,
        backward = is_backward,
        forward = is_forward,
        "checked schema compatibility"
    );

    CompatibilityReport {
        added_properties: added,
        removed_properties: removed,
        changed_properties: changed,
        is_fully_compatible: is_backward && is_forward,
        is_backward_compatible: is_backward,
        is_forward_compatible: is_forward,
        backward_errors,
        forward_errors,
        ..CompatibilityReport::new(old_id, new_id, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GtsStore;
    use serde_json::json;

    #[test]
    fn test_compatible_field_addition() {
        let old = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}}
        });
        let new = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "age": {"type": "number"}}
        });

        assert_eq!(check_backward(&old, &new), (true, vec![]));
        assert_eq!(check_forward(&old, &new), (true, vec![]));
    }

    #[test]
    fn test_added_required_breaks_backward() {
        let old = json!({
            "type": "object",
            "required": ["eventId"],
            "properties": {"eventId": {"type": "string"}}
        });
        let new = json!({
            "type": "object",
            "required": ["eventId", "newRequiredField"],
            "properties": {
                "eventId": {"type": "string"},
                "newRequiredField": {"type": "string"}
            }
        });

        let (ok, errors) = check_backward(&old, &new);
        assert!(!ok);
        assert_eq!(errors, vec!["Added required properties: newRequiredField"]);

        let (ok, errors) = check_forward(&new, &old);
        assert!(!ok);
        assert_eq!(errors, vec!["Removed required properties: newRequiredField"]);
    }

    #[test]
    fn test_type_change_breaks_both() {
        let old = json!({"properties": {"count": {"type": "integer"}}});
        let new = json!({"properties": {"count": {"type": "string"}}});
        let expected = "Property 'count' type changed from integer to string";
        assert_eq!(check_backward(&old, &new).1, vec![expected]);
        assert_eq!(check_forward(&old, &new).1, vec![expected]);
    }

    #[test]
    fn test_enum_growth_and_shrinkage() {
        let old = json!({"properties": {"status": {"type": "string", "enum": ["a", "b"]}}});
        let new = json!({"properties": {"status": {"type": "string", "enum": ["a", "c", "d"]}}});

        assert_eq!(
            check_backward(&old, &new).1,
            vec!["Property 'status' added enum values: c, d"]
        );
        assert_eq!(
            check_forward(&old, &new).1,
            vec!["Property 'status' removed enum values: b"]
        );
    }

    #[test]
    fn test_numeric_bounds() {
        let old = json!({"properties": {"n": {"type": "number", "minimum": 1, "maximum": 10}}});
        let tighter = json!({"properties": {"n": {"type": "number", "minimum": 5, "maximum": 8.5}}});

        let (ok, errors) = check_backward(&old, &tighter);
        assert!(!ok);
        assert_eq!(
            errors,
            vec![
                "Property 'n' minimum increased from 1 to 5",
                "Property 'n' maximum decreased from 10 to 8.5",
            ]
        );
        assert!(check_forward(&old, &tighter).0);

        let looser = json!({"properties": {"n": {"type": "number"}}});
        assert_eq!(
            check_forward(&old, &looser).1,
            vec![
                "Property 'n' removed minimum constraint",
                "Property 'n' removed maximum constraint",
            ]
        );
        assert_eq!(
            check_backward(&looser, &old).1,
            vec![
                "Property 'n' added minimum constraint: 1",
                "Property 'n' added maximum constraint: 10",
            ]
        );
    }

    #[test]
    fn test_string_and_array_bounds() {
        let old = json!({"properties": {
            "s": {"type": "string", "maxLength": 10},
            "l": {"type": "array", "minItems": 2}
        }});
        let new = json!({"properties": {
            "s": {"type": "string", "maxLength": 20},
            "l": {"type": "array", "minItems": 1}
        }});
        assert!(check_backward(&old, &new).0);
        assert_eq!(
            check_forward(&old, &new).1,
            vec![
                "Property 'l' minItems decreased from 2 to 1",
                "Property 's' maxLength increased from 10 to 20",
            ]
        );
    }

    #[test]
    fn test_nested_objects_and_array_items() {
        let old = json!({"properties": {
            "address": {"type": "object", "properties": {"zip": {"type": "string"}}},
            "items": {"type": "array", "items": {"type": "object", "required": ["sku"]}}
        }});
        let new = json!({"properties": {
            "address": {
                "type": "object",
                "required": ["city"],
                "properties": {"zip": {"type": "string"}, "city": {"type": "string"}}
            },
            "items": {"type": "array", "items": {"type": "object", "required": ["sku", "qty"]}}
        }});

        assert_eq!(
            check_backward(&old, &new).1,
            vec![
                "Property 'address': Added required properties: city",
                "Property 'items' array items: Added required properties: qty",
            ]
        );
    }

    #[test]
    fn test_all_of_is_flattened() {
        let old = json!({"allOf": [{"properties": {"id": {"type": "string"}}}]});
        let new = json!({"allOf": [
            {"properties": {"id": {"type": "string"}}},
            {"required": ["id"]}
        ]});
        assert_eq!(
            check_backward(&old, &new).1,
            vec!["Added required properties: id"]
        );
    }

    #[test]
    fn test_identical_schemas_compatible() {
        let schema = json!({
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "integer", "minimum": 0, "enum": ["x"]}}
        });
        assert!(CompatibilityChecker::backward().check(&schema, &schema).0);
        assert!(CompatibilityChecker::forward().check(&schema, &schema).0);
    }

    #[test]
    fn test_infer_direction() {
        let v1_0 = "gts.x.core.events.type.v1.0~";
        let v1_1 = "gts.x.core.events.type.v1.1~";
        assert_eq!(infer_direction(v1_0, v1_1), Direction::Up);
        assert_eq!(infer_direction(v1_1, v1_0), Direction::Down);
        assert_eq!(infer_direction(v1_1, v1_1), Direction::None);
        assert_eq!(infer_direction("gts.x.core.events.type.v1~", v1_1), Direction::Unknown);
        assert_eq!(infer_direction("bad", v1_1), Direction::Unknown);
    }

    #[test]
    fn test_check_compatibility_report() {
        let mut store = GtsStore::new();
        store
            .register_schema(
                "gts.x.core.events.type.v1.0~",
                json!({"type": "object", "properties": {"a": {"type": "string"}}}),
            )
            .unwrap();
        store
            .register_schema(
                "gts.x.core.events.type.v1.1~",
                json!({
                    "type": "object",
                    "required": ["b"],
                    "properties": {"a": {"type": "integer"}, "b": {"type": "string"}}
                }),
            )
            .unwrap();

        let report = check_compatibility(
            &store,
            "gts.x.core.events.type.v1.0~",
            "gts.x.core.events.type.v1.1~",
        );
        assert_eq!(report.direction, Direction::Up);
        assert!(!report.is_backward_compatible);
        assert!(!report.is_forward_compatible);
        assert!(!report.is_fully_compatible);
        assert_eq!(report.added_properties, vec!["b"]);
        assert_eq!(report.changed_properties[0]["property"], "a");

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["from"], "gts.x.core.events.type.v1.0~");
        assert_eq!(json["direction"], "up");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_check_compatibility_missing_schema() {
        let store = GtsStore::new();
        let report = check_compatibility(
            &store,
            "gts.x.core.events.type.v1.0~",
            "gts.x.core.events.type.v1.1~",
        );
        assert!(!report.is_backward_compatible);
        assert!(!report.is_forward_compatible);
        assert_eq!(report.direction, Direction::Unknown);
        assert!(report.backward_errors[0].contains("not found"));
        assert_eq!(report.backward_errors, report.forward_errors);
    }
}
