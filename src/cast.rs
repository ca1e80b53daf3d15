//! Instance casting between schema versions
//!
//! A cast copies an instance's content and reshapes it for a target schema:
//! defaults fill missing properties, identifier consts are brought in line
//! with the target, and properties the target forbids are dropped. The result
//! is then validated against the target. Structural problems are reported,
//! never raised; only a missing entity or schema is an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::compatibility::{check_backward, check_forward, infer_direction, CompatibilityReport};
use crate::error::{GtsError, Result};
use crate::id::is_valid_gts_id;
use crate::registry::EntityLookup;
use crate::schema::{allows_additional, flatten, properties, required_set, type_of};
use crate::validate::{relax_gts_consts, RegistryResolver, SchemaValidator};
use crate::version::Direction;

/// A compatibility report plus the reshaped content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastResult {
    #[serde(flatten)]
    pub report: CompatibilityReport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub casted_entity: Option<Value>,
}

#[derive(Default)]
struct CastChanges {
    added: Vec<String>,
    removed: Vec<String>,
    reasons: Vec<String>,
}

/// Cast the registered instance `from_id` to the schema `to_schema_id`
pub fn cast<L: EntityLookup>(
    lookup: &L,
    validator: &dyn SchemaValidator,
    from_id: &str,
    to_schema_id: &str,
) -> Result<CastResult> {
    let instance = lookup
        .get(from_id)
        .ok_or_else(|| GtsError::EntityNotFound(from_id.to_string()))?;
    if instance.is_schema() || from_id.ends_with('~') {
        return Err(GtsError::CastFromSchemaDisallowed(from_id.to_string()));
    }

    let from_schema_id = instance
        .schema_id()
        .ok_or_else(|| GtsError::SchemaUndeterminable(from_id.to_string()))?;
    let from_schema = lookup
        .get(from_schema_id)
        .ok_or_else(|| GtsError::SchemaNotFound(from_schema_id.to_string()))?;

    let target = lookup
        .get(to_schema_id)
        .ok_or_else(|| GtsError::SchemaNotFound(to_schema_id.to_string()))?;
    if !target.is_schema() {
        return Err(GtsError::NotASchema(to_schema_id.to_string()));
    }

    let direction = infer_direction(from_schema_id, to_schema_id);
    let (old, new) = match direction {
        Direction::Down => (target.content(), from_schema.content()),
        _ => (from_schema.content(), target.content()),
    };
    let (is_backward, backward_errors) = check_backward(old, new);
    let (is_forward, forward_errors) = check_forward(old, new);

    let mut changes = CastChanges::default();
    let casted = match instance.content().as_object() {
        Some(object) => {
            let reshaped = cast_object(object, &flatten(target.content()), "", &mut changes);
            Some(Value::Object(reshaped))
        }
        None => {
            changes
                .reasons
                .push("Instance must be an object for casting".to_string());
            None
        }
    };

    if let Some(content) = &casted {
        if let Err(reason) = validate_cast(lookup, validator, target.content(), content) {
            changes.reasons.push(reason);
        }
    }

    let report = CompatibilityReport {
        added_properties: sorted_unique(changes.added),
        removed_properties: sorted_unique(changes.removed),
        is_fully_compatible: changes.reasons.is_empty(),
        is_backward_compatible: is_backward,
        is_forward_compatible: is_forward,
        incompatibility_reasons: changes.reasons,
        backward_errors,
        forward_errors,
        ..CompatibilityReport::new(from_id, to_schema_id, direction)
    };

    info!(
        from_id,
        to_schema_id,
        %direction,
        added = report.added_properties.len(),
        removed = report.removed_properties.len(),
        compatible = report.is_fully_compatible,
        "cast instance"
    );

    Ok(CastResult {
        report,
        casted_entity: casted,
    })
}

/// Reshape one object level against a flattened schema, then descend
fn cast_object(
    instance: &Map<String, Value>,
    schema: &Value,
    base_path: &str,
    changes: &mut CastChanges,
) -> Map<String, Value> {
    let target_props = properties(schema);
    let required = required_set(schema);
    let mut result = instance.clone();

    for name in &required {
        if result.contains_key(name) {
            continue;
        }
        match target_props.get(name).and_then(|p| p.get("default")) {
            Some(default) => {
                result.insert(name.clone(), default.clone());
                changes.added.push(build_path(base_path, name));
            }
            None => changes.reasons.push(format!(
                "Missing required property '{}' and no default is defined",
                build_path(base_path, name)
            )),
        }
    }

    for (name, prop) in &target_props {
        if required.contains(name) || result.contains_key(name) {
            continue;
        }
        if let Some(default) = prop.get("default") {
            result.insert(name.clone(), default.clone());
            changes.added.push(build_path(base_path, name));
        }
    }

    // keep identifier discriminators pointing at the target
    for (name, prop) in &target_props {
        let Some(pinned) = prop.get("const").and_then(Value::as_str) else {
            continue;
        };
        let stale = result
            .get(name)
            .and_then(Value::as_str)
            .is_some_and(|current| current != pinned && is_valid_gts_id(current));
        if stale && is_valid_gts_id(pinned) {
            result.insert(name.clone(), Value::String(pinned.to_string()));
        }
    }

    if !allows_additional(schema) {
        let extras: Vec<String> = result
            .keys()
            .filter(|k| !target_props.contains_key(*k))
            .cloned()
            .collect();
        for name in extras {
            result.remove(&name);
            changes.removed.push(build_path(base_path, &name));
        }
    }

    for (name, prop) in &target_props {
        let Some(value) = result.get_mut(name) else {
            continue;
        };
        match (type_of(prop, "type"), value) {
            ("object", Value::Object(nested)) => {
                let reshaped = cast_object(nested, &flatten(prop), &build_path(base_path, name), changes);
                *nested = reshaped;
            }
            ("array", Value::Array(items)) => {
                let Some(item_schema) = prop.get("items").filter(|s| type_of(s, "type") == "object")
                else {
                    continue;
                };
                let item_schema = flatten(item_schema);
                for (idx, item) in items.iter_mut().enumerate() {
                    if let Value::Object(nested) = item {
                        let path = build_path(base_path, &format!("{name}[{idx}]"));
                        *nested = cast_object(nested, &item_schema, &path, changes);
                    }
                }
            }
            _ => {}
        }
    }

    result
}

/// Validate against the full target with identifier consts relaxed
fn validate_cast<L: EntityLookup>(
    lookup: &L,
    validator: &dyn SchemaValidator,
    schema: &Value,
    content: &Value,
) -> std::result::Result<(), String> {
    let mut relaxed = schema.clone();
    relax_gts_consts(&mut relaxed);

    let compiled = validator
        .compile(&relaxed, &RegistryResolver::new(lookup))
        .map_err(|e| format!("failed to compile schema: {e}"))?;
    compiled.check(content).map_err(|errors| {
        debug!(errors = errors.len(), "casted content failed validation");
        format!("validation failed: {}", errors.join("; "))
    })
}

/// `base.prop`, or `base[0]` for index segments
pub fn build_path(base: &str, prop: &str) -> String {
    if base.is_empty() {
        prop.to_string()
    } else if prop.starts_with('[') {
        format!("{base}{prop}")
    } else {
        format!("{base}.{prop}")
    }
}

fn sorted_unique(paths: Vec<String>) -> Vec<String> {
    paths.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}
