//! The `x-gts-ref` schema keyword
//!
//! A string property annotated with `x-gts-ref` must hold a GTS identifier
//! matching the keyword's value. The value is an identifier, a `gts.` prefix
//! pattern ending in `*`, or a `/json/pointer` into the same schema that
//! resolves (possibly through further pointers) to one of those.

use serde_json::Value;
use std::fmt;

use crate::id::is_valid_gts_id;
use crate::registry::EntityLookup;
use crate::validate::{join_schema_path, json_kind};

const KEYWORD: &str = "x-gts-ref";
const ANY_GTS: &str = "gts.*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XGtsRefError {
    pub field_path: String,
    pub value: String,
    pub ref_pattern: String,
    pub reason: String,
}

impl fmt::Display for XGtsRefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x-gts-ref validation failed for field '{}': {}",
            self.field_path, self.reason
        )
    }
}

/// Checks `x-gts-ref` on schemas and the instances they describe
pub struct XGtsRefValidator<'a> {
    lookup: Option<&'a dyn EntityLookup>,
}

impl<'a> XGtsRefValidator<'a> {
    /// With a registry, referenced identifiers must also exist
    pub fn new(lookup: Option<&'a dyn EntityLookup>) -> Self {
        Self { lookup }
    }

    /// Check every annotated string in `instance`
    pub fn validate_instance(&self, instance: &Value, schema: &Value) -> Vec<XGtsRefError> {
        let mut errors = Vec::new();
        self.visit_instance(instance, schema, "", schema, &mut errors);
        errors
    }

    /// Check that every `x-gts-ref` value in `schema` is well formed
    pub fn validate_schema(&self, schema: &Value) -> Vec<XGtsRefError> {
        let mut errors = Vec::new();
        visit_schema(schema, "", schema, &mut errors);
        errors
    }

    fn visit_instance(
        &self,
        instance: &Value,
        schema: &Value,
        path: &str,
        root: &Value,
        errors: &mut Vec<XGtsRefError>,
    ) {
        let Some(schema_map) = schema.as_object() else {
            return;
        };

        if let (Some(pattern), Some(value)) = (schema_map.get(KEYWORD), instance.as_str()) {
            if let Err(err) = self.check_value(value, pattern, path, root) {
                errors.push(err);
            }
        }

        if let Some(parts) = schema_map.get("allOf").and_then(Value::as_array) {
            for part in parts {
                self.visit_instance(instance, part, path, root, errors);
            }
        }

        if let (Some(properties), Some(object)) = (
            schema_map.get("properties").and_then(Value::as_object),
            instance.as_object(),
        ) {
            for (name, prop_schema) in properties {
                if let Some(value) = object.get(name) {
                    let prop_path = if path.is_empty() {
                        name.clone()
                    } else {
                        format!("{path}.{name}")
                    };
                    self.visit_instance(value, prop_schema, &prop_path, root, errors);
                }
            }
        }

        if let (Some(items), Some(array)) = (schema_map.get("items"), instance.as_array()) {
            for (idx, item) in array.iter().enumerate() {
                self.visit_instance(item, items, &format!("{path}[{idx}]"), root, errors);
            }
        }
    }

    fn check_value(
        &self,
        value: &str,
        pattern: &Value,
        path: &str,
        root: &Value,
    ) -> Result<(), XGtsRefError> {
        let fail = |ref_pattern: &str, reason: String| XGtsRefError {
            field_path: path.to_string(),
            value: value.to_string(),
            ref_pattern: ref_pattern.to_string(),
            reason,
        };

        let Some(raw) = pattern.as_str() else {
            return Err(fail(
                &pattern.to_string(),
                format!("Value must be a string, got {}", json_kind(pattern)),
            ));
        };

        let pattern = if raw.starts_with('/') {
            let resolved = resolve_pointer(root, raw)
                .ok_or_else(|| fail(raw, format!("Cannot resolve reference path '{raw}'")))?;
            if !resolved.starts_with("gts.") {
                return Err(fail(
                    raw,
                    format!("Resolved reference '{raw}' -> '{resolved}' is not a GTS pattern"),
                ));
            }
            resolved
        } else {
            raw.to_string()
        };

        if !is_valid_gts_id(value) {
            return Err(fail(&pattern, format!("Value '{value}' is not a valid GTS identifier")));
        }

        let prefix = pattern.strip_suffix('*').unwrap_or(&pattern);
        if pattern != ANY_GTS && !value.starts_with(prefix) {
            return Err(fail(
                &pattern,
                format!("Value '{value}' does not match pattern '{pattern}'"),
            ));
        }

        if let Some(lookup) = self.lookup {
            if lookup.get(value).is_none() {
                return Err(fail(
                    &pattern,
                    format!("Referenced entity '{value}' not found in registry"),
                ));
            }
        }
        Ok(())
    }
}

fn visit_schema(schema: &Value, path: &str, root: &Value, errors: &mut Vec<XGtsRefError>) {
    let Some(map) = schema.as_object() else {
        return;
    };

    if let Some(pattern) = map.get(KEYWORD) {
        if let Err(err) = check_pattern(pattern, &join_schema_path(path, KEYWORD), root) {
            errors.push(err);
        }
    }

    for (key, value) in map {
        if key == KEYWORD {
            continue;
        }
        let nested = join_schema_path(path, key);
        match value {
            Value::Object(_) => visit_schema(value, &nested, root, errors),
            Value::Array(items) => {
                for (idx, item) in items.iter().enumerate() {
                    visit_schema(item, &format!("{nested}[{idx}]"), root, errors);
                }
            }
            _ => {}
        }
    }
}

fn check_pattern(pattern: &Value, path: &str, root: &Value) -> Result<(), XGtsRefError> {
    let fail = |ref_pattern: &str, reason: String| XGtsRefError {
        field_path: path.to_string(),
        value: pattern.to_string(),
        ref_pattern: ref_pattern.to_string(),
        reason,
    };

    let Some(raw) = pattern.as_str() else {
        return Err(fail(
            "",
            format!("x-gts-ref value must be a string, got {}", json_kind(pattern)),
        ));
    };

    if raw.starts_with("gts.") {
        if raw == ANY_GTS {
            return Ok(());
        }
        if raw.contains('*') {
            let well_formed = raw.ends_with('*') && raw.matches('*').count() == 1;
            return if well_formed {
                Ok(())
            } else {
                Err(fail(raw, format!("Invalid GTS wildcard pattern: {raw}")))
            };
        }
        return if is_valid_gts_id(raw) {
            Ok(())
        } else {
            Err(fail(raw, format!("Invalid GTS identifier: {raw}")))
        };
    }

    if raw.starts_with('/') {
        let resolved = resolve_pointer(root, raw)
            .ok_or_else(|| fail(raw, format!("Cannot resolve reference path '{raw}'")))?;
        return if is_valid_gts_id(&resolved) {
            Ok(())
        } else {
            Err(fail(
                raw,
                format!("Resolved reference '{raw}' -> '{resolved}' is not a valid GTS identifier"),
            ))
        };
    }

    Err(fail(
        raw,
        format!("Invalid x-gts-ref value: '{raw}' must start with 'gts.' or '/'"),
    ))
}

/// Follow the JSON pointer `/a/b/c` inside `root`. A string target is
/// returned as is (or followed again when it is itself a pointer); an object
/// target yields its own `x-gts-ref`.
fn resolve_pointer(root: &Value, pointer: &str) -> Option<String> {
    let mut visited: Vec<String> = Vec::new();
    let mut pointer = pointer.to_string();

    loop {
        if visited.contains(&pointer) {
            return None;
        }
        if pointer.trim_start_matches('/').is_empty() {
            return None;
        }

        let next = match root.pointer(&pointer)? {
            Value::String(s) => s.clone(),
            Value::Object(map) => map.get(KEYWORD)?.as_str()?.to_string(),
            _ => return None,
        };
        if !next.starts_with('/') {
            return Some(next);
        }
        visited.push(std::mem::replace(&mut pointer, next));
    }
}
