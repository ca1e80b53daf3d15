//! JSON entities: documents with resolved GTS identifiers

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::ExtractionConfig;
use crate::id::{is_valid_gts_id, GtsId, GTS_URI_PREFIX};

/// Where an entity was loaded from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFile {
    pub path: PathBuf,
    pub name: String,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }
}

/// An identifier found inside a document, with the JSON path it sits at
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GtsReference {
    pub id: String,
    pub source_path: String,
}

/// A JSON document plus its resolved identifiers
#[derive(Debug, Clone)]
pub struct JsonEntity {
    gts_id: Option<GtsId>,
    schema_id: Option<String>,
    selected_entity_field: Option<String>,
    selected_schema_id_field: Option<String>,
    is_schema: bool,
    content: Value,
    file: Option<JsonFile>,
    list_sequence: Option<usize>,
    label: String,
    refs: Vec<GtsReference>,
}

impl JsonEntity {
    pub fn new(content: Value, config: &ExtractionConfig) -> Self {
        Self::with_source(content, config, None, None)
    }

    /// Build an entity remembering its file and position in a JSON array
    pub fn with_source(
        content: Value,
        config: &ExtractionConfig,
        file: Option<JsonFile>,
        list_sequence: Option<usize>,
    ) -> Self {
        let is_schema = is_json_schema(&content);
        let (selected_entity_field, id_value) = first_field(&content, &config.entity_id_fields);
        let gts_id = id_value.as_deref().and_then(|v| GtsId::parse(v).ok());

        let (selected_schema_id_field, schema_id) = resolve_schema_id(
            &content,
            config,
            is_schema,
            gts_id.as_ref(),
            selected_entity_field.as_deref(),
        );

        let refs = extract_references(&content);

        let label = match (&file, list_sequence, &gts_id) {
            (Some(file), Some(idx), _) => format!("{}#{}", file.name, idx),
            (Some(file), None, _) => file.name.clone(),
            (None, _, Some(id)) => id.to_string(),
            _ => String::new(),
        };

        Self {
            gts_id,
            schema_id,
            selected_entity_field,
            selected_schema_id_field,
            is_schema,
            content,
            file,
            list_sequence,
            label,
            refs,
        }
    }

    /// A schema document registered under an explicit type identifier
    pub(crate) fn from_schema(gts_id: GtsId, content: Value, config: &ExtractionConfig) -> Self {
        let (selected_schema_id_field, schema_id) =
            resolve_schema_id(&content, config, true, Some(&gts_id), None);
        let refs = extract_references(&content);
        Self {
            label: gts_id.to_string(),
            gts_id: Some(gts_id),
            schema_id,
            selected_entity_field: None,
            selected_schema_id_field,
            is_schema: true,
            content,
            file: None,
            list_sequence: None,
            refs,
        }
    }

    /// The entity's identifier text, if it resolved to a valid one
    pub fn id(&self) -> Option<&str> {
        self.gts_id.as_ref().map(GtsId::as_str)
    }

    pub fn gts_id(&self) -> Option<&GtsId> {
        self.gts_id.as_ref()
    }

    /// Identifier of the schema governing this entity
    pub fn schema_id(&self) -> Option<&str> {
        self.schema_id.as_deref()
    }

    pub fn selected_entity_field(&self) -> Option<&str> {
        self.selected_entity_field.as_deref()
    }

    pub fn selected_schema_id_field(&self) -> Option<&str> {
        self.selected_schema_id_field.as_deref()
    }

    pub fn is_schema(&self) -> bool {
        self.is_schema
    }

    /// True when the identifier names a type
    pub fn is_type(&self) -> bool {
        self.gts_id.as_ref().is_some_and(GtsId::is_type)
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn file(&self) -> Option<&JsonFile> {
        self.file.as_ref()
    }

    pub fn list_sequence(&self) -> Option<usize> {
        self.list_sequence
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Every identifier embedded in the content
    pub fn refs(&self) -> &[GtsReference] {
        &self.refs
    }
}

fn is_json_schema(content: &Value) -> bool {
    content
        .as_object()
        .is_some_and(|obj| obj.contains_key("$schema") || obj.contains_key("$$schema"))
}

fn field_value(content: &Value, field: &str) -> Option<String> {
    let value = content.get(field)?.as_str()?.trim();
    let value = if field == "$id" {
        value.strip_prefix(GTS_URI_PREFIX).unwrap_or(value)
    } else {
        value
    };
    (!value.is_empty()).then(|| value.to_string())
}

/// First field holding a valid identifier, else the first non-empty one
fn first_field(content: &Value, fields: &[String]) -> (Option<String>, Option<String>) {
    let found = fields
        .iter()
        .find_map(|f| field_value(content, f).filter(|v| is_valid_gts_id(v)).map(|v| (f, v)))
        .or_else(|| fields.iter().find_map(|f| field_value(content, f).map(|v| (f, v))));
    match found {
        Some((field, value)) => (Some(field.clone()), Some(value)),
        None => (None, None),
    }
}

fn resolve_schema_id(
    content: &Value,
    config: &ExtractionConfig,
    is_schema: bool,
    gts_id: Option<&GtsId>,
    entity_field: Option<&str>,
) -> (Option<String>, Option<String>) {
    let entity_field = entity_field.map(str::to_string);

    if is_schema {
        // a derived type is governed by its immediate parent type
        if let Some(id) = gts_id.filter(|id| id.is_type() && id.segments().len() > 1) {
            let text = id.as_str();
            let without_last = &text[..text.len() - 1];
            if let Some(pos) = without_last.rfind('~') {
                return (entity_field, Some(text[..=pos].to_string()));
            }
        }
        return match field_value(content, "$schema") {
            Some(value) => (Some("$schema".to_string()), Some(value)),
            None => (None, None),
        };
    }

    if let Some(schema_id) = gts_id.and_then(GtsId::schema_id) {
        return (entity_field, Some(schema_id.to_string()));
    }

    first_field(content, &config.schema_id_fields)
}

/// Collect every string in `content` that is a valid identifier, keyed by
/// its path (`a.b`, `arr[0]`, or `root` for a bare top-level string)
pub fn extract_references(content: &Value) -> Vec<GtsReference> {
    let mut refs = Vec::new();
    let mut seen = HashSet::new();
    walk_references(content, "", &mut refs, &mut seen);
    refs
}

fn walk_references(
    node: &Value,
    path: &str,
    refs: &mut Vec<GtsReference>,
    seen: &mut HashSet<(String, String)>,
) {
    match node {
        Value::String(s) => {
            if is_valid_gts_id(s) {
                let source_path = if path.is_empty() { "root" } else { path };
                if seen.insert((s.clone(), source_path.to_string())) {
                    refs.push(GtsReference {
                        id: s.clone(),
                        source_path: source_path.to_string(),
                    });
                }
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                let next = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk_references(value, &next, refs, seen);
            }
        }
        Value::Array(items) => {
            for (idx, value) in items.iter().enumerate() {
                walk_references(value, &format!("{path}[{idx}]"), refs, seen);
            }
        }
        _ => {}
    }
}

/// Identifier fields resolved from a document, without registering it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractIdResult {
    pub id: String,
    pub schema_id: Option<String>,
    pub selected_entity_field: Option<String>,
    pub selected_schema_id_field: Option<String>,
    pub is_schema: bool,
}

pub fn extract_id(content: Value, config: &ExtractionConfig) -> ExtractIdResult {
    let raw_id = |entity: &JsonEntity| {
        entity
            .selected_entity_field()
            .and_then(|field| entity.content().get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let entity = JsonEntity::new(content, config);
    let id = match entity.id() {
        Some(id) => id.to_string(),
        None if entity.is_schema() => String::new(),
        None => raw_id(&entity).unwrap_or_default(),
    };
    ExtractIdResult {
        id,
        schema_id: entity.schema_id.clone(),
        selected_entity_field: entity.selected_entity_field.clone(),
        selected_schema_id_field: entity.selected_schema_id_field.clone(),
        is_schema: entity.is_schema,
    }
}
