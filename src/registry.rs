//! GTS entity registry
//!
//! An in-memory collection of entities keyed by identifier, optionally
//! populated from a [`GtsReader`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::GtsConfig;
use crate::entity::JsonEntity;
use crate::error::{GtsError, Result};
use crate::id::GtsId;
use crate::validate::lint_schema_refs;
use crate::xref::XGtsRefValidator;

/// Bulk source of entities (files, databases, fixtures)
pub trait GtsReader {
    /// Next entity, or `None` once exhausted
    fn next(&mut self) -> Option<JsonEntity>;

    /// Load a single entity on demand
    fn read_by_id(&mut self, id: &str) -> Option<JsonEntity>;

    /// Restart iteration from the beginning
    fn reset(&mut self);
}

/// Lookup contract consumed by validation, cast and graph resolution
pub trait EntityLookup {
    fn get(&self, id: &str) -> Option<&JsonEntity>;
}

/// Summary row returned by [`GtsStore::list`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInfo {
    pub id: String,
    pub schema_id: Option<String>,
    pub is_schema: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResult {
    pub entities: Vec<EntityInfo>,
    pub count: usize,
    pub total: usize,
}

/// The registry
pub struct GtsStore {
    entities: BTreeMap<String, JsonEntity>,
    reader: Option<Box<dyn GtsReader>>,
    config: GtsConfig,
}

impl GtsStore {
    /// Empty registry with default configuration
    pub fn new() -> Self {
        Self::with_config(GtsConfig::default())
    }

    pub fn with_config(config: GtsConfig) -> Self {
        Self {
            entities: BTreeMap::new(),
            reader: None,
            config,
        }
    }

    /// Registry populated by draining `reader`; the reader stays attached
    /// for on-demand lookups through [`GtsStore::fetch`]
    pub fn with_reader(reader: Box<dyn GtsReader>, config: GtsConfig) -> Self {
        let mut store = Self {
            entities: BTreeMap::new(),
            reader: Some(reader),
            config,
        };
        store.populate_from_reader();
        info!(
            entities = store.entities.len(),
            validate_references = store.config.registry.validate_references,
            "created GTS store"
        );
        store
    }

    fn populate_from_reader(&mut self) {
        let Some(reader) = self.reader.as_mut() else {
            return;
        };
        while let Some(entity) = reader.next() {
            match entity.id() {
                Some(id) => {
                    self.entities.insert(id.to_string(), entity);
                }
                None => debug!(label = entity.label(), "skipping entity without GTS ID"),
            }
        }
    }

    pub fn config(&self) -> &GtsConfig {
        &self.config
    }

    /// Add or replace an entity
    pub fn register(&mut self, entity: JsonEntity) -> Result<()> {
        let id = entity.id().ok_or(GtsError::MissingId)?.to_string();

        if self.config.registry.validate_references {
            let errors = self.reference_errors(&entity);
            if !errors.is_empty() {
                warn!(id = %id, errors = errors.len(), "rejected entity with invalid references");
                return Err(GtsError::ReferenceValidation(format!(
                    "{}: {}",
                    id,
                    errors.join("; ")
                )));
            }
        }

        debug!(
            id = %id,
            is_schema = entity.is_schema(),
            refs = entity.refs().len(),
            "registered entity"
        );
        self.entities.insert(id, entity);
        Ok(())
    }

    /// Register raw schema content under a type identifier
    pub fn register_schema(&mut self, type_id: &str, schema: Value) -> Result<()> {
        let gts_id = GtsId::parse(type_id)?;
        if !gts_id.is_type() {
            return Err(GtsError::InvalidSchema(format!(
                "schema type_id must end with '~': {type_id}"
            )));
        }
        let entity = JsonEntity::from_schema(gts_id, schema, &self.config.extraction);
        self.register(entity)
    }

    pub fn get(&self, id: &str) -> Option<&JsonEntity> {
        self.entities.get(id)
    }

    /// Like [`GtsStore::get`], falling back to the reader and caching the hit
    pub fn fetch(&mut self, id: &str) -> Option<&JsonEntity> {
        if !self.entities.contains_key(id) {
            let entity = self.reader.as_mut()?.read_by_id(id)?;
            debug!(id, "loaded entity from reader");
            self.entities.insert(id.to_string(), entity);
        }
        self.entities.get(id)
    }

    /// Entities in identifier order
    pub fn items(&self) -> impl Iterator<Item = (&str, &JsonEntity)> {
        self.entities.iter().map(|(id, entity)| (id.as_str(), entity))
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn list(&self, limit: usize) -> ListResult {
        let entities: Vec<EntityInfo> = self
            .entities
            .iter()
            .take(limit)
            .map(|(id, entity)| EntityInfo {
                id: id.clone(),
                schema_id: entity.schema_id().map(str::to_string),
                is_schema: entity.is_schema(),
            })
            .collect();
        ListResult {
            count: entities.len(),
            total: self.entities.len(),
            entities,
        }
    }

    /// Problems with the identifiers an entity refers to
    pub fn reference_errors(&self, entity: &JsonEntity) -> Vec<String> {
        let mut errors = Vec::new();

        for reference in entity.refs() {
            if Some(reference.id.as_str()) == entity.id() {
                continue;
            }
            match self.get(&reference.id) {
                None => errors.push(format!(
                    "referenced entity not found: {} (at {})",
                    reference.id, reference.source_path
                )),
                Some(target)
                    if entity.is_schema()
                        && reference.source_path.contains("$ref")
                        && !target.is_schema() =>
                {
                    errors.push(format!(
                        "schema reference points to non-schema entity: {} (at {})",
                        reference.id, reference.source_path
                    ))
                }
                Some(_) => {}
            }
        }

        if entity.is_schema() {
            errors.extend(lint_schema_refs(entity.content()).iter().map(ToString::to_string));
            errors.extend(
                XGtsRefValidator::new(None)
                    .validate_schema(entity.content())
                    .iter()
                    .map(ToString::to_string),
            );
        }
        errors
    }
}

impl Default for GtsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityLookup for GtsStore {
    fn get(&self, id: &str) -> Option<&JsonEntity> {
        self.entities.get(id)
    }
}
