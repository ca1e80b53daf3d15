//! GTS: Global Type System identifiers
//!
//! Versioned, hierarchical identifiers such as
//! `gts.x.core.events.event.v1~x.app.orders.placed.v1.2` and the operations
//! built on them.
//!
//! ## Features
//!
//! - **Identifiers**: strict parsing with segment-level errors, plus a relaxed
//!   pattern mode for wildcards
//! - **Matching and queries**: `.*` / `~*` patterns and `pattern[key=value]`
//!   filters over a registry
//! - **UUIDs**: deterministic v5 UUIDs for every identifier
//! - **Schemas**: backward/forward compatibility checks, instance casting
//!   between minor versions, JSON Schema validation with GTS references
//! - **Relationships**: cycle-safe reference graphs
//!
//! ## Layout
//!
//! ```text
//! id / pattern / uuids        identifier model
//! entity / registry / reader  documents and the in-memory store
//! schema / compatibility      flattening and structural diffs
//! cast / validate / xref      migration and validation
//! query / graph / attribute   lookups over the store
//! ```

pub mod attribute;
pub mod cast;
pub mod compatibility;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod id;
pub mod pattern;
pub mod query;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod uuids;
pub mod validate;
pub mod version;
pub mod xref;

pub use attribute::{get_attribute, AttributeResult};
pub use cast::{cast, CastResult};
pub use compatibility::{
    check_backward, check_compatibility, check_forward, infer_direction, CheckMode,
    CompatibilityChecker, CompatibilityReport,
};
pub use config::GtsConfig;
pub use entity::{extract_id, ExtractIdResult, GtsReference, JsonEntity, JsonFile};
pub use error::{GtsError, IdError, Result};
pub use graph::{build_schema_graph, GraphNode, ReferenceCycle, ReferenceGraph};
pub use id::{is_valid_gts_id, parse_id, validate_id, GtsId, Segment};
pub use pattern::{match_id_pattern, MatchIdResult, WildcardPattern};
pub use query::{Query, QueryResult};
pub use reader::FileReader;
pub use registry::{EntityLookup, GtsReader, GtsStore, ListResult};
pub use uuids::{id_to_uuid, UuidResult};
pub use validate::{
    validate_instance, validate_schema, JsonSchemaValidator, SchemaValidator, ValidationResult,
};
pub use version::{Direction, GtsVersion};
pub use xref::{XGtsRefError, XGtsRefValidator};
