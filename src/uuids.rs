//! Deterministic UUIDs for GTS identifiers

use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

use crate::id::GtsId;

/// UUIDv5 namespace for GTS: v5 of the URL namespace and the bytes `gts`
pub static GTS_NAMESPACE: LazyLock<Uuid> =
    LazyLock::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"gts"));

/// v5 UUID of the identifier text within [`GTS_NAMESPACE`]
pub fn uuid_for(id: &str) -> Uuid {
    Uuid::new_v5(&GTS_NAMESPACE, id.as_bytes())
}

/// Outcome of [`id_to_uuid`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UuidResult {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Derive the UUID for an identifier, validating it first
pub fn id_to_uuid(id: &str) -> UuidResult {
    match GtsId::parse(id) {
        Ok(parsed) => UuidResult {
            id: parsed.as_str().to_string(),
            uuid: parsed.to_uuid().to_string(),
            error: String::new(),
        },
        Err(err) => UuidResult {
            id: id.to_string(),
            uuid: String::new(),
            error: err.to_string(),
        },
    }
}
