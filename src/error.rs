//! Error types for GTS identifiers and the entity registry

use thiserror::Error;

/// Result type for GTS operations
pub type Result<T> = std::result::Result<T, GtsError>;

/// Grammar errors raised while parsing an identifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier as a whole is malformed
    #[error("Invalid GTS identifier: {id}: {cause}")]
    Invalid { id: String, cause: String },

    /// A single `~`-delimited segment is malformed
    #[error("Invalid GTS segment #{num} @ offset {offset}: '{segment}': {cause}")]
    Segment {
        num: usize,
        offset: usize,
        segment: String,
        cause: String,
    },
}

impl IdError {
    pub(crate) fn invalid(id: &str, cause: impl Into<String>) -> Self {
        IdError::Invalid {
            id: id.to_string(),
            cause: cause.into(),
        }
    }

    /// The underlying cause without the identifier/segment prefix
    pub fn cause(&self) -> &str {
        match self {
            IdError::Invalid { cause, .. } | IdError::Segment { cause, .. } => cause,
        }
    }
}

/// GTS registry and engine errors
#[derive(Error, Debug)]
pub enum GtsError {
    #[error(transparent)]
    InvalidId(#[from] IdError),

    #[error("Invalid GTS wildcard pattern: {pattern}: {cause}")]
    InvalidWildcard { pattern: String, cause: String },

    #[error("JSON object with GTS ID '{0}' not found in store")]
    EntityNotFound(String),

    #[error("JSON schema with GTS ID '{0}' not found in store")]
    SchemaNotFound(String),

    #[error("Entity '{0}' is not a JSON schema")]
    NotASchema(String),

    #[error("Can't determine JSON schema ID for instance with GTS ID '{0}'")]
    SchemaUndeterminable(String),

    #[error("Cannot cast from schema ID '{0}'. The from_id must be an instance (not ending with '~').")]
    CastFromSchemaDisallowed(String),

    #[error("Entity must have a valid GTS ID")]
    MissingId,

    #[error("Reference validation failed: {0}")]
    ReferenceValidation(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}
