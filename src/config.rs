//! Configuration management for GTS tooling
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (gts.toml)
//! - Environment variables (GTS__*)
//!
//! ## Example config file (gts.toml):
//! ```toml
//! [extraction]
//! entity_id_fields = ["$id", "gtsId", "id"]
//! schema_id_fields = ["$schema", "type"]
//!
//! [registry]
//! validate_references = true
//!
//! [query]
//! default_limit = 50
//! allow_filters_on_type_patterns = false
//!
//! [reader]
//! extensions = ["json", "gts"]
//! exclude_dirs = ["node_modules", "target"]
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GtsConfig {
    /// Which document fields carry identifiers
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Registry settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Query settings
    #[serde(default)]
    pub query: QueryConfig,

    /// File reader settings
    #[serde(default)]
    pub reader: ReaderConfig,
}

/// Field names tried, in order, when resolving an entity's identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_entity_id_fields")]
    pub entity_id_fields: Vec<String>,

    #[serde(default = "default_schema_id_fields")]
    pub schema_id_fields: Vec<String>,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Reject entities whose references do not resolve, and schemas with
    /// malformed `$ref` or `x-gts-ref` values
    #[serde(default)]
    pub validate_references: bool,
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Limit applied when a query passes zero
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Accept `[k=v]` filters on patterns ending in `~` or `~*`
    #[serde(default)]
    pub allow_filters_on_type_patterns: bool,
}

/// File reader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// File extensions to load, without the dot
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Directory names never descended into
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
}

// Default value functions
fn default_entity_id_fields() -> Vec<String> {
    [
        "$id", "$$id", "gtsId", "gtsIid", "gtsOid", "gtsI", "gts_id", "gts_oid", "gts_iid", "id",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_schema_id_fields() -> Vec<String> {
    ["$schema", "$$schema", "gtsTid", "gtsT", "gts_t", "gts_tid", "type", "schema"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_limit() -> usize {
    100
}

fn default_extensions() -> Vec<String> {
    vec!["json".to_string(), "jsonc".to_string(), "gts".to_string()]
}

fn default_exclude_dirs() -> Vec<String> {
    vec![
        "node_modules".to_string(),
        "dist".to_string(),
        "build".to_string(),
    ]
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            entity_id_fields: default_entity_id_fields(),
            schema_id_fields: default_schema_id_fields(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            allow_filters_on_type_patterns: false,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
        }
    }
}

impl GtsConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["gts.toml", ".gts.toml", "config/gts.toml"];
        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "gts", "gts") {
            let xdg_config = config_dir.config_dir().join("gts.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // GTS__QUERY__DEFAULT_LIMIT=50 and friends
        builder = builder.add_source(
            Environment::with_prefix("GTS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        std::fs::write(path, self.to_toml()?)
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> std::io::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}
