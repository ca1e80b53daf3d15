//! GTS command line
//!
//! Identifier utilities plus registry operations over JSON files.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use gts::{
    build_schema_graph, cast, check_compatibility, get_attribute, id_to_uuid, match_id_pattern,
    parse_id, validate_id, validate_instance, validate_schema, FileReader, GtsConfig, GtsStore,
    JsonSchemaValidator, ReferenceGraph,
};

#[derive(Parser)]
#[command(name = "gts")]
#[command(about = "Work with GTS identifiers, schemas and instances")]
struct Cli {
    /// JSON file or directory to load entities from (repeatable)
    #[arg(short, long, global = true)]
    path: Vec<PathBuf>,

    /// Configuration file layered over the defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that an identifier is well formed
    ValidateId { id: String },

    /// Break an identifier into segments
    ParseId { id: String },

    /// Match a candidate identifier against a pattern
    MatchIdPattern { pattern: String, candidate: String },

    /// Print the deterministic UUID of an identifier
    Uuid { id: String },

    /// Validate an instance against its schema
    ValidateInstance { id: String },

    /// Validate a schema document
    ValidateSchema { id: String },

    /// Resolve the reference graph of an entity
    ResolveRelationships { id: String },

    /// Compare two schema versions
    Compatibility {
        /// Old schema identifier
        old: String,
        /// New schema identifier
        new: String,
    },

    /// Cast an instance to another schema version
    Cast {
        /// Instance identifier
        from: String,
        /// Target schema identifier
        to: String,
    },

    /// Run a query expression, e.g. 'gts.x.core.*[status=active]'
    Query {
        expr: String,
        /// Maximum results (0 uses the configured default)
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },

    /// Read a value with an 'id@path' selector
    Attr { selector: String },

    /// List loaded entities
    List {
        #[arg(short, long, default_value_t = 100)]
        limit: usize,
    },

    /// Report reference cycles among loaded entities
    Cycles,

    /// Print the effective configuration as TOML
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_store(paths: &[PathBuf], config: GtsConfig) -> GtsStore {
    if paths.is_empty() {
        return GtsStore::with_config(config);
    }
    let reader = FileReader::new(paths, config.clone());
    GtsStore::with_reader(Box::new(reader), config)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let config = GtsConfig::load_from(config_path.as_deref()).context("loading configuration")?;
    debug!(paths = cli.path.len(), "starting");

    let store = || load_store(&cli.path, config.clone());
    let validator = JsonSchemaValidator;

    match cli.command {
        Commands::ValidateId { id } => print_json(&validate_id(&id)),
        Commands::ParseId { id } => print_json(&parse_id(&id)),
        Commands::MatchIdPattern { pattern, candidate } => {
            print_json(&match_id_pattern(&candidate, &pattern))
        }
        Commands::Uuid { id } => print_json(&id_to_uuid(&id)),
        Commands::ValidateInstance { id } => {
            print_json(&validate_instance(&store(), &validator, &id))
        }
        Commands::ValidateSchema { id } => print_json(&validate_schema(&store(), &validator, &id)),
        Commands::ResolveRelationships { id } => print_json(&build_schema_graph(&store(), &id)),
        Commands::Compatibility { old, new } => {
            print_json(&check_compatibility(&store(), &old, &new))
        }
        Commands::Cast { from, to } => {
            let result = cast(&store(), &validator, &from, &to)
                .with_context(|| format!("casting {from} to {to}"))?;
            print_json(&result)
        }
        Commands::Query { expr, limit } => print_json(&store().query(&expr, limit)),
        Commands::Attr { selector } => print_json(&get_attribute(&store(), &selector)),
        Commands::List { limit } => print_json(&store().list(limit)),
        Commands::Cycles => print_json(&ReferenceGraph::from_store(&store()).cycles()),
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
