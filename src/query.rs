//! Query expressions over the registry
//!
//! `<pattern>[key=value, other="quoted", present=*]`. The pattern is either a
//! complete identifier or a wildcard pattern ending in `.*` / `~*`. Filters
//! compare top-level content fields; `*` only requires a non-empty value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::QueryConfig;
use crate::id::GtsId;
use crate::pattern::WildcardPattern;
use crate::registry::GtsStore;

/// Outcome of [`GtsStore::query`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub count: usize,
    pub limit: usize,
    pub results: Vec<Value>,
}

/// A parsed query expression
#[derive(Debug, Clone)]
pub struct Query {
    pattern: WildcardPattern,
    filters: BTreeMap<String, String>,
}

impl Query {
    /// Parse an expression; errors are prefixed with `Invalid query:`
    pub fn parse(expr: &str, config: &QueryConfig) -> Result<Self, String> {
        let (base, filter_text) = match expr.split_once('[') {
            Some((base, rest)) => {
                let rest = rest.trim();
                let Some(inner) = rest.strip_suffix(']') else {
                    return Err("Invalid query: missing closing bracket ']'".to_string());
                };
                (base.trim(), Some(inner))
            }
            None => (expr.trim(), None),
        };

        if filter_text.is_some()
            && !config.allow_filters_on_type_patterns
            && (base.ends_with('~') || base.ends_with("~*"))
        {
            return Err(
                "Invalid query: filters cannot be used with type patterns (ending with ~ or ~*)"
                    .to_string(),
            );
        }

        let pattern = if base.contains('*') {
            if !base.ends_with(".*") && !base.ends_with("~*") {
                return Err("Invalid query: wildcard patterns must end with .* or ~*".to_string());
            }
            WildcardPattern::parse(base).map_err(|e| format!("Invalid query: {e}"))?
        } else {
            GtsId::parse(base).map_err(|e| format!("Invalid query: {e}"))?;
            WildcardPattern::parse(base).map_err(|e| format!("Invalid query: {e}"))?
        };

        Ok(Self {
            pattern,
            filters: filter_text.map(parse_filters).unwrap_or_default(),
        })
    }

    pub fn pattern(&self) -> &WildcardPattern {
        &self.pattern
    }

    pub fn filters(&self) -> &BTreeMap<String, String> {
        &self.filters
    }

    /// Identifier match plus every filter
    pub fn matches(&self, id: &GtsId, content: &Value) -> bool {
        self.pattern.matches(id) && self.filters_match(content)
    }

    fn filters_match(&self, content: &Value) -> bool {
        self.filters.iter().all(|(key, expected)| {
            let actual = content.get(key).and_then(filter_text);
            match (expected.as_str(), actual) {
                ("*", Some(actual)) => !actual.is_empty(),
                (expected, Some(actual)) => actual == expected,
                (_, None) => false,
            }
        })
    }
}

fn parse_filters(text: &str) -> BTreeMap<String, String> {
    text.split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

/// Content value as filter text; strings compare unquoted
fn filter_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl GtsStore {
    /// Run a query expression; a zero limit falls back to the configured default
    pub fn query(&self, expr: &str, limit: usize) -> QueryResult {
        let limit = if limit == 0 {
            self.config().query.default_limit
        } else {
            limit
        };

        let query = match Query::parse(expr, &self.config().query) {
            Ok(query) => query,
            Err(error) => {
                debug!(expr, %error, "rejected query");
                return QueryResult {
                    error: Some(error),
                    limit,
                    ..Default::default()
                };
            }
        };

        let results: Vec<Value> = self
            .items()
            .filter_map(|(_, entity)| {
                let id = entity.gts_id()?;
                let content = entity.content();
                let has_content = content.as_object().is_some_and(|o| !o.is_empty());
                (has_content && query.matches(id, content)).then(|| content.clone())
            })
            .take(limit)
            .collect();

        debug!(expr, matched = results.len(), limit, "executed query");
        QueryResult {
            error: None,
            count: results.len(),
            limit,
            results,
        }
    }
}
