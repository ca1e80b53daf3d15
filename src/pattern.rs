//! Wildcard patterns and positional identifier matching

use serde::{Deserialize, Serialize};

use crate::error::{GtsError, Result};
use crate::id::{ConcreteSegment, GtsId, Segment, WildcardSegment, GTS_PREFIX};

/// A validated pattern: a concrete identifier or one ending in `.*` / `~*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardPattern {
    id: GtsId,
}

impl WildcardPattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        let invalid = |cause: String| GtsError::InvalidWildcard {
            pattern: pattern.to_string(),
            cause,
        };

        if !pattern.starts_with(GTS_PREFIX) {
            return Err(invalid(format!("Does not start with '{GTS_PREFIX}'")));
        }
        match pattern.matches('*').count() {
            0 => {}
            1 if pattern.ends_with(".*") || pattern.ends_with("~*") => {}
            1 => {
                return Err(invalid(
                    "The wildcard '*' token is allowed only at the end of the pattern".to_string(),
                ))
            }
            _ => {
                return Err(invalid(
                    "The wildcard '*' token is allowed only once".to_string(),
                ))
            }
        }

        let id = GtsId::parse_pattern(pattern).map_err(|err| invalid(err.to_string()))?;
        Ok(Self { id })
    }

    pub fn as_str(&self) -> &str {
        self.id.as_str()
    }

    pub fn is_wildcard(&self) -> bool {
        self.id.is_wildcard()
    }

    /// True when the pattern targets types (`...~` or `...~*`)
    pub fn is_type_pattern(&self) -> bool {
        let text = self.id.as_str();
        text.ends_with('~') || text.ends_with("~*")
    }

    pub fn segments(&self) -> &[Segment] {
        self.id.segments()
    }

    /// Positional match of `candidate` against this pattern
    pub fn matches(&self, candidate: &GtsId) -> bool {
        match_segments(self.id.segments(), candidate.segments())
    }
}

fn match_segments(pattern: &[Segment], candidate: &[Segment]) -> bool {
    if pattern.len() > candidate.len() {
        return false;
    }
    for (p, c) in pattern.iter().zip(candidate) {
        match p {
            // the wildcard is always the final pattern segment
            Segment::Wildcard(w) => return wildcard_accepts(w, c),
            Segment::Concrete(pc) => {
                if !concrete_matches(pc, c) {
                    return false;
                }
            }
        }
    }
    pattern.len() == candidate.len()
}

fn concrete_matches(p: &ConcreteSegment, c: &Segment) -> bool {
    if c.vendor() != Some(p.vendor.as_str())
        || c.package() != Some(p.package.as_str())
        || c.namespace() != Some(p.namespace.as_str())
        || c.type_name() != Some(p.type_name.as_str())
        || c.major() != Some(p.version.major)
    {
        return false;
    }
    if let Some(minor) = p.version.minor {
        if c.minor() != Some(minor) {
            return false;
        }
    }
    p.is_type == c.is_type()
}

fn wildcard_accepts(w: &WildcardSegment, c: &Segment) -> bool {
    let names = [
        (w.vendor.as_deref(), c.vendor()),
        (w.package.as_deref(), c.package()),
        (w.namespace.as_deref(), c.namespace()),
        (w.type_name.as_deref(), c.type_name()),
    ];
    for (expected, actual) in names {
        if let Some(expected) = expected {
            if actual != Some(expected) {
                return false;
            }
        }
    }
    if w.major.is_some() && w.major != c.major() {
        return false;
    }
    if w.minor.is_some() && w.minor != c.minor() {
        return false;
    }
    if w.is_type && !c.is_type() {
        return false;
    }
    true
}

/// Outcome of [`match_id_pattern`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchIdResult {
    pub candidate: String,
    pub pattern: String,
    #[serde(rename = "match")]
    pub is_match: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Match a candidate identifier against a pattern, reporting invalid input
/// in the result instead of failing. The candidate may itself be a
/// wildcard; its unset fields only satisfy unset pattern fields.
pub fn match_id_pattern(candidate: &str, pattern: &str) -> MatchIdResult {
    let outcome = WildcardPattern::parse(pattern).and_then(|pattern| {
        let candidate = if candidate.contains('*') {
            WildcardPattern::parse(candidate)?.id
        } else {
            GtsId::parse(candidate)?
        };
        Ok(pattern.matches(&candidate))
    });

    let (is_match, error) = match outcome {
        Ok(is_match) => (is_match, String::new()),
        Err(err) => (false, err.to_string()),
    };
    MatchIdResult {
        candidate: candidate.to_string(),
        pattern: pattern.to_string(),
        is_match,
        error,
    }
}
