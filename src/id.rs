//! GTS identifier grammar
//!
//! An identifier is the `gts.` prefix followed by one or more `~`-delimited
//! segments:
//!
//! ```text
//! gts.<vendor>.<package>.<namespace>.<type>.v<MAJOR>[.<MINOR>]~[<segment>...]
//! ```
//!
//! Every segment but the last is a type segment (ends with `~`). When the
//! last segment also ends with `~` the identifier names a type, otherwise it
//! names an instance of the chain before it.
//!
//! Patterns are parsed with the same grammar in a relaxed mode that accepts a
//! standalone `*` token as the final token of the final segment.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::IdError;
use crate::uuids;
use crate::version::{parse_major, parse_minor, GtsVersion};

/// Literal prefix every identifier starts with
pub const GTS_PREFIX: &str = "gts.";

/// URI form used in `$id` and `$ref` values
pub const GTS_URI_PREFIX: &str = "gts://";

/// Maximum identifier length in characters
pub const MAX_ID_LENGTH: usize = 1024;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("token regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseMode {
    Strict,
    Pattern,
}

/// A fully specified segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteSegment {
    /// 1-based position in the chain
    pub num: usize,
    /// Character offset of the segment in the identifier
    pub offset: usize,
    /// Segment text, including the trailing `~` for type segments
    pub raw: String,
    pub vendor: String,
    pub package: String,
    pub namespace: String,
    pub type_name: String,
    pub version: GtsVersion,
    pub is_type: bool,
}

/// A segment truncated by a `*` token; only the fields before it are set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WildcardSegment {
    pub num: usize,
    pub offset: usize,
    pub raw: String,
    pub vendor: Option<String>,
    pub package: Option<String>,
    pub namespace: Option<String>,
    pub type_name: Option<String>,
    pub major: Option<u32>,
    pub minor: Option<u32>,
    pub is_type: bool,
}

/// One `~`-delimited unit of an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Concrete(ConcreteSegment),
    Wildcard(WildcardSegment),
}

impl Segment {
    pub fn num(&self) -> usize {
        match self {
            Segment::Concrete(s) => s.num,
            Segment::Wildcard(s) => s.num,
        }
    }

    pub fn offset(&self) -> usize {
        match self {
            Segment::Concrete(s) => s.offset,
            Segment::Wildcard(s) => s.offset,
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Segment::Concrete(s) => &s.raw,
            Segment::Wildcard(s) => &s.raw,
        }
    }

    pub fn is_type(&self) -> bool {
        match self {
            Segment::Concrete(s) => s.is_type,
            Segment::Wildcard(s) => s.is_type,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Segment::Wildcard(_))
    }

    pub fn vendor(&self) -> Option<&str> {
        match self {
            Segment::Concrete(s) => Some(&s.vendor),
            Segment::Wildcard(s) => s.vendor.as_deref(),
        }
    }

    pub fn package(&self) -> Option<&str> {
        match self {
            Segment::Concrete(s) => Some(&s.package),
            Segment::Wildcard(s) => s.package.as_deref(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Segment::Concrete(s) => Some(&s.namespace),
            Segment::Wildcard(s) => s.namespace.as_deref(),
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            Segment::Concrete(s) => Some(&s.type_name),
            Segment::Wildcard(s) => s.type_name.as_deref(),
        }
    }

    pub fn major(&self) -> Option<u32> {
        match self {
            Segment::Concrete(s) => Some(s.version.major),
            Segment::Wildcard(s) => s.major,
        }
    }

    pub fn minor(&self) -> Option<u32> {
        match self {
            Segment::Concrete(s) => s.version.minor,
            Segment::Wildcard(s) => s.minor,
        }
    }
}

/// A parsed GTS identifier (or, via [`GtsId::parse_pattern`], a pattern)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GtsId {
    id: String,
    segments: Vec<Segment>,
}

impl GtsId {
    /// Parse a concrete identifier; wildcards are rejected
    pub fn parse(id: &str) -> Result<Self, IdError> {
        parse_with(id, ParseMode::Strict)
    }

    /// Parse the pattern side of a match: a trailing `*` token is accepted
    /// and a single bare instance segment is allowed
    pub fn parse_pattern(pattern: &str) -> Result<Self, IdError> {
        parse_with(pattern, ParseMode::Pattern)
    }

    /// The normalized identifier text
    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn last_segment(&self) -> &Segment {
        // parse never yields an empty segment list
        &self.segments[self.segments.len() - 1]
    }

    /// True when the identifier names a type (ends with `~`)
    pub fn is_type(&self) -> bool {
        self.id.ends_with('~')
    }

    pub fn is_wildcard(&self) -> bool {
        self.segments.iter().any(Segment::is_wildcard)
    }

    /// Identifier of the type an instance chain belongs to
    pub fn schema_id(&self) -> Option<&str> {
        if self.is_type() {
            return None;
        }
        self.id.rfind('~').map(|pos| &self.id[..=pos])
    }

    /// Deterministic v5 UUID for this identifier
    pub fn to_uuid(&self) -> Uuid {
        uuids::uuid_for(&self.id)
    }

    /// Rebuild the identifier text from its segments
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.id.len());
        out.push_str(GTS_PREFIX);
        for segment in &self.segments {
            out.push_str(segment.raw());
        }
        out
    }
}

impl fmt::Display for GtsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl FromStr for GtsId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GtsId::parse(s)
    }
}

impl TryFrom<String> for GtsId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        GtsId::parse(&value)
    }
}

impl From<GtsId> for String {
    fn from(id: GtsId) -> Self {
        id.id
    }
}

impl AsRef<str> for GtsId {
    fn as_ref(&self) -> &str {
        &self.id
    }
}

/// True when `s` parses as a concrete identifier
pub fn is_valid_gts_id(s: &str) -> bool {
    GtsId::parse(s).is_ok()
}

fn parse_with(raw: &str, mode: ParseMode) -> Result<GtsId, IdError> {
    let id = raw.trim();

    if id.to_lowercase() != id {
        return Err(IdError::invalid(id, "Must be lower case"));
    }
    if id.contains('-') {
        return Err(IdError::invalid(id, "Must not contain '-'"));
    }
    let Some(rest) = id.strip_prefix(GTS_PREFIX) else {
        return Err(IdError::invalid(id, format!("Does not start with '{GTS_PREFIX}'")));
    };
    if id.chars().count() > MAX_ID_LENGTH {
        return Err(IdError::invalid(id, "Too long"));
    }

    let mut segments = Vec::new();
    let mut offset = GTS_PREFIX.len();
    for (idx, part) in split_segments(rest).into_iter().enumerate() {
        if part.is_empty() {
            return Err(IdError::invalid(
                id,
                format!("GTS segment #{} @ offset {} is empty", idx + 1, offset),
            ));
        }
        segments.push(parse_segment(idx + 1, offset, part, mode)?);
        offset += part.len();
    }

    if let Some(pos) = segments.iter().position(Segment::is_wildcard) {
        if pos + 1 != segments.len() {
            return Err(IdError::invalid(
                id,
                "The wildcard '*' token is allowed only at the end of the pattern",
            ));
        }
    }

    if mode == ParseMode::Strict && segments.len() == 1 && !segments[0].is_type() {
        return Err(IdError::invalid(
            id,
            "Single-segment instance identifiers are not allowed; instances must be chained to a type",
        ));
    }

    Ok(GtsId {
        id: id.to_string(),
        segments,
    })
}

/// Split on `~`, keeping the `~` on every piece it terminates. A trailing
/// `~` produces no empty final piece.
fn split_segments(rest: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (pos, _) in rest.match_indices('~') {
        parts.push(&rest[start..=pos]);
        start = pos + 1;
    }
    if start < rest.len() || parts.is_empty() {
        parts.push(&rest[start..]);
    }
    parts
}

fn parse_segment(num: usize, offset: usize, raw: &str, mode: ParseMode) -> Result<Segment, IdError> {
    let fail = |cause: &str| IdError::Segment {
        num,
        offset,
        segment: raw.to_string(),
        cause: cause.to_string(),
    };

    let (body, is_type) = match raw.matches('~').count() {
        0 => (raw, false),
        1 if raw.ends_with('~') => (&raw[..raw.len() - 1], true),
        1 => return Err(fail("'~' must be at the end")),
        _ => return Err(fail("Too many '~' characters")),
    };

    let tokens: Vec<&str> = body.split('.').collect();
    if tokens.len() > 6 {
        return Err(fail("Too many tokens"));
    }

    let wildcard_terminated = body.ends_with('*');
    if wildcard_terminated && mode == ParseMode::Strict {
        return Err(fail("The wildcard '*' token is allowed only in patterns"));
    }
    if !wildcard_terminated && tokens.len() < 5 {
        return Err(fail("Too few tokens"));
    }

    let mut names: Vec<String> = Vec::with_capacity(4);
    let mut major = None;
    let mut minor = None;

    for (idx, token) in tokens.iter().enumerate() {
        if *token == "*" {
            if idx + 1 != tokens.len() {
                return Err(fail("The wildcard '*' token is allowed only at the end of the pattern"));
            }
            let mut names = names.into_iter();
            return Ok(Segment::Wildcard(WildcardSegment {
                num,
                offset,
                raw: raw.to_string(),
                vendor: names.next(),
                package: names.next(),
                namespace: names.next(),
                type_name: names.next(),
                major,
                minor,
                is_type,
            }));
        }
        match idx {
            0..=3 => {
                if !TOKEN_RE.is_match(token) {
                    return Err(fail(&format!("Invalid segment token: {token}")));
                }
                names.push(token.to_string());
            }
            4 => major = Some(parse_major(token).map_err(fail)?),
            _ => minor = Some(parse_minor(token).map_err(fail)?),
        }
    }

    // a trailing '*' glued to another token never forms a wildcard
    let (Some(major), true) = (major, names.len() == 4) else {
        return Err(fail("Too few tokens"));
    };
    let mut names = names.into_iter();
    let mut next = || names.next().unwrap_or_default();
    Ok(Segment::Concrete(ConcreteSegment {
        num,
        offset,
        raw: raw.to_string(),
        vendor: next(),
        package: next(),
        namespace: next(),
        type_name: next(),
        version: GtsVersion::new(major, minor),
        is_type,
    }))
}

// ========== Result-value operations ==========

/// Flattened view of a segment for reporting
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver_major: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ver_minor: Option<u32>,
    pub is_type: bool,
    pub is_wildcard: bool,
}

impl From<&Segment> for SegmentInfo {
    fn from(segment: &Segment) -> Self {
        Self {
            vendor: segment.vendor().map(str::to_string),
            package: segment.package().map(str::to_string),
            namespace: segment.namespace().map(str::to_string),
            type_name: segment.type_name().map(str::to_string),
            ver_major: segment.major(),
            ver_minor: segment.minor(),
            is_type: segment.is_type(),
            is_wildcard: segment.is_wildcard(),
        }
    }
}

/// Outcome of [`parse_id`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseIdResult {
    pub id: String,
    pub ok: bool,
    pub segments: Vec<SegmentInfo>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Outcome of [`validate_id`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdValidationResult {
    pub id: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Parse an identifier into its segment components
pub fn parse_id(id: &str) -> ParseIdResult {
    match GtsId::parse(id) {
        Ok(parsed) => ParseIdResult {
            id: id.to_string(),
            ok: true,
            segments: parsed.segments().iter().map(SegmentInfo::from).collect(),
            error: String::new(),
        },
        Err(err) => ParseIdResult {
            id: id.to_string(),
            ok: false,
            segments: Vec::new(),
            error: err.to_string(),
        },
    }
}

/// Check an identifier against the grammar
pub fn validate_id(id: &str) -> IdValidationResult {
    match GtsId::parse(id) {
        Ok(_) => IdValidationResult {
            id: id.to_string(),
            valid: true,
            error: String::new(),
        },
        Err(err) => IdValidationResult {
            id: id.to_string(),
            valid: false,
            error: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_identifier() {
        let id = GtsId::parse("gts.x.core.events.event.v1~").unwrap();
        assert!(id.is_type());
        assert_eq!(id.segments().len(), 1);

        let Segment::Concrete(seg) = &id.segments()[0] else {
            panic!("expected concrete segment");
        };
        assert_eq!(seg.vendor, "x");
        assert_eq!(seg.package, "core");
        assert_eq!(seg.namespace, "events");
        assert_eq!(seg.type_name, "event");
        assert_eq!(seg.version, GtsVersion::new(1, None));
        assert!(seg.is_type);
    }

    #[test]
    fn test_parse_chained_instance() {
        let id = GtsId::parse("gts.x.core.events.type.v1~vendor.app._.custom_event.v1.2").unwrap();
        assert!(!id.is_type());
        assert_eq!(id.segments().len(), 2);
        assert_eq!(id.segments()[1].offset(), 26);
        assert_eq!(id.segments()[1].minor(), Some(2));
        assert_eq!(id.schema_id(), Some("gts.x.core.events.type.v1~"));
    }

    #[test]
    fn test_render_round_trips() {
        for text in [
            "gts.x.core.events.type.v1~",
            "gts.x.core.events.type.v1.0~a.b.c.d.v2~",
            "gts.x.core.events.type.v1~a.b._.d.v0.3",
        ] {
            let id = GtsId::parse(text).unwrap();
            assert_eq!(id.render(), text);
            assert_eq!(id.as_str(), text);
        }
    }

    #[test]
    fn test_trims_whitespace() {
        let id = GtsId::parse("  gts.x.core.events.type.v1~ ").unwrap();
        assert_eq!(id.as_str(), "gts.x.core.events.type.v1~");
    }

    #[test]
    fn test_identifier_level_errors() {
        let cases = [
            ("gts.X.core.events.type.v1~", "Must be lower case"),
            ("gts.x-y.core.events.type.v1~", "Must not contain '-'"),
            ("x.core.events.type.v1~", "Does not start with 'gts.'"),
        ];
        for (input, cause) in cases {
            let err = GtsId::parse(input).unwrap_err();
            assert_eq!(err.cause(), cause, "input {input}");
            assert!(matches!(err, IdError::Invalid { .. }));
        }

        let long = format!("gts.x.core.events.{}.v1~", "a".repeat(1100));
        assert_eq!(GtsId::parse(&long).unwrap_err().cause(), "Too long");
    }

    #[test]
    fn test_segment_level_errors() {
        let cases = [
            ("gts.vendor.pkg.v1~", "Too few tokens"),
            ("gts.a.b.c.d.v1.2.3~", "Too many tokens"),
            ("gts.x.core.events.type.1~", "Major version must start with 'v'"),
            ("gts.x.core.events.type.vx~", "Major version must be an integer"),
            ("gts.x.core.events.type.v01~", "Major version must be an integer"),
            ("gts.x.core.events.type.v1.01~", "Minor version must be an integer"),
            ("gts.x.core.events.9type.v1~", "Invalid segment token: 9type"),
        ];
        for (input, cause) in cases {
            let err = GtsId::parse(input).unwrap_err();
            assert_eq!(err.cause(), cause, "input {input}");
        }
    }

    #[test]
    fn test_segment_error_location() {
        let err = GtsId::parse("gts.x.core.events.type.v1~abc").unwrap_err();
        match err {
            IdError::Segment { num, offset, segment, cause } => {
                assert_eq!(num, 2);
                assert_eq!(offset, 26);
                assert_eq!(segment, "abc");
                assert_eq!(cause, "Too few tokens");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_double_tilde_is_invalid() {
        assert!(GtsId::parse("gts.x.core.events.type.v1~~").is_err());
    }

    #[test]
    fn test_single_segment_instance_rejected() {
        let err = GtsId::parse("gts.x.pkg.ns.type.v2.5").unwrap_err();
        assert!(err.cause().starts_with("Single-segment instance"));
        assert!(GtsId::parse_pattern("gts.x.pkg.ns.type.v2.5").is_ok());
    }

    #[test]
    fn test_wildcards_only_in_patterns() {
        assert!(GtsId::parse("gts.x.core.*").is_err());

        let pattern = GtsId::parse_pattern("gts.x.core.*").unwrap();
        assert!(pattern.is_wildcard());
        let Segment::Wildcard(seg) = &pattern.segments()[0] else {
            panic!("expected wildcard segment");
        };
        assert_eq!(seg.vendor.as_deref(), Some("x"));
        assert_eq!(seg.package.as_deref(), Some("core"));
        assert_eq!(seg.namespace, None);
        assert_eq!(seg.major, None);

        let pattern = GtsId::parse_pattern("gts.x.core.events.type.v1~*").unwrap();
        assert_eq!(pattern.segments().len(), 2);
        assert!(pattern.segments()[1].is_wildcard());
    }

    #[test]
    fn test_wildcard_must_be_last() {
        assert!(GtsId::parse_pattern("gts.x.*.events.type.v1~").is_err());
        assert!(GtsId::parse_pattern("gts.x.core.*~a.b.c.d.v1").is_err());
        assert!(GtsId::parse_pattern("gts.x.core.ev*").is_err());
    }

    #[test]
    fn test_parse_id_result() {
        let result = parse_id("gts.x.core.events.type.v1.2~");
        assert!(result.ok);
        assert_eq!(result.segments[0].ver_minor, Some(2));
        assert!(result.error.is_empty());

        let result = parse_id("gts.x.core");
        assert!(!result.ok);
        assert!(result.error.contains("Too few tokens"));
    }

    #[test]
    fn test_serde_as_string() {
        let id = GtsId::parse("gts.x.core.events.type.v1~").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"gts.x.core.events.type.v1~\"");
        let back: GtsId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<GtsId>("\"gts.bad\"").is_err());
    }
}
