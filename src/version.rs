//! Segment version utilities

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The `vMAJOR[.MINOR]` version carried by an identifier segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GtsVersion {
    /// Major version (token five, `v` prefixed)
    pub major: u32,
    /// Minor version (token six), absent when the segment omits it
    pub minor: Option<u32>,
}

impl GtsVersion {
    pub fn new(major: u32, minor: Option<u32>) -> Self {
        Self { major, minor }
    }

    /// Parse a version written as `v1` or `v1.2`
    pub fn parse(text: &str) -> Result<Self, &'static str> {
        let (major, minor) = match text.split_once('.') {
            Some((major, minor)) => (major, Some(minor)),
            None => (text, None),
        };
        Ok(Self {
            major: parse_major(major)?,
            minor: minor.map(parse_minor).transpose()?,
        })
    }

    /// Direction of a move from `self` to `other`, judged by minor versions only
    pub fn direction_to(&self, other: &GtsVersion) -> Direction {
        match (self.minor, other.minor) {
            (Some(from), Some(to)) => match to.cmp(&from) {
                Ordering::Greater => Direction::Up,
                Ordering::Less => Direction::Down,
                Ordering::Equal => Direction::None,
            },
            _ => Direction::Unknown,
        }
    }
}

impl fmt::Display for GtsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.minor {
            Some(minor) => write!(f, "v{}.{}", self.major, minor),
            None => write!(f, "v{}", self.major),
        }
    }
}

/// Relation between two identifiers' minor versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    None,
    #[default]
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::None => "none",
            Direction::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Parse the major version token (`v` followed by digits, no leading zero)
pub fn parse_major(token: &str) -> Result<u32, &'static str> {
    let digits = token
        .strip_prefix('v')
        .ok_or("Major version must start with 'v'")?;
    parse_number(digits).ok_or("Major version must be an integer")
}

/// Parse the minor version token (digits, no leading zero)
pub fn parse_minor(token: &str) -> Result<u32, &'static str> {
    parse_number(token).ok_or("Minor version must be an integer")
}

fn parse_number(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}
