//! Compiled path templates shared by the public-route table and the policy table.
//!
//! A template is a `/`-separated list of segments:
//! - a literal (`cars`), compared byte for byte;
//! - a parameter (`{id}` or `*`), matching exactly one segment;
//! - a trailing catch-all (`{*rest}`), matching one or more segments.
//!
//! Matching always consumes whole segments, so `/v1/cars/{id}` never matches
//! `/v1/cars/{id}/review_count_increment`.

use std::{cmp::Ordering, fmt, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("path must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("empty segment in path: {0}")]
    EmptySegment(String),
    #[error("catch-all segment must be last: {0}")]
    CatchAllNotLast(String),
    #[error("invalid segment '{segment}' in {template}")]
    InvalidSegment { template: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Param,
    CatchAll,
}

impl Segment {
    fn rank(&self) -> u8 {
        match self {
            Segment::Literal(_) => 2,
            Segment::Param => 1,
            Segment::CatchAll => 0,
        }
    }
}

/// Splits a request path into its segments.
///
/// A single trailing slash is ignored; empty inner segments (`//`) are rejected so
/// that two spellings of the same resource cannot be classified differently.
pub fn split_path(path: &str) -> Result<Vec<&str>, TemplateError> {
    let rest = path
        .strip_prefix('/')
        .ok_or_else(|| TemplateError::MissingLeadingSlash(path.to_string()))?;
    let rest = rest.strip_suffix('/').unwrap_or(rest);
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = rest.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(TemplateError::EmptySegment(path.to_string()));
    }
    Ok(segments)
}

/// PathTemplate
///
/// A parsed path pattern. Two templates that differ only in parameter names have the
/// same shape and compare equal.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &[&str]) -> bool {
        let mut idx = 0;
        for segment in &self.segments {
            match segment {
                Segment::CatchAll => return idx < path.len(),
                Segment::Param => {
                    if idx >= path.len() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if path.get(idx) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
            idx += 1;
        }
        idx == path.len()
    }

    /// Same literals in the same positions, parameter names ignored.
    pub fn same_shape(&self, other: &PathTemplate) -> bool {
        self.segments == other.segments
    }

    /// Orders templates from least to most specific: segment by segment, left to
    /// right, a literal outranks a parameter which outranks a catch-all.
    pub fn specificity_cmp(&self, other: &PathTemplate) -> Ordering {
        let lhs = self.segments.iter().map(Segment::rank);
        let rhs = other.segments.iter().map(Segment::rank);
        lhs.cmp(rhs)
    }
}

impl PartialEq for PathTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.same_shape(other)
    }
}

impl Eq for PathTemplate {}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PathTemplate {
    type Err = TemplateError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let parts = split_path(raw)?;
        let mut segments = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            let segment = parse_segment(raw, part)?;
            if segment == Segment::CatchAll && idx + 1 != parts.len() {
                return Err(TemplateError::CatchAllNotLast(raw.to_string()));
            }
            segments.push(segment);
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }
}

fn parse_segment(template: &str, part: &str) -> Result<Segment, TemplateError> {
    let invalid = || TemplateError::InvalidSegment {
        template: template.to_string(),
        segment: part.to_string(),
    };

    if part == "*" {
        return Ok(Segment::Param);
    }
    if let Some(inner) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
        let (catch_all, name) = match inner.strip_prefix('*') {
            Some(name) => (true, name),
            None => (false, inner),
        };
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(invalid());
        }
        return Ok(if catch_all {
            Segment::CatchAll
        } else {
            Segment::Param
        });
    }
    if part.contains(['{', '}', '*']) {
        return Err(invalid());
    }
    Ok(Segment::Literal(part.to_string()))
}
