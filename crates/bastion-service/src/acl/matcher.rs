//! Method path matching for ACL patterns.
//!
//! Patterns and method paths are `/`-delimited and compared segment by
//! segment. A `*` segment grants the position it occupies and everything
//! below it.
//!
//! # Boundary rule
//!
//! Without a wildcard the pattern must have exactly as many segments as the
//! path: a shorter pattern is not a prefix grant. The wildcard has to be
//! reached while walking the path, so `/A/*` does not match `/A` itself.

use thiserror::Error;

/// Segment that matches the rest of a path.
pub const WILDCARD: &str = "*";

const SEPARATOR: char = '/';

/// Reasons a pattern string is rejected at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("pattern must start with '/'")]
    NotAbsolute,

    #[error("'*' must be a whole segment")]
    PartialWildcard,
}

/// An allowed-method pattern, split into segments once at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<String>,
}

impl PathPattern {
    /// Parse and validate a pattern such as `/bastion.Biz/*`.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if the pattern is empty, relative, or uses
    /// `*` inside a segment (e.g. `/bastion.Biz/Ad*`).
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }
        if !raw.starts_with(SEPARATOR) {
            return Err(PatternError::NotAbsolute);
        }

        let segments: Vec<String> = raw.split(SEPARATOR).map(str::to_string).collect();
        if segments
            .iter()
            .any(|segment| segment != WILDCARD && segment.contains(WILDCARD))
        {
            return Err(PatternError::PartialWildcard);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The pattern as written in the ACL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Does this pattern authorize `path`?
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        matches_segments(self.segments.iter().map(String::as_str), path)
    }
}

/// Does `pattern` authorize `path`? Splits the pattern on every call.
///
/// Prefer [`PathPattern::matches`] on the request path; this form exists for
/// ad-hoc checks where no validated pattern is at hand.
#[must_use]
pub fn matches(pattern: &str, path: &str) -> bool {
    matches_segments(pattern.split(SEPARATOR), path)
}

fn matches_segments<'a>(mut pattern: impl Iterator<Item = &'a str>, path: &str) -> bool {
    let mut path = path.split(SEPARATOR);
    loop {
        match (pattern.next(), path.next()) {
            (Some(WILDCARD), Some(_)) => return true,
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            // Segment mismatch, or one side ran out first
            _ => return false,
        }
    }
}
