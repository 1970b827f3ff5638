//! Event name patterns.
//!
//! A pattern is either an exact string compared for equality against
//! `event.name`, or a compiled regex that must match the *whole* name.
//! The textual form `re:<expr>` selects regex mode.

use std::fmt;

use regex::Regex;

use crate::error::{BusError, BusResult};

/// Prefix marking a textual pattern as a regular expression.
const REGEX_PREFIX: &str = "re:";

/// A handler subscription pattern.
#[derive(Debug, Clone)]
pub enum EventPattern {
    /// Matches iff the event name equals the string.
    Exact(String),
    /// Matches iff the regex matches the full event name.
    Regex {
        /// The expression as written (without anchors).
        source: String,
        /// Compiled, anchored regex.
        regex: Regex,
    },
}

impl EventPattern {
    /// Creates an exact-match pattern.
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    /// Compiles a regex pattern.
    ///
    /// The expression is anchored so it must match the entire event name.
    pub fn regex(expr: &str) -> BusResult<Self> {
        let anchored = format!("^(?:{expr})$");
        let regex = Regex::new(&anchored).map_err(|e| BusError::InvalidPattern {
            pattern: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::Regex {
            source: expr.to_string(),
            regex,
        })
    }

    /// Parses a textual pattern, honouring the `re:` prefix convention.
    ///
    /// Unlike a plain string comparison, an invalid `re:` expression is an
    /// error rather than a silent fallback to exact matching.
    pub fn parse(text: &str) -> BusResult<Self> {
        match text.strip_prefix(REGEX_PREFIX) {
            Some(expr) => Self::regex(expr),
            None => Ok(Self::exact(text)),
        }
    }

    /// Checks whether the pattern matches the given event name.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == name,
            Self::Regex { regex, .. } => regex.is_match(name),
        }
    }

    /// Whether this is a regex pattern.
    pub fn is_regex(&self) -> bool {
        matches!(self, Self::Regex { .. })
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => f.write_str(name),
            Self::Regex { source, .. } => write!(f, "{REGEX_PREFIX}{source}"),
        }
    }
}

impl From<&str> for EventPattern {
    fn from(name: &str) -> Self {
        Self::exact(name)
    }
}

impl From<String> for EventPattern {
    fn from(name: String) -> Self {
        Self::Exact(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches_only_equal_names() {
        let pattern = EventPattern::exact("message.group");
        assert!(pattern.matches("message.group"));
        assert!(!pattern.matches("message.group.x"));
        assert!(!pattern.matches("message"));
    }

    #[test]
    fn regex_requires_full_match() {
        let pattern = EventPattern::regex(r"message\..+").unwrap();
        assert!(pattern.matches("message.group"));
        assert!(pattern.matches("message.private"));
        assert!(!pattern.matches("message."));
        assert!(!pattern.matches("xmessage.group"));
        assert!(!pattern.matches("message.group "));
    }

    #[test]
    fn parse_honours_prefix() {
        assert!(!EventPattern::parse("re:a.b").unwrap().matches("re:a.b"));
        assert!(EventPattern::parse("re:a.b").unwrap().matches("axb"));
        assert!(EventPattern::parse("a.b").unwrap().matches("a.b"));
        assert!(!EventPattern::parse("a.b").unwrap().matches("axb"));
    }

    #[test]
    fn invalid_regex_is_an_error() {
        let err = EventPattern::parse("re:(").unwrap_err();
        assert!(matches!(err, BusError::InvalidPattern { .. }));
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(EventPattern::exact("a.b").to_string(), "a.b");
        assert_eq!(EventPattern::regex("a.+").unwrap().to_string(), "re:a.+");
    }
}
