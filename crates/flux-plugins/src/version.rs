//! Dependency version clauses.

use std::fmt;

use semver::{Version, VersionReq};
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::error::{PluginError, PluginResult};

/// A version requirement attached to a plugin dependency.
///
/// Accepts the usual comparator syntax (`">=1.2, <2"`, `"^0.3"`). A bare
/// version such as `"1.2.3"` is treated as an exact pin, and the `==` prefix
/// is accepted as an alias for `=`.
#[derive(Debug, Clone)]
pub struct VersionSpec {
    raw: String,
    req: VersionReq,
}

impl VersionSpec {
    /// Parses a version clause.
    pub fn parse(spec: &str) -> PluginResult<Self> {
        let trimmed = spec.trim();
        let normalized = if trimmed.starts_with("==") {
            format!("={}", &trimmed[2..])
        } else if trimmed.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            format!("={trimmed}")
        } else {
            trimmed.to_owned()
        };

        let req = VersionReq::parse(&normalized).map_err(|e| PluginError::InvalidVersionSpec {
            spec: spec.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            raw: trimmed.to_owned(),
            req,
        })
    }

    /// A clause matched by every version.
    pub fn any() -> Self {
        Self {
            raw: "*".to_owned(),
            req: VersionReq::STAR,
        }
    }

    /// Whether `version` satisfies this clause.
    pub fn matches(&self, version: &Version) -> bool {
        self.req.matches(version)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for VersionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[test]
    fn bare_version_is_an_exact_pin() {
        let spec = VersionSpec::parse("1.2.3").unwrap();
        assert!(spec.matches(&version("1.2.3")));
        assert!(!spec.matches(&version("1.2.4")));
        assert!(!spec.matches(&version("1.3.0")));
    }

    #[test]
    fn double_equals_is_accepted() {
        let spec = VersionSpec::parse("==2.0.0").unwrap();
        assert!(spec.matches(&version("2.0.0")));
        assert!(!spec.matches(&version("2.0.1")));
    }

    #[test]
    fn range_clauses_work() {
        let spec = VersionSpec::parse(">=1.2, <2").unwrap();
        assert!(spec.matches(&version("1.2.0")));
        assert!(spec.matches(&version("1.9.9")));
        assert!(!spec.matches(&version("2.0.0")));
        assert!(!spec.matches(&version("1.1.0")));
    }

    #[test]
    fn invalid_clause_is_an_error() {
        assert!(matches!(
            VersionSpec::parse("not a version"),
            Err(PluginError::InvalidVersionSpec { .. })
        ));
    }
}
