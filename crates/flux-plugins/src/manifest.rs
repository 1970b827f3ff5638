//! Plugin metadata and lifecycle state types.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::version::VersionSpec;

/// Static metadata declared by a plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    pub name: String,
    pub version: Version,
    /// Dependency name to version clause.
    #[serde(default)]
    pub dependencies: BTreeMap<String, VersionSpec>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Free-form capability tags exposed to other plugins.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl PluginManifest {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: BTreeMap::new(),
            authors: Vec::new(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_dependency(mut self, name: impl Into<String>, spec: VersionSpec) -> Self {
        self.dependencies.insert(name.into(), spec);
        self
    }
}

/// Lifecycle state of a managed plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Loaded,
    Running,
    Stopped,
    Failed,
    Unloaded,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Unloaded => "unloaded",
        };
        f.write_str(text)
    }
}

/// Current state of a plugin plus the error that put it there, if any.
#[derive(Debug, Clone)]
pub struct PluginStatus {
    pub state: PluginState,
    pub error: Option<String>,
    /// When the plugin entered the current state.
    pub since: SystemTime,
}

impl PluginStatus {
    pub(crate) fn new(state: PluginState) -> Self {
        Self {
            state,
            error: None,
            since: SystemTime::now(),
        }
    }

    pub(crate) fn failed(error: impl Into<String>) -> Self {
        Self {
            state: PluginState::Failed,
            error: Some(error.into()),
            since: SystemTime::now(),
        }
    }
}

/// Kind of artifact a plugin is loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A directory containing a manifest.
    Directory,
    /// A packaged `.zip` archive.
    Archive,
    /// A standalone manifest file.
    File,
}

/// Location a plugin can be (re)loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSource {
    pub kind: SourceKind,
    pub path: PathBuf,
    /// Module name derived from the artifact (directory or file stem).
    pub module: String,
}

impl PluginSource {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>, module: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            module: module.into(),
        }
    }

    /// Whether a filesystem change at `path` affects this source.
    pub fn covers(&self, path: &std::path::Path) -> bool {
        match self.kind {
            SourceKind::Directory => path.starts_with(&self.path),
            SourceKind::Archive | SourceKind::File => path == self.path,
        }
    }
}
