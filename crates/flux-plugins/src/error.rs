//! Plugin subsystem error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by plugin discovery, resolution and lifecycle operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A plugin depends on a plugin that is not part of the batch.
    #[error("plugin '{plugin}' depends on '{dependency}', which is not available")]
    MissingDependency {
        plugin: String,
        dependency: String,
    },

    /// A dependency is present but its version does not satisfy the clause.
    #[error(
        "plugin '{plugin}' requires '{dependency}' {required}, found {found}"
    )]
    VersionMismatch {
        plugin: String,
        dependency: String,
        required: String,
        found: String,
    },

    /// The dependency graph contains a cycle through the named plugin.
    #[error("dependency cycle involving plugin '{plugin}'")]
    DependencyCycle { plugin: String },

    /// Operation referenced a plugin the manager does not know.
    #[error("no plugin named '{plugin}'")]
    NotFound { plugin: String },

    /// The manager has been closed.
    #[error("plugin manager is closed")]
    Closed,

    /// A version clause could not be parsed.
    #[error("invalid version spec '{spec}': {reason}")]
    InvalidVersionSpec { spec: String, reason: String },

    /// A manifest file was unreadable or malformed.
    #[error("invalid manifest at {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    /// A lifecycle hook failed.
    #[error("plugin '{plugin}' failed during {operation}: {message}")]
    Runtime {
        plugin: String,
        operation: String,
        message: String,
    },

    /// Filesystem access failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The filesystem watcher could not be set up.
    #[error(transparent)]
    Watch(#[from] notify::Error),
}

impl PluginError {
    /// Wraps a hook error with its plugin and operation.
    pub(crate) fn runtime(
        plugin: &str,
        operation: &str,
        error: impl std::fmt::Display,
    ) -> Self {
        Self::Runtime {
            plugin: plugin.to_owned(),
            operation: operation.to_owned(),
            message: error.to_string(),
        }
    }
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
