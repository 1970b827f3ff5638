//! Plugin hooks and manager collaborator traits.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use flux_core::BoxError;
use serde_json::Value;

use crate::context::PluginContext;
use crate::error::PluginResult;
use crate::manifest::{PluginManifest, PluginSource};

/// Lifecycle hooks implemented by every plugin.
///
/// All hooks except [`on_load`](Self::on_load) default to no-ops. Hook errors
/// mark the plugin `Failed`; they never take the manager down.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Called once after the plugin's config is loaded. Handler registration
    /// belongs here.
    async fn on_load(&self, ctx: &PluginContext) -> Result<(), BoxError>;

    /// Called when the plugin transitions to `Running`.
    async fn on_start(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called when the plugin transitions to `Stopped`.
    async fn on_stop(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called before the plugin is removed. Its bus handlers are unregistered
    /// afterwards regardless of the outcome.
    async fn on_unload(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A plugin instance produced by a [`PluginLoader`], with its manifest.
pub struct LoadedPlugin {
    pub manifest: PluginManifest,
    pub plugin: Arc<dyn Plugin>,
}

/// Discovers plugin sources on disk.
pub trait PluginFinder: Send + Sync {
    /// Lists every discoverable source.
    fn find_sources(&self) -> PluginResult<Vec<PluginSource>>;

    /// Resolves the source covering a changed path, if any.
    fn find_by_path(&self, path: &Path) -> PluginResult<Option<PluginSource>>;
}

/// Instantiates plugins from sources.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Loads (or re-loads) the plugin behind `source`.
    async fn load_from_source(&self, source: &PluginSource) -> PluginResult<LoadedPlugin>;

    /// Releases whatever the loader holds for `module` so a subsequent load
    /// starts fresh.
    async fn unload_module(&self, module: &str) -> PluginResult<()>;
}

/// Persists per-plugin configuration documents.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Loads the config for `plugin`; an absent config is an empty object.
    async fn load(&self, plugin: &str) -> PluginResult<Value>;

    /// Persists the config for `plugin`.
    async fn save(&self, plugin: &str, config: &Value) -> PluginResult<()>;
}
