//! JSON-file config persistence.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::traits::ConfigStore;

/// Stores each plugin's config as `<dir>/<plugin>.json`.
pub struct JsonConfigStore {
    dir: PathBuf,
}

impl JsonConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, plugin: &str) -> PathBuf {
        self.dir.join(format!("{plugin}.json"))
    }
}

#[async_trait]
impl ConfigStore for JsonConfigStore {
    async fn load(&self, plugin: &str) -> PluginResult<Value> {
        let path = self.path_for(plugin);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(plugin = %plugin, "No stored config, starting empty");
                return Ok(Value::Object(Default::default()));
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|e| PluginError::InvalidManifest {
            path,
            message: e.to_string(),
        })
    }

    async fn save(&self, plugin: &str, config: &Value) -> PluginResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let bytes = serde_json::to_vec_pretty(config).map_err(|e| PluginError::InvalidManifest {
            path: self.path_for(plugin),
            message: e.to_string(),
        })?;
        tokio::fs::write(self.path_for(plugin), bytes).await?;
        debug!(plugin = %plugin, "Config saved");
        Ok(())
    }
}
