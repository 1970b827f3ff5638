//! Filesystem plugin discovery.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::PluginResult;
use crate::manifest::{PluginSource, SourceKind};
use crate::traits::PluginFinder;

/// Manifest file expected inside a plugin directory.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Scans a set of root directories for plugin sources.
///
/// Directly under each root, three artifact shapes are recognised:
/// a subdirectory containing `plugin.json`, a `.zip` archive, or a
/// standalone `.json` manifest file.
pub struct DirectoryFinder {
    roots: Vec<PathBuf>,
}

impl DirectoryFinder {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// The roots this finder scans.
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn classify(entry: &Path) -> Option<PluginSource> {
        let stem = entry.file_stem()?.to_str()?.to_owned();
        if entry.is_dir() {
            if entry.join(MANIFEST_FILE).is_file() {
                return Some(PluginSource::new(SourceKind::Directory, entry, stem));
            }
            return None;
        }
        match entry.extension()?.to_str()? {
            "zip" => Some(PluginSource::new(SourceKind::Archive, entry, stem)),
            "json" => Some(PluginSource::new(SourceKind::File, entry, stem)),
            _ => None,
        }
    }
}

impl PluginFinder for DirectoryFinder {
    fn find_sources(&self) -> PluginResult<Vec<PluginSource>> {
        let mut sources = Vec::new();
        for root in &self.roots {
            let entries = match std::fs::read_dir(root) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Skipping unreadable plugin root");
                    continue;
                }
            };
            for entry in entries {
                let entry = entry?;
                if let Some(source) = Self::classify(&entry.path()) {
                    debug!(module = %source.module, path = %source.path.display(), "Discovered plugin source");
                    sources.push(source);
                }
            }
        }
        Ok(sources)
    }

    fn find_by_path(&self, path: &Path) -> PluginResult<Option<PluginSource>> {
        for root in &self.roots {
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let Some(first) = relative.components().next() else {
                continue;
            };
            return Ok(Self::classify(&root.join(first)));
        }
        Ok(None)
    }
}
