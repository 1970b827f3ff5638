//! # Flux Plugins
//!
//! Plugin lifecycle management for the Flux runtime.
//!
//! The [`PluginManager`] owns a registry of plugins and drives their whole
//! lifecycle: discovery ([`PluginFinder`]), instantiation ([`PluginLoader`]),
//! dependency-ordered batch loading with rollback, start/stop transitions,
//! hot reload (per plugin, per change set, or with dependents via
//! [`ReloadMode`]), and config persistence ([`ConfigStore`]).
//!
//! Plugins implement the [`Plugin`] hook trait and talk to the rest of the
//! system exclusively through their [`PluginContext`], which scopes every
//! bus registration to the owning plugin so unloading can strip them all.
//!
//! Filesystem-driven reloads are debounced: a burst of file changes becomes
//! one reload batch (see [`watch`]). The manager also reports what it does
//! as system events on the bus (see [`events`]).

mod context;
mod error;
pub mod events;
mod finder;
mod graph;
mod manager;
mod manifest;
mod store;
mod traits;
mod version;
pub mod watch;

pub use context::PluginContext;
pub use error::{PluginError, PluginResult};
pub use finder::{DirectoryFinder, MANIFEST_FILE};
pub use manager::{ManagerOptions, PluginInfo, PluginManager, ReloadMode};
pub use manifest::{PluginManifest, PluginSource, PluginState, PluginStatus, SourceKind};
pub use store::JsonConfigStore;
pub use traits::{ConfigStore, LoadedPlugin, Plugin, PluginFinder, PluginLoader};
pub use version::VersionSpec;
