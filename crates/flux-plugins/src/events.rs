//! Names of the system events the manager publishes on the bus.
//!
//! All of them are published fire-and-forget with `source = "plugin-manager"`;
//! nothing in the manager waits for their handlers.

/// Source attached to every manager-published event.
pub const MANAGER_SOURCE: &str = "plugin-manager";

/// Batch load is beginning.
pub const MANAGER_STARTING: &str = "flux.manager.starting";
/// Batch load finished; payload lists the loaded plugins.
pub const MANAGER_STARTED: &str = "flux.manager.started";
/// The manager is shutting down.
pub const MANAGER_STOPPING: &str = "flux.manager.stopping";

/// Dependency resolution finished; payload carries the load order.
pub const DEPENDENCIES_RESOLVED: &str = "flux.plugins.resolved";

/// Out-of-band reload request; payload selects plugin/mode/paths.
pub const RELOAD_REQUESTED: &str = "flux.reload.requested";
/// A reload batch is beginning; payload lists the affected plugins.
pub const RELOAD_STARTED: &str = "flux.reload.started";

/// Per-plugin lifecycle event name, e.g. `plugin.storage.loaded`.
pub fn plugin_event(plugin: &str, phase: &str) -> String {
    format!("plugin.{plugin}.{phase}")
}

/// Lifecycle phases used with [`plugin_event`].
pub mod phase {
    pub const LOADING: &str = "loading";
    pub const LOADED: &str = "loaded";
    pub const LOAD_FAILED: &str = "load_failed";
    pub const STARTED: &str = "started";
    pub const STOPPED: &str = "stopped";
    pub const UNLOADING: &str = "unloading";
    pub const UNLOADED: &str = "unloaded";
}
