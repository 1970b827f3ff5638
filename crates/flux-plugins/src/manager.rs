//! Plugin lifecycle manager.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flux_core::{Event, EventBus, EventPattern, Handler, HandlerId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::context::PluginContext;
use crate::error::{PluginError, PluginResult};
use crate::events::{self, phase};
use crate::graph;
use crate::manifest::{PluginManifest, PluginSource, PluginState, PluginStatus};
use crate::traits::{ConfigStore, LoadedPlugin, Plugin, PluginFinder, PluginLoader};
use crate::watch::{Debouncer, FsWatcher};

/// How filesystem changes translate into reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadMode {
    /// Reload every loaded plugin.
    All,
    /// Reload only the plugins whose sources changed.
    Single,
    /// Reload the changed plugins plus everything that depends on them.
    Smart,
}

impl ReloadMode {
    fn parse(text: &str) -> Option<Self> {
        match text {
            "all" => Some(Self::All),
            "single" => Some(Self::Single),
            "smart" => Some(Self::Smart),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Single => "single",
            Self::Smart => "smart",
        }
    }
}

/// Manager tuning.
#[derive(Debug, Clone, Copy)]
pub struct ManagerOptions {
    /// Log dependency problems and per-plugin load failures instead of
    /// aborting the batch. Meant for development.
    pub lenient: bool,
    /// Reload mode used for filesystem-driven reloads.
    pub reload_mode: ReloadMode,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            lenient: false,
            reload_mode: ReloadMode::Smart,
        }
    }
}

/// Public snapshot of a managed plugin.
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub manifest: PluginManifest,
    pub status: PluginStatus,
    pub source: PluginSource,
}

struct Entry {
    manifest: PluginManifest,
    plugin: Arc<dyn Plugin>,
    context: Arc<PluginContext>,
    source: PluginSource,
    status: PluginStatus,
}

/// Owns the plugin registry and drives every lifecycle transition.
///
/// All collaborators are injected: the [`PluginFinder`] discovers sources,
/// the [`PluginLoader`] instantiates plugins, the [`ConfigStore`] persists
/// per-plugin config documents, and the bus carries both plugin handlers and
/// the manager's own system events.
pub struct PluginManager {
    bus: Arc<dyn EventBus>,
    finder: Arc<dyn PluginFinder>,
    loader: Arc<dyn PluginLoader>,
    store: Arc<dyn ConfigStore>,
    options: ManagerOptions,
    plugins: Mutex<BTreeMap<String, Entry>>,
    watcher: parking_lot::Mutex<Option<FsWatcher>>,
    closed: AtomicBool,
}

impl PluginManager {
    pub fn new(
        bus: Arc<dyn EventBus>,
        finder: Arc<dyn PluginFinder>,
        loader: Arc<dyn PluginLoader>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self::with_options(bus, finder, loader, store, ManagerOptions::default())
    }

    pub fn with_options(
        bus: Arc<dyn EventBus>,
        finder: Arc<dyn PluginFinder>,
        loader: Arc<dyn PluginLoader>,
        store: Arc<dyn ConfigStore>,
        options: ManagerOptions,
    ) -> Self {
        Self {
            bus,
            finder,
            loader,
            store,
            options,
            plugins: Mutex::new(BTreeMap::new()),
            watcher: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> PluginResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(PluginError::Closed)
        } else {
            Ok(())
        }
    }

    /// Publishes a system event, fire-and-forget.
    fn emit(&self, name: impl Into<String>, payload: Value) {
        let event = Event::new(name, payload).with_source(events::MANAGER_SOURCE);
        if let Err(e) = self.bus.publish(event) {
            debug!(error = %e, "System event dropped");
        }
    }

    // ─── batch load ──────────────────────────────────────────────────────

    /// Discovers, resolves and loads every plugin, returning the names that
    /// came up, in load order.
    ///
    /// In strict mode a failure anywhere unloads the plugins already
    /// activated in this batch, in reverse order, and surfaces the error. In
    /// lenient mode failures are logged and the rest of the batch proceeds.
    pub async fn load_all(&self) -> PluginResult<Vec<String>> {
        self.ensure_open()?;
        self.emit(events::MANAGER_STARTING, json!({}));

        let sources = self.finder.find_sources()?;
        let mut staged: BTreeMap<String, (LoadedPlugin, PluginSource)> = BTreeMap::new();
        for source in sources {
            match self.loader.load_from_source(&source).await {
                Ok(loaded) => {
                    let name = loaded.manifest.name.clone();
                    if staged.insert(name.clone(), (loaded, source)).is_some() {
                        warn!(plugin = %name, "Duplicate plugin name, keeping the later source");
                    }
                }
                Err(e) if self.options.lenient => {
                    warn!(path = %source.path.display(), error = %e, "Skipping unloadable plugin");
                }
                Err(e) => return Err(e),
            }
        }

        let manifests: BTreeMap<String, PluginManifest> = staged
            .iter()
            .map(|(name, (loaded, _))| (name.clone(), loaded.manifest.clone()))
            .collect();
        let order = graph::resolve_order(&manifests, self.options.lenient)?;
        self.emit(events::DEPENDENCIES_RESOLVED, json!({ "order": order }));

        let mut activated = Vec::new();
        for name in &order {
            let Some((loaded, source)) = staged.remove(name) else {
                continue;
            };
            match self.activate(loaded, source).await {
                Ok(()) => activated.push(name.clone()),
                Err(e) if self.options.lenient => {
                    error!(plugin = %name, error = %e, "Plugin failed to load, continuing");
                }
                Err(e) => {
                    error!(plugin = %name, error = %e, "Plugin failed to load, rolling back the batch");
                    self.rollback(&activated).await;
                    return Err(e);
                }
            }
        }

        info!(count = activated.len(), "Plugins loaded");
        self.emit(events::MANAGER_STARTED, json!({ "plugins": activated }));
        Ok(activated)
    }

    /// Loads config, runs `on_load` and `on_start`, and registers the entry
    /// as `Running`. Emits the per-plugin lifecycle events.
    async fn activate(&self, loaded: LoadedPlugin, source: PluginSource) -> PluginResult<()> {
        let name = loaded.manifest.name.clone();
        self.emit(events::plugin_event(&name, phase::LOADING), json!({}));

        let config = match self.store.load(&name).await {
            Ok(config) => config,
            Err(e) => {
                warn!(plugin = %name, error = %e, "Config unreadable, starting empty");
                Value::Object(Default::default())
            }
        };
        let context = Arc::new(PluginContext::new(
            name.clone(),
            Arc::clone(&self.bus),
            config,
        ));

        if let Err(e) = loaded.plugin.on_load(&context).await {
            return Err(self.fail_activation(&name, "on_load", e));
        }
        if let Err(e) = loaded.plugin.on_start(&context).await {
            return Err(self.fail_activation(&name, "on_start", e));
        }

        self.emit(
            events::plugin_event(&name, phase::LOADED),
            json!({ "version": loaded.manifest.version.to_string() }),
        );
        self.emit(events::plugin_event(&name, phase::STARTED), json!({}));
        info!(plugin = %name, version = %loaded.manifest.version, "Plugin running");

        self.plugins.lock().await.insert(
            name,
            Entry {
                manifest: loaded.manifest,
                plugin: loaded.plugin,
                context,
                source,
                status: PluginStatus::new(PluginState::Running),
            },
        );
        Ok(())
    }

    /// Cleans up after a failed hook: the plugin keeps nothing on the bus
    /// and the failure is visible as a system event.
    fn fail_activation(
        &self,
        name: &str,
        operation: &str,
        error: flux_core::BoxError,
    ) -> PluginError {
        self.bus.unregister_owner(name);
        self.emit(
            events::plugin_event(name, phase::LOAD_FAILED),
            json!({ "error": error.to_string() }),
        );
        PluginError::runtime(name, operation, error)
    }

    async fn rollback(&self, activated: &[String]) {
        if activated.is_empty() {
            return;
        }
        warn!(count = activated.len(), "Unloading previously activated plugins");
        for name in activated.iter().rev() {
            if !self.unload(name).await {
                warn!(plugin = %name, "Rollback unload failed");
            }
        }
    }

    // ─── single-plugin operations ────────────────────────────────────────

    /// Unloads a plugin: stop if running, `on_unload`, persist config,
    /// strip its bus handlers, release the loader module.
    ///
    /// Returns `false` for an unknown plugin or when a hook failed; in the
    /// latter case the plugin stays registered as `Failed`.
    pub async fn unload(&self, name: &str) -> bool {
        let Some(mut entry) = self.plugins.lock().await.remove(name) else {
            return false;
        };
        self.emit(events::plugin_event(name, phase::UNLOADING), json!({}));

        let mut failure: Option<String> = None;
        if entry.status.state == PluginState::Running
            && let Err(e) = entry.plugin.on_stop(&entry.context).await
        {
            warn!(plugin = %name, error = %e, "on_stop failed during unload");
        }
        if let Err(e) = entry.plugin.on_unload(&entry.context).await {
            error!(plugin = %name, error = %e, "on_unload failed");
            failure = Some(format!("on_unload: {e}"));
        }

        if let Err(e) = self.store.save(name, &entry.context.config()).await {
            warn!(plugin = %name, error = %e, "Config save failed");
        }
        let removed = self.bus.unregister_owner(name);
        debug!(plugin = %name, handlers = removed, "Handlers unregistered");

        if let Err(e) = self.loader.unload_module(&entry.source.module).await {
            error!(plugin = %name, error = %e, "Module release failed");
            failure.get_or_insert(format!("unload_module: {e}"));
        }

        if let Some(message) = failure {
            entry.status = PluginStatus::failed(message);
            self.plugins.lock().await.insert(name.to_owned(), entry);
            return false;
        }

        self.emit(events::plugin_event(name, phase::UNLOADED), json!({}));
        info!(plugin = %name, "Plugin unloaded");
        true
    }

    /// Transitions a stopped plugin back to `Running`.
    pub async fn start(&self, name: &str) -> PluginResult<()> {
        let mut plugins = self.plugins.lock().await;
        let entry = plugins.get_mut(name).ok_or_else(|| PluginError::NotFound {
            plugin: name.to_owned(),
        })?;
        if entry.status.state == PluginState::Running {
            return Ok(());
        }

        match entry.plugin.on_start(&entry.context).await {
            Ok(()) => {
                entry.status = PluginStatus::new(PluginState::Running);
                drop(plugins);
                self.emit(events::plugin_event(name, phase::STARTED), json!({}));
                info!(plugin = %name, "Plugin started");
                Ok(())
            }
            Err(e) => {
                entry.status = PluginStatus::failed(format!("on_start: {e}"));
                Err(PluginError::runtime(name, "on_start", e))
            }
        }
    }

    /// Transitions a running plugin to `Stopped`.
    pub async fn stop(&self, name: &str) -> PluginResult<()> {
        let mut plugins = self.plugins.lock().await;
        let entry = plugins.get_mut(name).ok_or_else(|| PluginError::NotFound {
            plugin: name.to_owned(),
        })?;
        if entry.status.state != PluginState::Running {
            return Ok(());
        }

        match entry.plugin.on_stop(&entry.context).await {
            Ok(()) => {
                entry.status = PluginStatus::new(PluginState::Stopped);
                drop(plugins);
                self.emit(events::plugin_event(name, phase::STOPPED), json!({}));
                info!(plugin = %name, "Plugin stopped");
                Ok(())
            }
            Err(e) => {
                entry.status = PluginStatus::failed(format!("on_stop: {e}"));
                Err(PluginError::runtime(name, "on_stop", e))
            }
        }
    }

    /// Unloads and re-loads one plugin from its (re-discovered) source,
    /// restoring its previous running/stopped state.
    ///
    /// Returns `false` when the plugin was unknown or the reload failed; a
    /// failed reload leaves the plugin out of the registry.
    pub async fn reload(&self, name: &str) -> bool {
        let (old_source, was_running) = {
            let plugins = self.plugins.lock().await;
            let Some(entry) = plugins.get(name) else {
                return false;
            };
            (
                entry.source.clone(),
                entry.status.state == PluginState::Running,
            )
        };

        info!(plugin = %name, "Reloading plugin");
        if !self.unload(name).await {
            return false;
        }

        let source = match self.refind_source(&old_source) {
            Some(source) => source,
            None => {
                warn!(plugin = %name, path = %old_source.path.display(), "Source no longer present, plugin stays unloaded");
                return false;
            }
        };
        let loaded = match self.loader.load_from_source(&source).await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(plugin = %name, error = %e, "Reload failed, plugin removed");
                return false;
            }
        };
        if let Err(e) = self.activate(loaded, source).await {
            error!(plugin = %name, error = %e, "Reload failed, plugin removed");
            return false;
        }
        if !was_running && let Err(e) = self.stop(name).await {
            warn!(plugin = %name, error = %e, "Could not restore stopped state");
        }
        true
    }

    fn refind_source(&self, old: &PluginSource) -> Option<PluginSource> {
        if let Ok(Some(source)) = self.finder.find_by_path(&old.path) {
            return Some(source);
        }
        // The artifact may have moved (e.g. file replaced by directory); fall
        // back to a full scan keyed by module name.
        self.finder
            .find_sources()
            .ok()?
            .into_iter()
            .find(|source| source.module == old.module)
    }

    // ─── reload routing ──────────────────────────────────────────────────

    /// Reloads in reaction to changed paths using the configured mode.
    /// Returns the names successfully reloaded.
    pub async fn process_paths(&self, paths: &[PathBuf]) -> Vec<String> {
        self.reload_paths(self.options.reload_mode, paths).await
    }

    /// Reloads in reaction to changed paths using an explicit mode.
    ///
    /// Changed paths are classified into already-loaded plugins and newly
    /// discoverable sources. ALL reloads everything and then loads every new
    /// source; SINGLE and SMART reload the impacted set (resp. its dependent
    /// closure), and load new sources only when no loaded plugin was hit.
    pub async fn reload_paths(&self, mode: ReloadMode, paths: &[PathBuf]) -> Vec<String> {
        let impacted = self.plugins_for_paths(paths).await;
        let discovered = self.discover_sources(paths).await;
        let manifests = self.manifests().await;
        let ordered = graph::resolve_order(&manifests, true)
            .unwrap_or_else(|_| manifests.keys().cloned().collect());

        let targets: Vec<String> = match mode {
            ReloadMode::All => ordered,
            ReloadMode::Single => ordered
                .into_iter()
                .filter(|name| impacted.contains(name))
                .collect(),
            ReloadMode::Smart => {
                let closure = graph::dependents_closure(&manifests, &impacted);
                ordered
                    .into_iter()
                    .filter(|name| closure.contains(name))
                    .collect()
            }
        };
        if targets.is_empty() && discovered.is_empty() {
            return Vec::new();
        }

        info!(
            mode = mode.as_str(),
            plugins = ?targets,
            new_sources = discovered.len(),
            "Reload batch starting"
        );
        self.emit(
            events::RELOAD_STARTED,
            json!({ "mode": mode.as_str(), "plugins": targets }),
        );

        let load_new = mode == ReloadMode::All || targets.is_empty();

        let mut reloaded = Vec::new();
        for name in targets {
            if self.reload(&name).await {
                reloaded.push(name);
            } else {
                warn!(plugin = %name, "Reload failed");
            }
        }
        if load_new {
            reloaded.extend(self.load_discovered(discovered).await);
        }
        reloaded
    }

    /// Sources behind the changed paths that no registered plugin owns yet.
    async fn discover_sources(&self, paths: &[PathBuf]) -> Vec<PluginSource> {
        let plugins = self.plugins.lock().await;
        let mut discovered: Vec<PluginSource> = Vec::new();
        for path in paths {
            let Ok(Some(source)) = self.finder.find_by_path(path) else {
                continue;
            };
            if plugins.values().any(|entry| entry.source.path == source.path) {
                continue;
            }
            if discovered.iter().any(|known| known.path == source.path) {
                continue;
            }
            discovered.push(source);
        }
        discovered
    }

    /// Loads and activates sources that appeared after the initial batch.
    /// Failures are logged; the rest of the set still loads.
    async fn load_discovered(&self, sources: Vec<PluginSource>) -> Vec<String> {
        let mut loaded_names = Vec::new();
        for source in sources {
            let loaded = match self.loader.load_from_source(&source).await {
                Ok(loaded) => loaded,
                Err(e) => {
                    warn!(path = %source.path.display(), error = %e, "New source could not be loaded");
                    continue;
                }
            };
            let name = loaded.manifest.name.clone();
            match self.activate(loaded, source).await {
                Ok(()) => {
                    info!(plugin = %name, "New plugin discovered and loaded");
                    loaded_names.push(name);
                }
                Err(e) => {
                    error!(plugin = %name, error = %e, "New plugin failed to load");
                }
            }
        }
        loaded_names
    }

    async fn plugins_for_paths(&self, paths: &[PathBuf]) -> BTreeSet<String> {
        let plugins = self.plugins.lock().await;
        let mut impacted = BTreeSet::new();
        for path in paths {
            for (name, entry) in plugins.iter() {
                if entry.source.covers(path) {
                    impacted.insert(name.clone());
                }
            }
        }
        impacted
    }

    async fn manifests(&self) -> BTreeMap<String, PluginManifest> {
        self.plugins
            .lock()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.manifest.clone()))
            .collect()
    }

    // ─── introspection ───────────────────────────────────────────────────

    /// Snapshot of one plugin.
    pub async fn get(&self, name: &str) -> Option<PluginInfo> {
        self.plugins.lock().await.get(name).map(|entry| PluginInfo {
            manifest: entry.manifest.clone(),
            status: entry.status.clone(),
            source: entry.source.clone(),
        })
    }

    /// Names of every registered plugin.
    pub async fn list(&self) -> Vec<String> {
        self.plugins.lock().await.keys().cloned().collect()
    }

    /// Status of every registered plugin.
    pub async fn statuses(&self) -> BTreeMap<String, PluginStatus> {
        self.plugins
            .lock()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.status.clone()))
            .collect()
    }

    // ─── change sources ──────────────────────────────────────────────────

    /// Starts watching `roots` and feeds debounced change batches into
    /// [`process_paths`](Self::process_paths).
    pub fn watch_filesystem(
        self: &Arc<Self>,
        roots: Vec<PathBuf>,
        quiet: Duration,
    ) -> PluginResult<()> {
        let (debouncer, mut batches) = Debouncer::new(quiet);
        let watcher = FsWatcher::start(&roots, debouncer)?;
        *self.watcher.lock() = Some(watcher);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(batch) = batches.recv().await {
                if manager.closed.load(Ordering::SeqCst) {
                    break;
                }
                debug!(count = batch.len(), "Filesystem change batch");
                manager.process_paths(&batch).await;
            }
        });
        Ok(())
    }

    /// Subscribes to out-of-band reload requests published on the bus.
    ///
    /// The request payload selects either one plugin (`{"plugin": "name"}`)
    /// or a mode plus paths (`{"mode": "smart", "paths": [...]}`).
    pub fn listen_for_reload_requests(self: &Arc<Self>) -> flux_core::BusResult<HandlerId> {
        let manager = Arc::clone(self);
        let handler = Handler::new("plugin-manager.reload-requests", move |event: Event| {
            let manager = Arc::clone(&manager);
            async move {
                manager.handle_reload_request(event.payload().clone()).await;
                Ok(Value::Null)
            }
        });
        self.bus.register(
            EventPattern::exact(events::RELOAD_REQUESTED),
            handler,
            Some(events::MANAGER_SOURCE),
        )
    }

    async fn handle_reload_request(&self, payload: Value) {
        if let Some(name) = payload.get("plugin").and_then(Value::as_str) {
            self.reload(name).await;
            return;
        }
        let mode = payload
            .get("mode")
            .and_then(Value::as_str)
            .and_then(ReloadMode::parse)
            .unwrap_or(self.options.reload_mode);
        let paths: Vec<PathBuf> = payload
            .get("paths")
            .and_then(Value::as_array)
            .map(|paths| {
                paths
                    .iter()
                    .filter_map(Value::as_str)
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();
        self.reload_paths(mode, &paths).await;
    }

    // ─── shutdown ────────────────────────────────────────────────────────

    /// Unloads every plugin in reverse dependency order. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(events::MANAGER_STOPPING, json!({}));
        *self.watcher.lock() = None;

        let manifests = self.manifests().await;
        let mut order = graph::resolve_order(&manifests, true)
            .unwrap_or_else(|_| manifests.keys().cloned().collect());
        order.reverse();

        for name in order {
            self.unload(&name).await;
        }
        info!("Plugin manager closed");
    }
}
