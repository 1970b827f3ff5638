//! Manager lifecycle tests against in-memory collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use semver::Version;
use serde_json::{Value, json};

use flux_core::{DirectBus, Event, EventBus, EventPattern, Handler};
use flux_plugins::{
    ConfigStore, LoadedPlugin, ManagerOptions, Plugin, PluginContext, PluginError, PluginFinder,
    PluginLoader, PluginManager, PluginManifest, PluginResult, PluginSource, PluginState,
    ReloadMode, SourceKind, VersionSpec,
};

type Log = Arc<Mutex<Vec<String>>>;

// ─── fixtures ────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Spec {
    name: &'static str,
    version: &'static str,
    deps: Vec<(&'static str, &'static str)>,
    fail_on_load: bool,
}

impl Spec {
    fn new(name: &'static str, deps: &[(&'static str, &'static str)]) -> Self {
        Self {
            name,
            version: "1.0.0",
            deps: deps.to_vec(),
            fail_on_load: false,
        }
    }

    fn failing(mut self) -> Self {
        self.fail_on_load = true;
        self
    }

    fn source(&self) -> PluginSource {
        PluginSource::new(
            SourceKind::Directory,
            format!("/plugins/{}", self.name),
            self.name,
        )
    }
}

struct TestPlugin {
    name: String,
    log: Log,
    fail_on_load: bool,
}

#[async_trait]
impl Plugin for TestPlugin {
    async fn on_load(&self, ctx: &PluginContext) -> Result<(), flux_core::BoxError> {
        self.log.lock().push(format!("{}:load", self.name));
        if self.fail_on_load {
            return Err(format!("{} refused to load", self.name).into());
        }
        ctx.register_handler(
            EventPattern::exact(format!("{}.echo", self.name)),
            Handler::new(format!("{}.echo", self.name), |event: Event| async move {
                Ok(event.payload().clone())
            }),
        )?;
        Ok(())
    }

    async fn on_start(&self, _ctx: &PluginContext) -> Result<(), flux_core::BoxError> {
        self.log.lock().push(format!("{}:start", self.name));
        Ok(())
    }

    async fn on_stop(&self, _ctx: &PluginContext) -> Result<(), flux_core::BoxError> {
        self.log.lock().push(format!("{}:stop", self.name));
        Ok(())
    }

    async fn on_unload(&self, ctx: &PluginContext) -> Result<(), flux_core::BoxError> {
        self.log.lock().push(format!("{}:unload", self.name));
        ctx.update_config(|config| {
            config["unloaded"] = json!(true);
        });
        Ok(())
    }
}

struct MemFinder {
    sources: Mutex<Vec<PluginSource>>,
}

impl PluginFinder for MemFinder {
    fn find_sources(&self) -> PluginResult<Vec<PluginSource>> {
        Ok(self.sources.lock().clone())
    }

    fn find_by_path(&self, path: &Path) -> PluginResult<Option<PluginSource>> {
        Ok(self
            .sources
            .lock()
            .iter()
            .find(|source| source.covers(path))
            .cloned())
    }
}

struct MemLoader {
    specs: Mutex<HashMap<String, Spec>>,
    log: Log,
    load_counts: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl PluginLoader for MemLoader {
    async fn load_from_source(&self, source: &PluginSource) -> PluginResult<LoadedPlugin> {
        let spec = self
            .specs
            .lock()
            .get(&source.module)
            .cloned()
            .ok_or_else(|| PluginError::NotFound {
                plugin: source.module.clone(),
            })?;
        *self
            .load_counts
            .lock()
            .entry(spec.name.to_owned())
            .or_insert(0) += 1;

        let mut manifest =
            PluginManifest::new(spec.name, Version::parse(spec.version).unwrap());
        for (dep, clause) in &spec.deps {
            manifest = manifest.with_dependency(*dep, VersionSpec::parse(clause).unwrap());
        }
        Ok(LoadedPlugin {
            manifest,
            plugin: Arc::new(TestPlugin {
                name: spec.name.to_owned(),
                log: Arc::clone(&self.log),
                fail_on_load: spec.fail_on_load,
            }),
        })
    }

    async fn unload_module(&self, module: &str) -> PluginResult<()> {
        self.log.lock().push(format!("{module}:release"));
        Ok(())
    }
}

struct MemStore {
    saved: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl ConfigStore for MemStore {
    async fn load(&self, plugin: &str) -> PluginResult<Value> {
        Ok(self
            .saved
            .lock()
            .get(plugin)
            .cloned()
            .unwrap_or_else(|| json!({})))
    }

    async fn save(&self, plugin: &str, config: &Value) -> PluginResult<()> {
        self.saved.lock().insert(plugin.to_owned(), config.clone());
        Ok(())
    }
}

struct Harness {
    manager: Arc<PluginManager>,
    bus: Arc<dyn EventBus>,
    log: Log,
    finder: Arc<MemFinder>,
    loader: Arc<MemLoader>,
    store: Arc<MemStore>,
}

impl Harness {
    /// Makes a plugin discoverable and loadable after the initial batch.
    fn add_spec(&self, spec: Spec) {
        self.finder.sources.lock().push(spec.source());
        self.loader
            .specs
            .lock()
            .insert(spec.name.to_owned(), spec);
    }
}

fn harness(specs: Vec<Spec>, options: ManagerOptions) -> Harness {
    let bus: Arc<dyn EventBus> = Arc::new(DirectBus::new());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let finder = Arc::new(MemFinder {
        sources: Mutex::new(specs.iter().map(Spec::source).collect()),
    });
    let loader = Arc::new(MemLoader {
        specs: Mutex::new(
            specs
                .into_iter()
                .map(|spec| (spec.name.to_owned(), spec))
                .collect(),
        ),
        log: Arc::clone(&log),
        load_counts: Mutex::new(HashMap::new()),
    });
    let store = Arc::new(MemStore {
        saved: Mutex::new(HashMap::new()),
    });

    let manager = Arc::new(PluginManager::with_options(
        Arc::clone(&bus),
        Arc::clone(&finder) as _,
        Arc::clone(&loader) as _,
        Arc::clone(&store) as _,
        options,
    ));
    Harness {
        manager,
        bus,
        log,
        finder,
        loader,
        store,
    }
}

fn trio() -> Vec<Spec> {
    vec![
        Spec::new("app", &[("lib", ">=1")]),
        Spec::new("lib", &[("util", "*")]),
        Spec::new("util", &[]),
    ]
}

fn load_count(h: &Harness, name: &str) -> usize {
    h.loader.load_counts.lock().get(name).copied().unwrap_or(0)
}

// ─── batch loading ───────────────────────────────────────────────────────

#[tokio::test]
async fn load_all_respects_dependency_order() {
    let h = harness(trio(), ManagerOptions::default());
    let loaded = h.manager.load_all().await.unwrap();
    assert_eq!(loaded, vec!["util", "lib", "app"]);

    let log = h.log.lock().clone();
    let pos = |entry: &str| log.iter().position(|l| l == entry).unwrap();
    assert!(pos("util:load") < pos("lib:load"));
    assert!(pos("lib:load") < pos("app:load"));

    for status in h.manager.statuses().await.values() {
        assert_eq!(status.state, PluginState::Running);
    }
}

#[tokio::test]
async fn failed_load_rolls_back_the_batch() {
    let specs = vec![Spec::new("lib", &[]), Spec::new("app", &[("lib", "*")]).failing()];
    let h = harness(specs, ManagerOptions::default());

    let err = h.manager.load_all().await.unwrap_err();
    assert!(matches!(err, PluginError::Runtime { ref plugin, .. } if plugin == "app"));

    // lib was activated first, then unloaded by the rollback.
    let log = h.log.lock().clone();
    assert!(log.contains(&"lib:load".to_owned()));
    assert!(log.contains(&"lib:unload".to_owned()));
    assert!(h.manager.list().await.is_empty());
}

#[tokio::test]
async fn lenient_mode_keeps_the_rest_of_the_batch() {
    let specs = vec![Spec::new("lib", &[]), Spec::new("app", &[("lib", "*")]).failing()];
    let h = harness(
        specs,
        ManagerOptions {
            lenient: true,
            ..Default::default()
        },
    );

    let loaded = h.manager.load_all().await.unwrap();
    assert_eq!(loaded, vec!["lib"]);
    assert_eq!(h.manager.list().await, vec!["lib"]);
}

#[tokio::test]
async fn version_mismatch_aborts_with_the_clause() {
    let mut specs = trio();
    specs[0].deps = vec![("lib", ">=2")];
    let h = harness(specs, ManagerOptions::default());

    match h.manager.load_all().await {
        Err(PluginError::VersionMismatch {
            plugin, required, ..
        }) => {
            assert_eq!(plugin, "app");
            assert_eq!(required, ">=2");
        }
        other => panic!("expected VersionMismatch, got {other:?}"),
    }
}

// ─── single-plugin lifecycle ─────────────────────────────────────────────

#[tokio::test]
async fn unload_persists_config_and_strips_handlers() {
    let h = harness(vec![Spec::new("solo", &[])], ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    let results = h
        .bus
        .request(Event::new("solo.echo", json!(42)), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);

    assert!(h.manager.unload("solo").await);
    assert!(!h.manager.unload("solo").await);

    let saved = h.store.saved.lock().get("solo").cloned().unwrap();
    assert_eq!(saved["unloaded"], json!(true));
    assert!(h.log.lock().contains(&"solo:release".to_owned()));

    let results = h
        .bus
        .request(Event::new("solo.echo", json!(42)), Duration::from_secs(1))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn unloading_a_dependency_leaves_dependents_answering() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    assert!(h.manager.unload("util").await);

    let results = h
        .bus
        .request(Event::new("lib.echo", json!("still here")), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(
        h.manager.get("lib").await.unwrap().status.state,
        PluginState::Running
    );
}

#[tokio::test]
async fn start_and_stop_transition_state() {
    let h = harness(vec![Spec::new("solo", &[])], ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    h.manager.stop("solo").await.unwrap();
    assert_eq!(
        h.manager.get("solo").await.unwrap().status.state,
        PluginState::Stopped
    );
    // Stopping again is a no-op.
    h.manager.stop("solo").await.unwrap();

    h.manager.start("solo").await.unwrap();
    assert_eq!(
        h.manager.get("solo").await.unwrap().status.state,
        PluginState::Running
    );

    assert!(matches!(
        h.manager.start("ghost").await,
        Err(PluginError::NotFound { .. })
    ));
}

#[tokio::test]
async fn reload_restores_the_previous_state() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    assert!(h.manager.reload("util").await);
    assert_eq!(load_count(&h, "util"), 2);
    assert_eq!(
        h.manager.get("util").await.unwrap().status.state,
        PluginState::Running
    );

    h.manager.stop("app").await.unwrap();
    assert!(h.manager.reload("app").await);
    assert_eq!(
        h.manager.get("app").await.unwrap().status.state,
        PluginState::Stopped
    );
}

#[tokio::test]
async fn failed_reload_removes_the_plugin() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    // The next load of "app" hits the failing variant.
    {
        let mut specs = h.loader.specs.lock();
        let spec = specs.get("app").cloned().unwrap().failing();
        specs.insert("app".to_owned(), spec);
    }

    let reloaded = h
        .manager
        .reload_paths(
            ReloadMode::Smart,
            &[PathBuf::from("/plugins/lib/src/lib.rs")],
        )
        .await;

    assert_eq!(reloaded, vec!["lib"]);
    let names = h.manager.list().await;
    assert!(names.contains(&"lib".to_owned()));
    assert!(!names.contains(&"app".to_owned()));
}

// ─── reload routing ──────────────────────────────────────────────────────

#[tokio::test]
async fn smart_reload_pulls_in_dependents() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    let reloaded = h
        .manager
        .reload_paths(
            ReloadMode::Smart,
            &[PathBuf::from("/plugins/lib/src/lib.rs")],
        )
        .await;

    assert_eq!(reloaded, vec!["lib", "app"]);
    assert_eq!(load_count(&h, "lib"), 2);
    assert_eq!(load_count(&h, "app"), 2);
    assert_eq!(load_count(&h, "util"), 1);
}

#[tokio::test]
async fn single_reload_touches_only_the_changed_plugin() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    let reloaded = h
        .manager
        .reload_paths(
            ReloadMode::Single,
            &[PathBuf::from("/plugins/lib/src/lib.rs")],
        )
        .await;

    assert_eq!(reloaded, vec!["lib"]);
    assert_eq!(load_count(&h, "app"), 1);
}

#[tokio::test]
async fn all_reload_covers_every_plugin() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    let reloaded = h
        .manager
        .reload_paths(ReloadMode::All, &[PathBuf::from("/plugins/util/x")])
        .await;

    assert_eq!(reloaded.len(), 3);
    for name in ["app", "lib", "util"] {
        assert_eq!(load_count(&h, name), 2);
    }
}

#[tokio::test]
async fn single_reload_loads_a_newly_discovered_source() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();
    h.add_spec(Spec::new("fresh", &[]));

    let reloaded = h
        .manager
        .reload_paths(
            ReloadMode::Single,
            &[PathBuf::from("/plugins/fresh/plugin.json")],
        )
        .await;

    assert_eq!(reloaded, vec!["fresh"]);
    assert!(h.manager.list().await.contains(&"fresh".to_owned()));
    assert_eq!(
        h.manager.get("fresh").await.unwrap().status.state,
        PluginState::Running
    );
    // The existing plugins were not touched.
    for name in ["app", "lib", "util"] {
        assert_eq!(load_count(&h, name), 1);
    }
}

#[tokio::test]
async fn single_reload_prefers_impacted_over_new_sources() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();
    h.add_spec(Spec::new("fresh", &[]));

    let reloaded = h
        .manager
        .reload_paths(
            ReloadMode::Single,
            &[
                PathBuf::from("/plugins/lib/src/lib.rs"),
                PathBuf::from("/plugins/fresh/plugin.json"),
            ],
        )
        .await;

    assert_eq!(reloaded, vec!["lib"]);
    assert!(!h.manager.list().await.contains(&"fresh".to_owned()));
}

#[tokio::test]
async fn all_reload_also_loads_new_sources() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();
    h.add_spec(Spec::new("fresh", &[]));

    let reloaded = h
        .manager
        .reload_paths(ReloadMode::All, &[PathBuf::from("/plugins/fresh/x")])
        .await;

    assert_eq!(reloaded.len(), 4);
    assert!(reloaded.contains(&"fresh".to_owned()));
    assert!(h.manager.list().await.contains(&"fresh".to_owned()));
}

#[tokio::test]
async fn smart_reload_loads_a_new_source_when_nothing_is_impacted() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();
    h.add_spec(Spec::new("fresh", &[]));

    let reloaded = h
        .manager
        .reload_paths(
            ReloadMode::Smart,
            &[PathBuf::from("/plugins/fresh/plugin.json")],
        )
        .await;

    assert_eq!(reloaded, vec!["fresh"]);
    assert!(h.manager.list().await.contains(&"fresh".to_owned()));
}

#[tokio::test]
async fn reload_requests_arrive_over_the_bus() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();
    h.manager.listen_for_reload_requests().unwrap();

    h.bus
        .publish(Event::new(
            flux_plugins::events::RELOAD_REQUESTED,
            json!({ "plugin": "util" }),
        ))
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while load_count(&h, "util") < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reload request was not processed");
}

// ─── system events & shutdown ────────────────────────────────────────────

#[tokio::test]
async fn lifecycle_is_visible_as_system_events() {
    let h = harness(vec![Spec::new("solo", &[])], ManagerOptions::default());

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    h.bus
        .register(
            EventPattern::parse(r"re:(flux|plugin)\..+").unwrap(),
            Handler::new("event-probe", move |event: Event| {
                let tx = tx.clone();
                async move {
                    tx.send((event.name().to_owned(), event.source().map(str::to_owned)))
                        .ok();
                    Ok(Value::Null)
                }
            }),
            None,
        )
        .unwrap();

    h.manager.load_all().await.unwrap();
    h.manager.unload("solo").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut seen = Vec::new();
    while let Ok((name, source)) = rx.try_recv() {
        assert_eq!(source.as_deref(), Some("plugin-manager"));
        seen.push(name);
    }
    for expected in [
        "flux.manager.starting",
        "flux.plugins.resolved",
        "plugin.solo.loading",
        "plugin.solo.loaded",
        "plugin.solo.started",
        "flux.manager.started",
        "plugin.solo.unloading",
        "plugin.solo.unloaded",
    ] {
        assert!(seen.contains(&expected.to_owned()), "missing event {expected}: {seen:?}");
    }
}

#[tokio::test]
async fn close_unloads_in_reverse_dependency_order() {
    let h = harness(trio(), ManagerOptions::default());
    h.manager.load_all().await.unwrap();

    h.manager.close().await;
    h.manager.close().await;

    let log = h.log.lock().clone();
    let pos = |entry: &str| log.iter().position(|l| l == entry).unwrap();
    assert!(pos("app:unload") < pos("lib:unload"));
    assert!(pos("lib:unload") < pos("util:unload"));
    assert!(h.manager.list().await.is_empty());

    assert!(matches!(
        h.manager.load_all().await,
        Err(PluginError::Closed)
    ));
}
