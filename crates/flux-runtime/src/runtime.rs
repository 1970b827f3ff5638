//! Wiring of bus, transport and plugin manager into one runnable unit.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use flux_core::{DirectBus, EventBus};
use flux_plugins::{
    DirectoryFinder, JsonConfigStore, ManagerOptions, PluginLoader, PluginManager,
};
use flux_transport::WsConnector;

use crate::config::FluxConfig;
use crate::error::RuntimeResult;
use crate::parser::{FrameParser, JsonFrameParser};

/// Assembles a [`Runtime`] from a config and a plugin loader.
pub struct RuntimeBuilder {
    config: FluxConfig,
    loader: Arc<dyn PluginLoader>,
    bus: Option<Arc<dyn EventBus>>,
    parser: Arc<dyn FrameParser>,
}

impl RuntimeBuilder {
    pub fn new(config: FluxConfig, loader: Arc<dyn PluginLoader>) -> Self {
        Self {
            config,
            loader,
            bus: None,
            parser: Arc::new(JsonFrameParser),
        }
    }

    /// Replaces the default [`DirectBus`].
    pub fn bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Replaces the default [`JsonFrameParser`].
    pub fn parser(mut self, parser: Arc<dyn FrameParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Validates the connection settings and starts the transport worker.
    /// Plugins are not loaded until [`Runtime::start`].
    pub fn build(self) -> RuntimeResult<Runtime> {
        let bus = self
            .bus
            .unwrap_or_else(|| Arc::new(DirectBus::new()) as Arc<dyn EventBus>);

        let connector = Arc::new(WsConnector::start(
            self.config.connection.connector_config(),
        )?);

        let plugins = &self.config.plugins;
        let finder = Arc::new(DirectoryFinder::new(plugins.roots.clone()));
        let store = Arc::new(JsonConfigStore::new(plugins.config_dir.clone()));
        let manager = Arc::new(PluginManager::with_options(
            Arc::clone(&bus),
            finder,
            self.loader,
            store,
            ManagerOptions {
                lenient: plugins.lenient,
                reload_mode: plugins.reload_mode,
            },
        ));

        Ok(Runtime {
            config: self.config,
            bus,
            connector,
            manager,
            parser: self.parser,
            pump: tokio::sync::Mutex::new(None),
        })
    }
}

/// The assembled application: transport feeding the bus, plugins consuming
/// from it.
pub struct Runtime {
    config: FluxConfig,
    bus: Arc<dyn EventBus>,
    connector: Arc<WsConnector>,
    manager: Arc<PluginManager>,
    parser: Arc<dyn FrameParser>,
    pump: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    pub fn builder(config: FluxConfig, loader: Arc<dyn PluginLoader>) -> RuntimeBuilder {
        RuntimeBuilder::new(config, loader)
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    pub fn connector(&self) -> &Arc<WsConnector> {
        &self.connector
    }

    pub fn manager(&self) -> &Arc<PluginManager> {
        &self.manager
    }

    /// Loads every plugin, arms the reload sources and starts pumping
    /// transport frames onto the bus.
    pub async fn start(&self) -> RuntimeResult<()> {
        self.manager.load_all().await?;

        let plugins = &self.config.plugins;
        if plugins.watch {
            let roots: Vec<PathBuf> = plugins
                .roots
                .iter()
                .filter(|root| root.exists())
                .cloned()
                .collect();
            if roots.is_empty() {
                warn!("No plugin roots exist, filesystem watching disabled");
            } else {
                self.manager
                    .watch_filesystem(roots, Duration::from_millis(plugins.debounce_ms))?;
            }
        }
        self.manager.listen_for_reload_requests()?;

        let listener = self.connector.create_listener(None)?;
        let bus = Arc::clone(&self.bus);
        let parser = Arc::clone(&self.parser);
        let handle = tokio::spawn(async move {
            while let Some(frame) = listener.recv().await {
                let Some(event) = parser.parse(&frame) else {
                    continue;
                };
                debug!(event = %event, "Inbound event");
                if let Err(e) = bus.publish(event) {
                    debug!(error = %e, "Inbound event dropped");
                }
            }
            debug!("Frame pump finished");
        });
        *self.pump.lock().await = Some(handle);

        info!("Runtime started");
        Ok(())
    }

    /// [`start`](Self::start), then blocks until ctrl-c, then
    /// [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Tears everything down: plugins first (their `on_unload` hooks may
    /// still publish), then the transport, then the bus. Idempotent.
    pub async fn shutdown(&self) {
        self.manager.close().await;
        self.connector.close();
        self.connector.wait_closed().await;
        if let Some(handle) = self.pump.lock().await.take() {
            let _ = handle.await;
        }
        self.bus.close();
        info!("Runtime stopped");
    }
}
