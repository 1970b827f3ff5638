//! Runtime configuration.
//!
//! Configuration is layered with figment, lowest priority first:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`flux.toml` by default)
//! 3. Environment variables (`FLUX_` prefix, `__` as section separator,
//!    e.g. `FLUX_LOGGING__LEVEL=debug`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use flux_plugins::ReloadMode;
use flux_transport::ConnectorConfig;

use crate::error::RuntimeResult;

/// Default config file searched in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "flux.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FluxConfig {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub plugins: PluginSettings,
}

impl FluxConfig {
    /// Loads from `flux.toml` (if present) plus `FLUX_` env overrides.
    pub fn load() -> RuntimeResult<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Loads from an explicit file plus `FLUX_` env overrides. The file is
    /// optional; missing sections fall back to defaults.
    pub fn load_from(path: &Path) -> RuntimeResult<Self> {
        let config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("FLUX_").split("__"))
            .extract()?;
        Ok(config)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Base level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Extra filter directives, e.g. `"flux_core=debug"`.
    #[serde(default)]
    pub filters: Vec<String>,
    /// Include thread ids in output.
    #[serde(default)]
    pub thread_ids: bool,
    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            filters: Vec::new(),
            thread_ids: false,
            file_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// `[connection]` section, mirroring [`ConnectorConfig`] in plain units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Seconds between pings; 0 disables the heartbeat.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Inbound idle deadline in seconds; 0 disables the check.
    #[serde(default)]
    pub receive_timeout_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
    /// 0 retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
    #[serde(default = "default_max_listeners")]
    pub max_listeners: usize,
    #[serde(default = "default_listener_buffer")]
    pub listener_buffer: usize,
    #[serde(default)]
    pub compression: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            headers: BTreeMap::new(),
            heartbeat_secs: default_heartbeat_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            receive_timeout_secs: 0,
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            jitter_ms: default_jitter_ms(),
            max_reconnect_attempts: 0,
            send_queue_capacity: default_send_queue_capacity(),
            max_listeners: default_max_listeners(),
            listener_buffer: default_listener_buffer(),
            compression: false,
        }
    }
}

impl ConnectionSettings {
    /// Builds the transport configuration.
    pub fn connector_config(&self) -> ConnectorConfig {
        let mut config = ConnectorConfig::new(&self.uri)
            .with_heartbeat(nonzero_secs(self.heartbeat_secs))
            .with_receive_timeout(nonzero_secs(self.receive_timeout_secs))
            .with_backoff(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_max_ms),
                Duration::from_millis(self.jitter_ms),
            )
            .with_max_reconnect_attempts(match self.max_reconnect_attempts {
                0 => None,
                n => Some(n),
            })
            .with_send_queue_capacity(self.send_queue_capacity)
            .with_listener_limits(self.max_listeners, self.listener_buffer)
            .with_compression(self.compression);
        for (name, value) in &self.headers {
            config = config.with_header(name, value);
        }
        config
    }
}

fn nonzero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn default_uri() -> String {
    "ws://127.0.0.1:8080/ws".to_owned()
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_backoff_max_ms() -> u64 {
    60_000
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_send_queue_capacity() -> usize {
    256
}
fn default_max_listeners() -> usize {
    16
}
fn default_listener_buffer() -> usize {
    128
}

/// `[plugins]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Directories scanned for plugin sources.
    #[serde(default = "default_plugin_roots")]
    pub roots: Vec<PathBuf>,
    /// Directory for persisted plugin configs.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Log dependency problems instead of aborting batch loads.
    #[serde(default)]
    pub lenient: bool,
    #[serde(default = "default_reload_mode")]
    pub reload_mode: ReloadMode,
    /// Watch the roots and hot-reload on changes.
    #[serde(default = "default_watch")]
    pub watch: bool,
    /// Quiet period for the change debouncer.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            roots: default_plugin_roots(),
            config_dir: default_config_dir(),
            lenient: false,
            reload_mode: default_reload_mode(),
            watch: default_watch(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_plugin_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("plugins")]
}
fn default_config_dir() -> PathBuf {
    PathBuf::from("plugin-config")
}
fn default_reload_mode() -> ReloadMode {
    ReloadMode::Smart
}
fn default_watch() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    500
}
