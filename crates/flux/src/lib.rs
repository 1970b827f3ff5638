//! # Flux
//!
//! An in-process, event-driven plugin runtime.
//!
//! ## Overview
//!
//! Flux connects a reconnecting WebSocket transport to a pattern-matching
//! event bus and runs plugins against it:
//!
//! ```text
//! ┌─────────────┐     ┌───────────┐     ┌──────────────────────────────┐
//! │ WsConnector │────▶│ Event bus │────▶│ Plugin "storage"  (handlers) │
//! │ (reconnect, │     │ (patterns,│────▶│ Plugin "commands" (handlers) │
//! │  listeners) │     │ intercept)│────▶│ Plugin ...                   │
//! └─────────────┘     └───────────┘     └──────────────────────────────┘
//! ```
//!
//! - **Transport**: a WebSocket client that reconnects with exponential
//!   backoff and fans frames out to bounded listeners
//! - **Bus**: publish/subscribe plus request/response, with an interceptor
//!   chain and a choice of direct or queued dispatch
//! - **Plugins**: lifecycle-managed units with dependency ordering, hot
//!   reload and persisted configuration
//! - **Runtime**: figment-based configuration, tracing setup and an ordered
//!   shutdown tying the pieces together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flux::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FluxConfig::load()?;
//!     flux::runtime::logging::init_from_config(&config.logging);
//!
//!     let runtime = Runtime::builder(config, Arc::new(MyLoader)).build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub use flux_core as core;
pub use flux_plugins as plugins;
pub use flux_runtime as runtime;
pub use flux_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use flux::prelude::*;
/// ```
pub mod prelude {
    // Runtime entry point and configuration
    pub use flux_runtime::{FluxConfig, FrameParser, JsonFrameParser, Runtime, RuntimeError};

    // Bus surface used by handlers and plugins
    pub use flux_core::{
        BoxError, DirectBus, Event, EventBus, EventPattern, Handler, Intercept, Interceptor,
        QueuedBus,
    };

    // Plugin authoring
    pub use flux_plugins::{
        LoadedPlugin, Plugin, PluginContext, PluginLoader, PluginManager, PluginManifest,
        ReloadMode,
    };

    // Transport types surfaced to runtime users
    pub use flux_transport::{ConnectionState, ConnectorConfig, Frame, WsConnector};
}
