//! # Flux Runtime
//!
//! Configuration, logging and orchestration for the Flux runtime.
//!
//! This crate glues the other pieces together: [`FluxConfig`] is loaded with
//! figment (defaults, then `flux.toml`, then `FLUX_` environment variables),
//! [`logging`] installs a tracing subscriber from the `[logging]` section,
//! and [`Runtime`] wires the WebSocket connector, the event bus and the
//! plugin manager into one unit with an ordered shutdown.
//!
//! Inbound transport frames are translated to bus events by a
//! [`FrameParser`]; the default [`JsonFrameParser`] understands
//! `{"event": ..., "data": ..., "source": ...}` documents.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flux_runtime::{FluxConfig, Runtime, logging};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FluxConfig::load()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let runtime = Runtime::builder(config, Arc::new(MyLoader)).build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
pub mod logging;
mod parser;
mod runtime;

pub use config::{
    ConnectionSettings, DEFAULT_CONFIG_FILE, FluxConfig, LogFormat, LoggingSettings,
    PluginSettings,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, init_from_config};
pub use parser::{FrameParser, JsonFrameParser, TRANSPORT_SOURCE};
pub use runtime::{Runtime, RuntimeBuilder};
