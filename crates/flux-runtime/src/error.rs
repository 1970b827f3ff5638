//! Runtime error type.

use thiserror::Error;

/// Errors surfaced while assembling or running the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or deserialized.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// The transport could not be set up.
    #[error(transparent)]
    Transport(#[from] flux_transport::TransportError),

    /// Plugin loading failed.
    #[error(transparent)]
    Plugin(#[from] flux_plugins::PluginError),

    /// The event bus rejected an operation.
    #[error(transparent)]
    Bus(#[from] flux_core::BusError),

    /// The shutdown signal handler could not be installed.
    #[error("signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
