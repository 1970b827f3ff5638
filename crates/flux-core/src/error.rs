//! Unified error types for the Flux core crate.

use std::time::Duration;

use thiserror::Error;

/// Boxed error type carried by handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Bus Errors
// =============================================================================

/// Errors that can occur when interacting with an event bus.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Operation attempted on a closed bus.
    #[error("event bus is closed")]
    Closed,

    /// The dedicated worker's event queue is full.
    #[error("event queue is full (capacity {capacity})")]
    QueueFull {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// An event pattern could not be compiled.
    #[error("invalid event pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern text.
        pattern: String,
        /// Reason reported by the regex compiler.
        reason: String,
    },
}

/// Per-handler failure inside a `request` result map.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The handler did not complete within the request timeout.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),

    /// The handler returned an error or its task failed.
    #[error("handler failed: {0}")]
    Failed(String),
}

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Outcome of a single handler within a `request` call.
pub type RequestOutcome = Result<serde_json::Value, RequestError>;
