//! Transport error types.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the WebSocket connector.
///
/// Connection drops are handled internally by the reconnect loop; only
/// conditions the caller must react to appear here.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The initial or a re-connection handshake failed.
    #[error("connection to {url} failed: {reason}")]
    ConnectionFailed {
        /// Endpoint that was dialed.
        url: String,
        /// Handshake failure detail.
        reason: String,
    },

    /// The connector has been closed and no longer accepts operations.
    #[error("connection is closed")]
    ConnectionClosed,

    /// The connector was never started or its worker has stopped.
    #[error("connector is not running")]
    NotRunning,

    /// The outbound queue is full; the caller should back off.
    #[error("send queue is full (capacity {capacity})")]
    Backpressure {
        /// Configured send queue capacity.
        capacity: usize,
    },

    /// Configuration rejected before any connection attempt.
    #[error("invalid connector configuration: {0}")]
    InvalidConfig(String),

    /// Operation on a listener that has been closed.
    #[error("listener is closed")]
    ListenerClosed,

    /// No listener registered under the given id.
    #[error("no listener with id {0}")]
    ListenerNotFound(Uuid),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
