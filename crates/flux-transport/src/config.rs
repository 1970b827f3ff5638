//! Connector configuration.

use std::time::Duration;

use crate::error::{TransportError, TransportResult};

/// Configuration for a [`WsConnector`](crate::WsConnector).
///
/// Built with [`ConnectorConfig::new`] plus `with_*` setters; every knob has
/// a conservative default.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub uri: String,
    /// Extra HTTP headers sent with the handshake.
    pub headers: Vec<(String, String)>,
    /// Interval between outbound pings. `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,
    /// Handshake deadline per connection attempt.
    pub connect_timeout: Duration,
    /// Inbound idle deadline; exceeded, the session is torn down and the
    /// reconnect loop takes over. `None` disables the check.
    pub receive_timeout: Option<Duration>,
    /// First backoff step of the reconnect schedule.
    pub backoff_base: Duration,
    /// Upper bound of the reconnect schedule.
    pub backoff_max: Duration,
    /// Random extra delay added to every backoff step.
    pub jitter: Duration,
    /// Reconnect attempt cap. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Outbound queue depth; a full queue surfaces as backpressure.
    pub send_queue_capacity: usize,
    /// Maximum concurrently attached listeners; exceeding it evicts the
    /// oldest listener.
    pub max_listeners: usize,
    /// Default per-listener buffer depth.
    pub listener_buffer: usize,
    /// Whether to offer permessage-deflate during the handshake. Dropped
    /// automatically after a failed negotiation.
    pub compression: bool,
}

impl ConnectorConfig {
    /// Creates a configuration for `uri` with default tuning.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            headers: Vec::new(),
            heartbeat_interval: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(10),
            receive_timeout: None,
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
            max_reconnect_attempts: None,
            send_queue_capacity: 256,
            max_listeners: 16,
            listener_buffer: 128,
            compression: false,
        }
    }

    /// Adds a handshake header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the heartbeat interval; `None` disables pings.
    pub fn with_heartbeat(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the inbound idle deadline.
    pub fn with_receive_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the reconnect backoff schedule.
    pub fn with_backoff(mut self, base: Duration, max: Duration, jitter: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self.jitter = jitter;
        self
    }

    /// Caps the number of reconnect attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the outbound queue depth.
    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    /// Sets the listener count cap and default buffer depth.
    pub fn with_listener_limits(mut self, max_listeners: usize, buffer: usize) -> Self {
        self.max_listeners = max_listeners;
        self.listener_buffer = buffer;
        self
    }

    /// Offers permessage-deflate during the handshake.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Checks the configuration before any connection attempt.
    pub fn validate(&self) -> TransportResult<()> {
        if self.uri.is_empty() {
            return Err(TransportError::InvalidConfig("uri must not be empty".into()));
        }
        if !self.uri.starts_with("ws://") && !self.uri.starts_with("wss://") {
            return Err(TransportError::InvalidConfig(format!(
                "uri must use ws:// or wss://, got '{}'",
                self.uri
            )));
        }
        if self.send_queue_capacity == 0 {
            return Err(TransportError::InvalidConfig(
                "send_queue_capacity must be at least 1".into(),
            ));
        }
        if self.max_listeners == 0 {
            return Err(TransportError::InvalidConfig(
                "max_listeners must be at least 1".into(),
            ));
        }
        if self.listener_buffer == 0 {
            return Err(TransportError::InvalidConfig(
                "listener_buffer must be at least 1".into(),
            ));
        }
        if self.backoff_max < self.backoff_base {
            return Err(TransportError::InvalidConfig(
                "backoff_max must be >= backoff_base".into(),
            ));
        }
        Ok(())
    }
}
