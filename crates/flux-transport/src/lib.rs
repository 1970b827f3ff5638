//! # Flux Transport
//!
//! Reconnecting WebSocket transport for the Flux runtime.
//!
//! The central type is [`WsConnector`]: it owns the socket on a worker task,
//! reconnects with exponential backoff and jitter when the connection drops,
//! and decouples consumers from connection churn on both directions:
//!
//! - **Inbound**: any number of [`Listener`]s receive every data frame
//!   through bounded per-listener FIFO queues. A slow listener loses its
//!   oldest frames; it never blocks the read loop or other listeners.
//! - **Outbound**: [`WsConnector::send`] pushes into a bounded queue drained
//!   by the worker; a full queue surfaces as
//!   [`TransportError::Backpressure`].
//!
//! Connection state transitions are observable through a
//! [`watch`](tokio::sync::watch) channel ([`WsConnector::watch_state`]), and
//! activity counters through [`WsConnector::metrics`].

mod backoff;
mod client;
mod config;
mod error;
mod frame;
mod listener;

pub use backoff::ReconnectPolicy;
pub use client::{ConnectionState, TransportMetrics, WsConnector};
pub use config::ConnectorConfig;
pub use error::{TransportError, TransportResult};
pub use frame::Frame;
pub use listener::Listener;
