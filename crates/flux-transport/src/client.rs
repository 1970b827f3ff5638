//! Reconnecting WebSocket connector.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{
    HeaderName, HeaderValue, SEC_WEBSOCKET_EXTENSIONS,
};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::backoff::ReconnectPolicy;
use crate::config::ConnectorConfig;
use crate::error::{TransportError, TransportResult};
use crate::frame::Frame;
use crate::listener::{Listener, ListenerShared, PushOutcome};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closing,
    Closed,
}

/// Point-in-time counters of connector activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportMetrics {
    pub connect_successes: u64,
    pub connect_failures: u64,
    pub frames_in: u64,
    pub frames_out: u64,
    /// Frames discarded because a listener's buffer was full.
    pub frames_dropped: u64,
    /// Listeners evicted to honour the listener cap.
    pub listeners_evicted: u64,
}

#[derive(Default)]
struct MetricsInner {
    connect_successes: AtomicU64,
    connect_failures: AtomicU64,
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    frames_dropped: AtomicU64,
    listeners_evicted: AtomicU64,
}

impl MetricsInner {
    fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            connect_successes: self.connect_successes.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_out: self.frames_out.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            listeners_evicted: self.listeners_evicted.load(Ordering::Relaxed),
        }
    }
}

/// WebSocket connector with automatic reconnection and listener fan-out.
///
/// [`start`](Self::start) spawns a worker that owns the socket for the
/// connector's whole life. Consumers attach [`Listener`]s for inbound frames
/// and push outbound frames through a bounded queue; neither path ever
/// touches the socket directly, so a reconnect is invisible to both.
pub struct WsConnector {
    state_rx: watch::Receiver<ConnectionState>,
    listeners: Arc<Mutex<Vec<Arc<ListenerShared>>>>,
    send_tx: mpsc::Sender<Frame>,
    send_capacity: usize,
    default_buffer: usize,
    max_listeners: usize,
    cancel: CancellationToken,
    metrics: Arc<MetricsInner>,
}

impl WsConnector {
    /// Validates `config` and spawns the connection worker.
    ///
    /// Must be called from within a Tokio runtime. The first connection
    /// attempt starts immediately.
    pub fn start(config: ConnectorConfig) -> TransportResult<Self> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (send_tx, send_rx) = mpsc::channel(config.send_queue_capacity);
        let listeners: Arc<Mutex<Vec<Arc<ListenerShared>>>> = Arc::new(Mutex::new(Vec::new()));
        let cancel = CancellationToken::new();
        let metrics = Arc::new(MetricsInner::default());

        let connector = Self {
            state_rx,
            listeners: Arc::clone(&listeners),
            send_tx,
            send_capacity: config.send_queue_capacity,
            default_buffer: config.listener_buffer,
            max_listeners: config.max_listeners,
            cancel: cancel.clone(),
            metrics: Arc::clone(&metrics),
        };

        tokio::spawn(run(config, state_tx, send_rx, listeners, cancel, metrics));
        Ok(connector)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Attaches a new inbound listener.
    ///
    /// `capacity` overrides the configured default buffer depth. When the
    /// listener cap is reached, the oldest attached listener is closed and
    /// evicted to make room.
    pub fn create_listener(&self, capacity: Option<usize>) -> TransportResult<Listener> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let shared = ListenerShared::new(capacity.unwrap_or(self.default_buffer));
        let mut listeners = self.listeners.lock();
        while listeners.len() >= self.max_listeners {
            let oldest = listeners
                .iter()
                .enumerate()
                .min_by_key(|(_, l)| l.created_at())
                .map(|(i, _)| i);
            let Some(index) = oldest else { break };
            let evicted = listeners.remove(index);
            evicted.close();
            self.metrics.listeners_evicted.fetch_add(1, Ordering::Relaxed);
            warn!(listener = %evicted.id(), "Listener cap reached, evicted oldest listener");
        }
        listeners.push(Arc::clone(&shared));
        drop(listeners);

        debug!(listener = %shared.id(), "Listener attached");
        Ok(Listener::new(shared))
    }

    /// Detaches and closes a listener by id.
    pub fn remove_listener(&self, id: Uuid) -> TransportResult<()> {
        let mut listeners = self.listeners.lock();
        let Some(index) = listeners.iter().position(|l| l.id() == id) else {
            return Err(TransportError::ListenerNotFound(id));
        };
        let removed = listeners.remove(index);
        drop(listeners);

        removed.close();
        debug!(listener = %id, "Listener detached");
        Ok(())
    }

    /// Queues an outbound frame.
    ///
    /// Returns immediately; the worker writes the frame once connected. A
    /// full queue yields [`TransportError::Backpressure`] instead of waiting.
    pub fn send(&self, frame: impl Into<Frame>) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        self.send_tx.try_send(frame.into()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure {
                capacity: self.send_capacity,
            },
            mpsc::error::TrySendError::Closed(_) => TransportError::NotRunning,
        })
    }

    /// Shuts the connector down. Idempotent; listeners are closed by the
    /// worker as it winds down.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the worker has fully wound down.
    pub async fn wait_closed(&self) {
        let mut state_rx = self.state_rx.clone();
        // Error means the worker already dropped its sender after Closed.
        state_rx
            .wait_for(|state| *state == ConnectionState::Closed)
            .await
            .ok();
    }

    /// Snapshot of activity counters.
    pub fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}

// =============================================================================
// Worker
// =============================================================================

enum SessionEnd {
    Shutdown,
    Dropped(String),
    IdleTimeout,
}

async fn run(
    mut config: ConnectorConfig,
    state_tx: watch::Sender<ConnectionState>,
    mut send_rx: mpsc::Receiver<Frame>,
    listeners: Arc<Mutex<Vec<Arc<ListenerShared>>>>,
    cancel: CancellationToken,
    metrics: Arc<MetricsInner>,
) {
    let mut policy = ReconnectPolicy::new(
        config.backoff_base,
        config.backoff_max,
        config.jitter,
        config.max_reconnect_attempts,
    );

    'outer: while !cancel.is_cancelled() {
        let Some(delay) = policy.next_delay() else {
            error!(url = %config.uri, "Reconnect attempts exhausted, giving up");
            break;
        };
        if !delay.is_zero() {
            state_tx.send_replace(ConnectionState::Reconnecting);
            debug!(url = %config.uri, ?delay, attempt = policy.attempts(), "Waiting before reconnect");
            tokio::select! {
                _ = cancel.cancelled() => break 'outer,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        state_tx.send_replace(ConnectionState::Connecting);
        match connect(&config).await {
            Ok(stream) => {
                metrics.connect_successes.fetch_add(1, Ordering::Relaxed);
                policy.reset();
                state_tx.send_replace(ConnectionState::Connected);
                info!(url = %config.uri, "Connected");

                match session(stream, &config, &mut send_rx, &listeners, &cancel, &metrics).await {
                    SessionEnd::Shutdown => break 'outer,
                    SessionEnd::Dropped(reason) => {
                        warn!(url = %config.uri, reason = %reason, "Connection lost");
                    }
                    SessionEnd::IdleTimeout => {
                        warn!(url = %config.uri, "No inbound traffic within the receive timeout, recycling connection");
                    }
                }
            }
            Err(failure) => {
                metrics.connect_failures.fetch_add(1, Ordering::Relaxed);
                if config.compression && failure.rejected_upgrade {
                    warn!(url = %config.uri, error = %failure.error, "Upgrade rejected with compression offered, retrying without it");
                    config.compression = false;
                } else {
                    warn!(url = %config.uri, error = %failure.error, "Connection attempt failed");
                }
            }
        }
    }

    state_tx.send_replace(ConnectionState::Closing);
    let drained: Vec<_> = listeners.lock().drain(..).collect();
    for listener in drained {
        listener.close();
    }
    state_tx.send_replace(ConnectionState::Closed);
    info!(url = %config.uri, "Connector closed");
}

struct ConnectFailure {
    error: TransportError,
    /// The server answered the upgrade and refused it, as opposed to the
    /// connection itself failing (refused, reset, timed out).
    rejected_upgrade: bool,
}

impl ConnectFailure {
    fn transport(error: TransportError) -> Self {
        Self {
            error,
            rejected_upgrade: false,
        }
    }
}

async fn connect(config: &ConnectorConfig) -> Result<WsStream, ConnectFailure> {
    let failed = |reason: String| TransportError::ConnectionFailed {
        url: config.uri.clone(),
        reason,
    };

    let mut request = config
        .uri
        .as_str()
        .into_client_request()
        .map_err(|e| ConnectFailure::transport(failed(e.to_string())))?;
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConnectFailure::transport(failed(e.to_string())))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ConnectFailure::transport(failed(e.to_string())))?;
        request.headers_mut().insert(name, value);
    }
    if config.compression {
        request.headers_mut().insert(
            SEC_WEBSOCKET_EXTENSIONS,
            HeaderValue::from_static("permessage-deflate"),
        );
    }

    match tokio::time::timeout(config.connect_timeout, connect_async(request)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(e)) => Err(ConnectFailure {
            rejected_upgrade: matches!(e, WsError::Http(_) | WsError::Protocol(_)),
            error: failed(e.to_string()),
        }),
        Err(_) => Err(ConnectFailure::transport(failed(format!(
            "handshake timed out after {:?}",
            config.connect_timeout
        )))),
    }
}

async fn session(
    stream: WsStream,
    config: &ConnectorConfig,
    send_rx: &mut mpsc::Receiver<Frame>,
    listeners: &Mutex<Vec<Arc<ListenerShared>>>,
    cancel: &CancellationToken,
    metrics: &MetricsInner,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = stream.split();

    let mut heartbeat = config.heartbeat_interval.map(|period| {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.reset();
        interval
    });
    // A year stands in for "never" when no receive timeout is configured.
    let idle_after = config
        .receive_timeout
        .unwrap_or(Duration::from_secs(365 * 24 * 3600));
    let idle = tokio::time::sleep(idle_after);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                ws_tx.send(Message::Close(None)).await.ok();
                return SessionEnd::Shutdown;
            }

            frame = send_rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = ws_tx.send(frame.into_message()).await {
                        return SessionEnd::Dropped(format!("send failed: {e}"));
                    }
                    metrics.frames_out.fetch_add(1, Ordering::Relaxed);
                }
                None => return SessionEnd::Shutdown,
            },

            _ = tick(&mut heartbeat) => {
                trace!("Sending heartbeat ping");
                if let Err(e) = ws_tx.send(Message::Ping(Vec::new().into())).await {
                    return SessionEnd::Dropped(format!("ping failed: {e}"));
                }
            }

            _ = &mut idle, if config.receive_timeout.is_some() => {
                ws_tx.send(Message::Close(None)).await.ok();
                return SessionEnd::IdleTimeout;
            }

            message = ws_rx.next() => {
                idle.as_mut().reset(tokio::time::Instant::now() + idle_after);
                match message {
                    Some(Ok(message)) => match Frame::from_message(message) {
                        Some(Frame::Ping(data)) => {
                            trace!("Answering ping");
                            ws_tx.send(Message::Pong(data.into())).await.ok();
                        }
                        Some(Frame::Pong(_)) => trace!("Received pong"),
                        Some(Frame::Close) => {
                            return SessionEnd::Dropped("server closed the connection".into());
                        }
                        Some(frame) => {
                            metrics.frames_in.fetch_add(1, Ordering::Relaxed);
                            broadcast(listeners, frame, metrics);
                        }
                        None => {}
                    },
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".into()),
                }
            }
        }
    }
}

async fn tick(heartbeat: &mut Option<tokio::time::Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Pushes one frame into every attached listener, detaching closed ones.
fn broadcast(listeners: &Mutex<Vec<Arc<ListenerShared>>>, frame: Frame, metrics: &MetricsInner) {
    listeners.lock().retain(|listener| match listener.push(frame.clone()) {
        PushOutcome::Delivered => true,
        PushOutcome::DroppedOldest => {
            metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(listener = %listener.id(), "Listener buffer full, dropped oldest frame");
            true
        }
        PushOutcome::Closed => {
            debug!(listener = %listener.id(), "Dropping closed listener");
            false
        }
    });
}
