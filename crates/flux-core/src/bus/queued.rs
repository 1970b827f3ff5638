//! Queued dispatch strategy.
//!
//! All traffic flows through a bounded channel drained by one worker task.
//! Interception runs on the worker, so the chain observes events in enqueue
//! order; handler fan-out is still spawned so a slow handler never stalls the
//! queue. A full queue surfaces as [`BusError::QueueFull`] instead of
//! blocking the publisher.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatch::{fan_out_publish, fan_out_request};
use super::handler::{Handler, HandlerId};
use super::interceptor::{Interceptor, InterceptorId, run_chain};
use super::pattern::EventPattern;
use super::registry::BusRegistry;
use super::{BusOptions, EventBus, RequestResults};
use crate::error::{BusError, BusResult};
use crate::event::Event;

/// Default depth of the command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum Command {
    Publish(Event),
    Request {
        event: Event,
        timeout: Duration,
        reply: oneshot::Sender<RequestResults>,
    },
}

/// Event bus that serializes interception through a bounded worker queue.
pub struct QueuedBus {
    registry: Arc<BusRegistry>,
    tx: mpsc::Sender<Command>,
    capacity: usize,
    cancel: CancellationToken,
}

impl QueuedBus {
    /// Creates a bus with the default queue capacity and options.
    ///
    /// Must be called from within a Tokio runtime; the worker task is spawned
    /// immediately.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_QUEUE_CAPACITY, BusOptions::default())
    }

    /// Creates a bus with an explicit queue capacity and options.
    pub fn with_options(capacity: usize, options: BusOptions) -> Self {
        let registry = Arc::new(BusRegistry::new());
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        tokio::spawn(worker(Arc::clone(&registry), rx, cancel.clone(), options));

        Self {
            registry,
            tx,
            capacity,
            cancel,
        }
    }

    fn enqueue(&self, command: Command) -> BusResult<()> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BusError::QueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => BusError::Closed,
        })
    }
}

impl Default for QueuedBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn worker(
    registry: Arc<BusRegistry>,
    mut rx: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    options: BusOptions,
) {
    loop {
        let command = tokio::select! {
            _ = cancel.cancelled() => break,
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };

        let chain = registry.interceptors();
        match command {
            Command::Publish(event) => {
                let (event, vetoed) = run_chain(&chain, event, options.short_circuit).await;
                if vetoed {
                    debug!(event = %event, "Publish vetoed by interceptor");
                    continue;
                }
                let handlers = registry.matching(event.name());
                fan_out_publish(handlers, event);
            }
            Command::Request {
                event,
                timeout,
                reply,
            } => {
                let (event, vetoed) = run_chain(&chain, event, options.short_circuit).await;
                if vetoed {
                    debug!(event = %event, "Request vetoed by interceptor");
                    reply.send(RequestResults::new()).ok();
                    continue;
                }
                let handlers = registry.matching(event.name());
                // The aggregation waits on handler timeouts; run it off the
                // worker so queued traffic keeps flowing meanwhile.
                tokio::spawn(async move {
                    let results = fan_out_request(handlers, event, timeout).await;
                    if reply.send(results).is_err() {
                        warn!("Request caller went away before results were ready");
                    }
                });
            }
        }
    }

    debug!("Bus worker stopped");
}

#[async_trait]
impl EventBus for QueuedBus {
    fn register(
        &self,
        pattern: EventPattern,
        handler: Handler,
        owner: Option<&str>,
    ) -> BusResult<HandlerId> {
        self.registry.register(pattern, handler, owner)
    }

    fn unregister(&self, id: HandlerId) -> bool {
        self.registry.unregister(id)
    }

    fn unregister_owner(&self, owner: &str) -> usize {
        self.registry.unregister_owner(owner)
    }

    fn register_interceptor(&self, interceptor: Interceptor) -> BusResult<InterceptorId> {
        self.registry.register_interceptor(interceptor)
    }

    fn unregister_interceptor(&self, id: InterceptorId) -> bool {
        self.registry.unregister_interceptor(id)
    }

    fn publish(&self, event: Event) -> BusResult<()> {
        self.registry.ensure_open()?;
        self.enqueue(Command::Publish(event))
    }

    async fn request(&self, event: Event, timeout: Duration) -> BusResult<RequestResults> {
        self.registry.ensure_open()?;

        let (reply, response) = oneshot::channel();
        self.enqueue(Command::Request {
            event,
            timeout,
            reply,
        })?;

        response.await.map_err(|_| BusError::Closed)
    }

    fn close(&self) {
        if self.registry.close() {
            self.cancel.cancel();
            info!("Event bus closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }
}

impl Drop for QueuedBus {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Intercept;
    use serde_json::{Value, json};
    use tokio::sync::mpsc::unbounded_channel;

    #[tokio::test]
    async fn publish_flows_through_the_queue() {
        let bus = QueuedBus::new();
        let (tx, mut rx) = unbounded_channel();
        bus.register(
            EventPattern::exact("ping"),
            Handler::new("capture", move |event: Event| {
                let tx = tx.clone();
                async move {
                    tx.send(event.name().to_string()).ok();
                    Ok(Value::Null)
                }
            }),
            None,
        )
        .unwrap();

        bus.publish(Event::new("ping", Value::Null)).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "ping");
    }

    #[tokio::test]
    async fn request_flows_through_the_queue() {
        let bus = QueuedBus::new();
        let id = bus
            .register(
                EventPattern::exact("echo"),
                Handler::new("echo", |event: Event| async move {
                    Ok(event.payload().clone())
                }),
                None,
            )
            .unwrap();

        let results = bus
            .request(Event::new("echo", json!(7)), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(results[&id], Ok(json!(7)));
    }

    #[tokio::test]
    async fn full_queue_rejects_instead_of_blocking() {
        let bus = QueuedBus::with_options(2, BusOptions::default());
        // Stall the worker so the queue fills up.
        bus.register_interceptor(Interceptor::new(|_| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Intercept::Pass
        }))
        .unwrap();

        let mut rejected = None;
        for _ in 0..8 {
            if let Err(e) = bus.publish(Event::new("burst", Value::Null)) {
                rejected = Some(e);
                break;
            }
            tokio::task::yield_now().await;
        }

        assert!(matches!(rejected, Some(BusError::QueueFull { capacity: 2 })));
    }

    #[tokio::test]
    async fn close_stops_accepting_traffic() {
        let bus = QueuedBus::new();
        bus.close();
        bus.close();
        assert!(bus.is_closed());
        assert!(matches!(
            bus.publish(Event::new("e", Value::Null)),
            Err(BusError::Closed)
        ));
        assert!(matches!(
            bus.request(Event::new("e", Value::Null), Duration::from_secs(1))
                .await,
            Err(BusError::Closed)
        ));
    }
}
