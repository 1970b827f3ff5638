//! Direct dispatch strategy.
//!
//! `publish` spawns the interception + fan-out work from the caller's own
//! task; `request` runs it inline. Blocking handlers created with
//! [`Handler::blocking`](super::Handler::blocking) execute on the runtime's
//! blocking pool, so neither variant can stall the event loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::dispatch::{fan_out_publish, fan_out_request};
use super::handler::{Handler, HandlerId};
use super::interceptor::{Interceptor, InterceptorId, run_chain};
use super::pattern::EventPattern;
use super::registry::BusRegistry;
use super::{BusOptions, EventBus, RequestResults};
use crate::error::BusResult;
use crate::event::Event;

/// Event bus that dispatches from the caller's concurrency domain.
pub struct DirectBus {
    registry: Arc<BusRegistry>,
    options: BusOptions,
}

impl DirectBus {
    /// Creates a bus with default options.
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    /// Creates a bus with explicit options.
    pub fn with_options(options: BusOptions) -> Self {
        Self {
            registry: Arc::new(BusRegistry::new()),
            options,
        }
    }
}

impl Default for DirectBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for DirectBus {
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

        let registry = Arc::clone(&self.registry);
        let short_circuit = self.options.short_circuit;
        tokio::spawn(async move {
            let chain = registry.interceptors();
            let (event, vetoed) = run_chain(&chain, event, short_circuit).await;
            if vetoed {
                debug!(event = %event, "Publish vetoed by interceptor");
                return;
            }
            let handlers = registry.matching(event.name());
            fan_out_publish(handlers, event);
        });

        Ok(())
    }

    async fn request(&self, event: Event, timeout: Duration) -> BusResult<RequestResults> {
        self.registry.ensure_open()?;

        let chain = self.registry.interceptors();
        let (event, vetoed) = run_chain(&chain, event, self.options.short_circuit).await;
        if vetoed {
            debug!(event = %event, "Request vetoed by interceptor");
            return Ok(RequestResults::new());
        }

        let handlers = self.registry.matching(event.name());
        Ok(fan_out_request(handlers, event, timeout).await)
    }

    fn close(&self) {
        if self.registry.close() {
            info!("Event bus closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.registry.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Intercept;
    use crate::error::{BusError, RequestError};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    fn capture_handler(name: &str, tx: mpsc::UnboundedSender<String>) -> Handler {
        Handler::new(name, move |event: Event| {
            let tx = tx.clone();
            async move {
                tx.send(event.name().to_string()).ok();
                Ok(Value::Null)
            }
        })
    }

    #[tokio::test]
    async fn publish_reaches_only_matching_handlers() {
        let bus = DirectBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        bus.register(EventPattern::exact("message.group"), capture_handler("exact", tx.clone()), None)
            .unwrap();
        bus.register(
            EventPattern::regex(r"message\..+").unwrap(),
            capture_handler("wild", tx.clone()),
            None,
        )
        .unwrap();
        bus.register(EventPattern::exact("notice"), capture_handler("other", tx), None)
            .unwrap();

        bus.publish(Event::new("message.group", Value::Null)).unwrap();

        let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        seen.sort();
        assert_eq!(seen, vec!["message.group", "message.group"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn request_collects_timeout_and_result() {
        let bus = DirectBus::new();
        let fast = Handler::new("fast", |_| async { Ok(json!("done")) });
        let slow = Handler::new("slow", |_| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(json!("late"))
        });
        let fast_id = bus.register(EventPattern::exact("q"), fast, None).unwrap();
        let slow_id = bus.register(EventPattern::exact("q"), slow, None).unwrap();

        let started = std::time::Instant::now();
        let results = bus
            .request(Event::new("q", Value::Null), Duration::from_millis(50))
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(results.len(), 2);
        assert_eq!(results[&fast_id], Ok(json!("done")));
        assert!(matches!(results[&slow_id], Err(RequestError::Timeout(_))));
    }

    #[tokio::test]
    async fn handler_error_does_not_fail_the_request() {
        let bus = DirectBus::new();
        let failing = Handler::new("failing", |_| async {
            Err("boom".to_string().into())
        });
        let id = bus.register(EventPattern::exact("q"), failing, None).unwrap();

        let results = bus
            .request(Event::new("q", Value::Null), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(&results[&id], Err(RequestError::Failed(msg)) if msg.contains("boom")));
    }

    #[tokio::test]
    async fn veto_blocks_both_publish_and_request() {
        for short_circuit in [true, false] {
            let bus = DirectBus::with_options(BusOptions { short_circuit });
            let (tx, mut rx) = mpsc::unbounded_channel();
            bus.register(EventPattern::exact("e"), capture_handler("h", tx), None)
                .unwrap();
            bus.register_interceptor(Interceptor::new(|_| async { Intercept::Veto }))
                .unwrap();

            let results = bus
                .request(Event::new("e", Value::Null), Duration::from_millis(100))
                .await
                .unwrap();
            assert!(results.is_empty());

            bus.publish(Event::new("e", Value::Null)).unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn interceptor_replacement_redirects_dispatch() {
        let bus = DirectBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.register(EventPattern::exact("after"), capture_handler("h", tx), None)
            .unwrap();
        bus.register_interceptor(Interceptor::new(|_| async {
            Intercept::Replace(Event::new("after", json!("swapped")))
        }))
        .unwrap();

        bus.publish(Event::new("before", Value::Null)).unwrap();
        assert_eq!(rx.recv().await.unwrap(), "after");
    }

    #[tokio::test]
    async fn reregistration_keeps_a_single_active_handler() {
        let bus = DirectBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = bus
            .register(EventPattern::exact("e"), capture_handler("same", tx.clone()), None)
            .unwrap();
        let second = bus
            .register(EventPattern::exact("e"), capture_handler("same", tx), None)
            .unwrap();
        assert_eq!(first, second);

        bus.publish(Event::new("e", Value::Null)).unwrap();
        rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_publish() {
        let bus = DirectBus::new();
        bus.close();
        bus.close();
        assert!(bus.is_closed());
        assert!(matches!(
            bus.publish(Event::new("e", Value::Null)),
            Err(BusError::Closed)
        ));
    }
}
