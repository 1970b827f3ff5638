//! Pattern-based publish/subscribe with request/response and interceptors.
//!
//! The [`EventBus`] trait is the contract both dispatch strategies implement:
//!
//! - [`DirectBus`] schedules interception and fan-out from the caller's task.
//! - [`QueuedBus`] pushes everything through a bounded queue drained by a
//!   dedicated worker, isolating slow consumers from the publishing task.
//!
//! Handlers are matched by [`EventPattern`] (exact string or full-match
//! regex), invoked concurrently with no ordering guarantee, and their
//! failures never propagate to the publisher.

mod direct;
mod dispatch;
mod handler;
mod interceptor;
mod pattern;
mod queued;
mod registry;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{BusResult, RequestOutcome};
use crate::event::Event;

pub use direct::DirectBus;
pub use handler::{Handler, HandlerId};
pub use interceptor::{Intercept, Interceptor, InterceptorId};
pub use pattern::EventPattern;
pub use queued::QueuedBus;

/// Tuning knobs shared by both bus strategies.
#[derive(Debug, Clone, Copy)]
pub struct BusOptions {
    /// When `true` (the default) the first interceptor veto stops the chain
    /// immediately. When `false` the remaining interceptors still observe the
    /// event (useful for audit interceptors), but a vetoed event is
    /// dropped at the end of the chain regardless.
    pub short_circuit: bool,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            short_circuit: true,
        }
    }
}

/// Result map of a `request` call: one entry per matched handler.
pub type RequestResults = HashMap<HandlerId, RequestOutcome>;

/// In-process publish/subscribe and request/response bus.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Registers a handler under `pattern`, optionally owned by a plugin.
    ///
    /// Returns the handler's deterministic id; re-registering a handler with
    /// the same name reuses the id and replaces the previous registration.
    fn register(
        &self,
        pattern: EventPattern,
        handler: Handler,
        owner: Option<&str>,
    ) -> BusResult<HandlerId>;

    /// Registers several handlers at once, keyed by their pattern text.
    fn register_all(
        &self,
        handlers: Vec<(EventPattern, Handler)>,
        owner: Option<&str>,
    ) -> BusResult<HashMap<String, HandlerId>> {
        let mut ids = HashMap::with_capacity(handlers.len());
        for (pattern, handler) in handlers {
            let key = pattern.to_string();
            let id = self.register(pattern, handler, owner)?;
            ids.insert(key, id);
        }
        Ok(ids)
    }

    /// Removes a handler registration. Returns `false` when unknown.
    fn unregister(&self, id: HandlerId) -> bool;

    /// Removes every handler registered under `owner`, returning the count.
    fn unregister_owner(&self, owner: &str) -> usize;

    /// Appends an interceptor to the chain.
    fn register_interceptor(&self, interceptor: Interceptor) -> BusResult<InterceptorId>;

    /// Removes an interceptor. Returns `false` when unknown.
    fn unregister_interceptor(&self, id: InterceptorId) -> bool;

    /// Publishes an event to all matching handlers, fire-and-forget.
    ///
    /// The call never waits for handlers; its only cost is scheduling (or,
    /// for [`QueuedBus`], enqueueing; a full queue is reported as
    /// [`BusError::QueueFull`](crate::error::BusError::QueueFull)).
    fn publish(&self, event: Event) -> BusResult<()>;

    /// Publishes an event and awaits every matched handler's result.
    ///
    /// Each handler is bounded by `timeout` independently; a timed-out
    /// handler contributes a timeout entry without affecting the others. A
    /// vetoed event yields an empty map.
    async fn request(&self, event: Event, timeout: Duration) -> BusResult<RequestResults>;

    /// Closes the bus, clearing all registrations. Idempotent.
    fn close(&self);

    /// Whether [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}
