//! # Flux Core
//!
//! The event bus at the heart of the Flux runtime.
//!
//! This crate provides the shared event model and the two dispatch
//! strategies everything else is built on:
//!
//! - **Event model**: [`Event`], a named, JSON-payload message with routing
//!   metadata, matched against handlers by [`EventPattern`] (exact name or
//!   full-match regex).
//! - **Handlers**: async callbacks with deterministic ids ([`Handler`],
//!   [`HandlerId`]); re-registering a handler under the same name replaces
//!   the previous registration instead of duplicating it.
//! - **Interceptors**: an ordered pre-dispatch chain that can pass, replace,
//!   or veto an event ([`Interceptor`], [`Intercept`]).
//! - **Dispatch strategies**: [`DirectBus`] schedules fan-out from the
//!   caller's task; [`QueuedBus`] funnels traffic through a bounded worker
//!   queue.
//!
//! Both strategies implement the [`EventBus`] trait, which offers
//! fire-and-forget `publish` and result-collecting `request` with a
//! per-handler timeout.
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//! use flux_core::{DirectBus, Event, EventBus, EventPattern, Handler};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = DirectBus::new();
//! bus.register(
//!     EventPattern::parse("re:message\\..+")?,
//!     Handler::new("logger", |event: Event| async move {
//!         println!("got {event}");
//!         Ok(serde_json::Value::Null)
//!     }),
//!     None,
//! )?;
//!
//! bus.publish(Event::new("message.group", json!({"text": "hi"})))?;
//! let replies = bus
//!     .request(Event::new("message.group", json!({})), Duration::from_secs(5))
//!     .await?;
//! # let _ = replies;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{
    BusOptions, DirectBus, EventBus, EventPattern, Handler, HandlerId, Intercept, Interceptor,
    InterceptorId, QueuedBus, RequestResults,
};
pub use error::{BoxError, BusError, BusResult, RequestError, RequestOutcome};
pub use event::Event;
