//! Pre-dispatch interceptors.
//!
//! Interceptors run as an ordered chain before any handler sees an event.
//! Each one inspects the current event and decides to pass it through,
//! replace it, or veto dispatch entirely.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::event::Event;

/// Id of a registered interceptor.
pub type InterceptorId = Uuid;

/// Decision returned by an interceptor.
#[derive(Debug)]
pub enum Intercept {
    /// No effect; the chain continues with the current event.
    Pass,
    /// The chain continues with the supplied replacement event.
    Replace(Event),
    /// Dispatch is vetoed; whether the rest of the chain still runs depends
    /// on the bus's short-circuit setting.
    Veto,
}

type InterceptorFn = dyn Fn(Event) -> BoxFuture<'static, Intercept> + Send + Sync;

/// An async pre-dispatch hook.
#[derive(Clone)]
pub struct Interceptor {
    func: Arc<InterceptorFn>,
}

impl Interceptor {
    /// Creates an interceptor from an async callback.
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Intercept> + Send + 'static,
    {
        Self {
            func: Arc::new(move |event| Box::pin(func(event))),
        }
    }

    pub(crate) fn invoke(&self, event: Event) -> BoxFuture<'static, Intercept> {
        (self.func)(event)
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Interceptor")
    }
}

/// Runs the interceptor chain over `event`.
///
/// Returns the (possibly replaced) event and whether any interceptor vetoed.
/// With `short_circuit` the first veto stops the chain immediately; without
/// it the remaining interceptors still observe the event, but a veto recorded
/// anywhere in the chain is honoured at the end regardless.
pub(crate) async fn run_chain(
    chain: &[(InterceptorId, Interceptor)],
    event: Event,
    short_circuit: bool,
) -> (Event, bool) {
    let mut current = event;
    let mut vetoed = false;

    for (id, interceptor) in chain {
        match interceptor.invoke(current.clone()).await {
            Intercept::Pass => {}
            Intercept::Replace(replacement) => {
                trace!(interceptor = %id, event = %replacement, "Interceptor replaced event");
                current = replacement;
            }
            Intercept::Veto => {
                vetoed = true;
                if short_circuit {
                    debug!(interceptor = %id, event = %current, "Interceptor vetoed event");
                    return (current, true);
                }
            }
        }
    }

    (current, vetoed)
}
