//! Event handlers and their identities.
//!
//! A [`Handler`] bundles an async callback with a stable name. The name is the
//! handler's identity: its [`HandlerId`] is derived deterministically from it
//! (UUIDv5), so registering the same name twice yields the same id and the bus
//! replaces the previous registration instead of duplicating it.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::error::BoxError;
use crate::event::Event;

/// Deterministic id of a registered handler.
pub type HandlerId = Uuid;

/// Namespace for deriving handler ids from handler names.
const HANDLER_NAMESPACE: Uuid = Uuid::from_u128(0x8e4f_5c1a_9b72_4d3e_a6f0_1c2b_3d4e_5f60);

type HandlerFn = dyn Fn(Event) -> BoxFuture<'static, Result<Value, BoxError>> + Send + Sync;

/// A named async event callback.
#[derive(Clone)]
pub struct Handler {
    name: Arc<str>,
    func: Arc<HandlerFn>,
}

impl Handler {
    /// Creates a handler from an async callback.
    ///
    /// `name` is the stable identity used to derive the handler id; use a
    /// qualified name (`"storage.on_message"`) to avoid collisions between
    /// plugins.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        Self {
            name: name.into().into(),
            func: Arc::new(move |event| Box::pin(func(event))),
        }
    }

    /// Creates a handler from a blocking callback.
    ///
    /// The callback runs on the blocking worker pool so it never stalls the
    /// async runtime.
    pub fn blocking<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Event) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::new(name, move |event| {
            let func = Arc::clone(&func);
            async move {
                match tokio::task::spawn_blocking(move || func(event)).await {
                    Ok(result) => result,
                    Err(e) => Err(Box::new(e) as BoxError),
                }
            }
        })
    }

    /// The handler's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deterministic id derived from the handler name.
    pub fn id(&self) -> HandlerId {
        Uuid::new_v5(&HANDLER_NAMESPACE, self.name.as_bytes())
    }

    /// Invokes the callback with the given event.
    pub(crate) fn invoke(&self, event: Event) -> BoxFuture<'static, Result<Value, BoxError>> {
        (self.func)(event)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name)
            .field("id", &self.id())
            .finish()
    }
}
