//! Handler fan-out shared by both bus strategies.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{error, warn};

use super::handler::{Handler, HandlerId};
use crate::error::{RequestError, RequestOutcome};
use crate::event::Event;

/// Fire-and-forget fan-out: one task per handler, failures logged.
pub(crate) fn fan_out_publish(handlers: Vec<(HandlerId, Handler)>, event: Event) {
    for (id, handler) in handlers {
        let event = event.clone();
        tokio::spawn(async move {
            if let Err(e) = handler.invoke(event).await {
                error!(handler = %handler.name(), id = %id, error = %e, "Handler failed");
            }
        });
    }
}

/// Request fan-out: runs every handler concurrently, each bounded by
/// `timeout`, and collects one outcome per handler id.
pub(crate) async fn fan_out_request(
    handlers: Vec<(HandlerId, Handler)>,
    event: Event,
    timeout: Duration,
) -> HashMap<HandlerId, RequestOutcome> {
    let waits = handlers.into_iter().map(|(id, handler)| {
        let event = event.clone();
        async move {
            let task = tokio::spawn(handler.invoke(event));
            let outcome = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(Ok(value))) => Ok(value),
                Ok(Ok(Err(e))) => {
                    error!(handler = %handler.name(), id = %id, error = %e, "Handler failed");
                    Err(RequestError::Failed(e.to_string()))
                }
                Ok(Err(join_err)) => {
                    error!(handler = %handler.name(), id = %id, error = %join_err, "Handler task failed");
                    Err(RequestError::Failed(join_err.to_string()))
                }
                Err(_) => {
                    warn!(handler = %handler.name(), id = %id, ?timeout, "Handler timed out");
                    Err(RequestError::Timeout(timeout))
                }
            };
            (id, outcome)
        }
    });

    futures::future::join_all(waits).await.into_iter().collect()
}
