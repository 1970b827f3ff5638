//! Turning transport frames into bus events.

use flux_core::Event;
use flux_transport::Frame;
use serde_json::Value;
use tracing::{debug, trace};

/// Default source stamped on events parsed from the wire.
pub const TRANSPORT_SOURCE: &str = "transport";

/// Maps an inbound frame to an event, or suppresses it.
///
/// Returning `None` drops the frame without publishing anything; the runtime
/// pump treats that as routine (control frames, unparseable payloads).
pub trait FrameParser: Send + Sync {
    fn parse(&self, frame: &Frame) -> Option<Event>;
}

/// Parses JSON text frames of the shape
/// `{"event": "...", "data": ..., "source": "..."}`.
///
/// The `event` field is required and becomes the event name. `data` defaults
/// to JSON null, `source` to [`TRANSPORT_SOURCE`]. Binary frames are decoded
/// as UTF-8 first; control frames and malformed payloads are suppressed.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFrameParser;

impl FrameParser for JsonFrameParser {
    fn parse(&self, frame: &Frame) -> Option<Event> {
        let text = match frame {
            Frame::Text(text) => text.as_str(),
            Frame::Binary(data) => match std::str::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    debug!("dropping binary frame with non-utf8 payload");
                    return None;
                }
            },
            Frame::Ping(_) | Frame::Pong(_) | Frame::Close => return None,
        };

        let document: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(error) => {
                debug!(%error, "dropping frame with invalid json");
                return None;
            }
        };

        let Some(name) = document.get("event").and_then(Value::as_str) else {
            trace!("dropping frame without an event field");
            return None;
        };

        let payload = document.get("data").cloned().unwrap_or(Value::Null);
        let source = document
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or(TRANSPORT_SOURCE);

        Some(Event::new(name, payload).with_source(source))
    }
}
