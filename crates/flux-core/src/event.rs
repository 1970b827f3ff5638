//! The event value type carried across the bus.
//!
//! An [`Event`] is immutable once constructed: every field is set through the
//! builder-style constructors and only read afterwards. Interceptors that want
//! to transform an event build a *replacement* event instead of mutating the
//! original (see [`Intercept::Replace`](crate::bus::Intercept::Replace)).

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde_json::Value;
use uuid::Uuid;

/// A named payload carrier published on the event bus.
///
/// Event names are conventionally dot-segmented (`"message.group"`,
/// `"plugin.storage.loaded"`). The payload is an opaque JSON document; the
/// bus never inspects it.
#[derive(Debug, Clone)]
pub struct Event {
    id: Uuid,
    name: String,
    payload: Value,
    source: Option<String>,
    target: Option<String>,
    timestamp: SystemTime,
    /// Task or thread that constructed the event, when identifiable.
    origin: Option<String>,
    metadata: BTreeMap<String, String>,
}

impl Event {
    /// Creates a new event with the given name and payload.
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            payload,
            source: None,
            target: None,
            timestamp: SystemTime::now(),
            origin: current_origin(),
            metadata: BTreeMap::new(),
        }
    }

    /// Sets the logical source of the event (e.g. a plugin or component name).
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the logical target of the event.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Replaces the payload, keeping every other field.
    ///
    /// Intended for interceptors that produce a transformed copy.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Unique id of this event instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Event name matched against handler patterns.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque payload document.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Logical source, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Logical target, if any.
    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Construction timestamp.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Identity of the task (or, outside the runtime, the thread) that
    /// created the event.
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// String-keyed metadata attached at construction time.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// The spawned task's id when inside the runtime, the thread name otherwise.
/// Thread names alone are useless there: every worker is called
/// `tokio-runtime-worker`.
fn current_origin() -> Option<String> {
    match tokio::task::try_id() {
        Some(id) => Some(format!("task-{id}")),
        None => std::thread::current().name().map(str::to_owned),
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let src = self.source.as_deref().unwrap_or("None");
        let dst = self.target.as_deref().unwrap_or("*");
        write!(
            f,
            "Event(\"{}\", [{}]->[{}], id={})",
            self.name, src, dst, self.id
        )
    }
}
