//! The bus-facing surface handed to plugins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use flux_core::{
    BusResult, Event, EventBus, EventPattern, Handler, HandlerId, RequestResults,
};
use parking_lot::RwLock;
use serde_json::Value;

/// Per-plugin handle to the event bus and the plugin's own configuration.
///
/// Every handler registered through the context is owned by the plugin, so
/// the manager can strip them all in one call on unload. The config document
/// lives here between the store's load on plugin load and save on unload.
pub struct PluginContext {
    plugin: String,
    bus: Arc<dyn EventBus>,
    config: RwLock<Value>,
}

impl PluginContext {
    pub(crate) fn new(plugin: impl Into<String>, bus: Arc<dyn EventBus>, config: Value) -> Self {
        Self {
            plugin: plugin.into(),
            bus,
            config: RwLock::new(config),
        }
    }

    /// Name of the plugin this context belongs to.
    pub fn plugin_name(&self) -> &str {
        &self.plugin
    }

    /// Registers a handler owned by this plugin.
    pub fn register_handler(&self, pattern: EventPattern, handler: Handler) -> BusResult<HandlerId> {
        self.bus.register(pattern, handler, Some(&self.plugin))
    }

    /// Registers several handlers at once, keyed by their pattern text.
    pub fn register_handlers(
        &self,
        handlers: Vec<(EventPattern, Handler)>,
    ) -> BusResult<HashMap<String, HandlerId>> {
        self.bus.register_all(handlers, Some(&self.plugin))
    }

    /// Removes one of this plugin's handlers.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        self.bus.unregister(id)
    }

    /// Publishes an event sourced from this plugin, fire-and-forget.
    pub fn publish(&self, name: impl Into<String>, payload: Value) -> BusResult<()> {
        self.bus
            .publish(Event::new(name, payload).with_source(&self.plugin))
    }

    /// Publishes an event and awaits every matched handler's result.
    pub async fn request(
        &self,
        name: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> BusResult<RequestResults> {
        self.bus
            .request(Event::new(name, payload).with_source(&self.plugin), timeout)
            .await
    }

    /// Snapshot of the plugin's config document.
    pub fn config(&self) -> Value {
        self.config.read().clone()
    }

    /// Replaces the config document. Persisted on unload.
    pub fn set_config(&self, config: Value) {
        *self.config.write() = config;
    }

    /// Edits the config document in place. Persisted on unload.
    pub fn update_config(&self, edit: impl FnOnce(&mut Value)) {
        edit(&mut self.config.write());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_core::DirectBus;
    use serde_json::json;

    #[tokio::test]
    async fn handlers_are_owned_by_the_plugin() {
        let bus: Arc<dyn EventBus> = Arc::new(DirectBus::new());
        let ctx = PluginContext::new("greeter", Arc::clone(&bus), json!({}));

        ctx.register_handler(
            EventPattern::exact("greet"),
            Handler::new("greeter.hello", |_| async { Ok(json!("hi")) }),
        )
        .unwrap();

        let results = bus
            .request(Event::new("greet", Value::Null), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);

        assert_eq!(bus.unregister_owner("greeter"), 1);
        let results = bus
            .request(Event::new("greet", Value::Null), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn published_events_carry_the_plugin_as_source() {
        let bus: Arc<dyn EventBus> = Arc::new(DirectBus::new());
        let ctx = PluginContext::new("emitter", Arc::clone(&bus), json!({}));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        bus.register(
            EventPattern::exact("tick"),
            Handler::new("probe", move |event: Event| {
                let tx = tx.clone();
                async move {
                    tx.send(event.source().map(str::to_owned)).ok();
                    Ok(Value::Null)
                }
            }),
            None,
        )
        .unwrap();

        ctx.publish("tick", Value::Null).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Some("emitter".to_owned()));
    }

    #[test]
    fn config_edits_round_trip() {
        let bus: Arc<dyn EventBus> = Arc::new(flux_core::DirectBus::new());
        let ctx = PluginContext::new("cfg", bus, json!({"count": 1}));

        ctx.update_config(|config| {
            config["count"] = json!(2);
        });
        assert_eq!(ctx.config(), json!({"count": 2}));

        ctx.set_config(json!({}));
        assert_eq!(ctx.config(), json!({}));
    }
}
