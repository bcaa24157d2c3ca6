//! Domain event system: lifecycle notifications for observers.
//!
//! The plugin loader and the agent loop publish here; anything interested
//! (a status UI, an audit log) subscribes without coupling to either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A plugin finished `on_load` and its tools were indexed
    PluginLoaded {
        name: String,
        version: String,
        tools: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// A plugin was unloaded and its tools retracted
    PluginUnloaded { name: String, timestamp: DateTime<Utc> },

    /// A tool was executed by the agent loop
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The backend produced a response
    ResponseGenerated {
        model: String,
        tokens_used: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::PluginLoaded {
            name: "calculator".into(),
            version: "0.1.0".into(),
            tools: vec!["calculator".into()],
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::PluginLoaded { name, tools, .. } => {
                assert_eq!(name, "calculator");
                assert_eq!(tools.len(), 1);
            }
            _ => panic!("Expected PluginLoaded event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::PluginUnloaded {
            name: "gone".into(),
            timestamp: Utc::now(),
        });
    }
}
