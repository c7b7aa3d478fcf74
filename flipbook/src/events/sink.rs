//! Event sink trait and implementations.

use async_trait::async_trait;
use std::fmt::Debug;
use tracing::{debug, info, Level};

/// An emitted event: its type and optional payload.
pub type Event = (String, Option<serde_json::Value>);

/// Receives lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync + Debug {
    /// Emits an event asynchronously.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The type of event (e.g., "run.started")
    /// * `data` - Optional event data
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// An event sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: Option<&serde_json::Value>) {
        let field = |name: &str| {
            data.and_then(|d| d.get(name))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("-")
                .to_string()
        };
        let run_id = field("run_id");
        let stage = field("stage");
        if self.level == Level::DEBUG {
            debug!(event_type, run_id = %run_id, stage = %stage, payload = ?data, "Flipbook event");
        } else {
            info!(event_type, run_id = %run_id, stage = %stage, "Flipbook event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// A collecting event sink for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<Event>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Returns the collected event types in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Payload of the most recent event of exactly `event_type`.
    #[must_use]
    pub fn last_payload(&self, event_type: &str) -> Option<serde_json::Value> {
        self.events
            .read()
            .iter()
            .rev()
            .find(|(t, _)| t == event_type)
            .and_then(|(_, data)| data.clone())
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<Event> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit("run.started", None).await;
        sink.emit("run.started", Some(serde_json::json!({"x": 1}))).await;
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit("stage.completed", Some(serde_json::json!({"stage": "image"}))).await;
        sink.emit("run.finished", None).await;
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("run.started", None).await;
        sink.emit("stage.completed", Some(serde_json::json!({"stage": "text"})))
            .await;
        sink.emit("stage.failed", None).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(
            sink.last_payload("stage.completed"),
            Some(serde_json::json!({"stage": "text"}))
        );
        assert_eq!(sink.last_payload("stage.failed"), None);
        assert_eq!(
            sink.event_types(),
            vec!["run.started", "stage.completed", "stage.failed"]
        );

        sink.clear();
        assert!(sink.is_empty());
    }
}
