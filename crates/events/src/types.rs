//! Event types carried on the local bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// All possible events in the sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An application event was published
    #[serde(rename = "event.published")]
    EventPublished { name: String, payload: Value },

    /// A message was pushed onto a queue
    #[serde(rename = "queue.published")]
    QueuePublished { name: String, payload: Value },

    /// The HTTP gateway is accepting requests
    #[serde(rename = "gateway.started")]
    GatewayStarted { port: u16 },

    /// Something on the bus side failed, e.g. recording an event
    #[serde(rename = "error")]
    Error {
        message: String,
        context: Option<String>,
    },
}

impl Event {
    /// Get the event or queue name, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            Event::EventPublished { name, .. } => Some(name.as_str()),
            Event::QueuePublished { name, .. } => Some(name.as_str()),
            Event::GatewayStarted { .. } => None,
            Event::Error { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::EventPublished { .. } => "event",
            Event::QueuePublished { .. } => "queue",
            Event::GatewayStarted { .. } => "gateway",
            Event::Error { .. } => "error",
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Event::EventPublished { payload, .. } | Event::QueuePublished { payload, .. } => {
                Some(payload)
            }
            _ => None,
        }
    }
}

/// Body accepted by the bus listener for events and queue messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub name: String,
    #[serde(default)]
    pub payload: Value,
}

/// Reply from the bus listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    pub id: Uuid,
    pub delivered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_envelope_creation() {
        let event = Event::EventPublished {
            name: "ping".to_string(),
            payload: json!({}),
        };
        let envelope = EventEnvelope::new(event);

        assert!(!envelope.id.is_nil());
        assert!(envelope.timestamp <= Utc::now());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::QueuePublished {
            name: "jobs".to_string(),
            payload: json!({"n": 1}),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("queue.published"));
        assert!(json.contains("jobs"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"event.published","name":"ping","payload":{"a":1}}"#;
        let event: Event = serde_json::from_str(json).unwrap();

        match event {
            Event::EventPublished { name, payload } => {
                assert_eq!(name, "ping");
                assert_eq!(payload["a"], 1);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_name() {
        let event = Event::EventPublished {
            name: "ping".to_string(),
            payload: Value::Null,
        };
        assert_eq!(event.name(), Some("ping"));
        assert_eq!(event.kind(), "event");

        let started = Event::GatewayStarted { port: 3333 };
        assert_eq!(started.name(), None);
        assert!(started.payload().is_none());
    }

    #[test]
    fn test_publish_request_default_payload() {
        let request: PublishRequest = serde_json::from_str(r#"{"name":"ping"}"#).unwrap();
        assert_eq!(request.payload, Value::Null);
    }
}
