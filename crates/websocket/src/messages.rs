use serde::{Deserialize, Serialize};

use events::EventEnvelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { filter: Option<SubscriptionFilter> },
    Unsubscribe,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Event { envelope: EventEnvelope },
    Subscribed { filter: Option<SubscriptionFilter> },
    Unsubscribed,
    Pong,
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"failed to encode message: {e}"}}"#)
        })
    }
}

/// Restricts a subscription to the named events and queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub names: Option<Vec<String>>,
}

impl SubscriptionFilter {
    pub fn for_name(name: impl Into<String>) -> Self {
        Self {
            names: Some(vec![name.into()]),
        }
    }

    pub fn for_names(names: Vec<String>) -> Self {
        Self { names: Some(names) }
    }

    /// Unnamed events (gateway lifecycle, errors) always pass.
    pub fn matches(&self, envelope: &EventEnvelope) -> bool {
        match (&self.names, envelope.event.name()) {
            (Some(names), Some(name)) => names.iter().any(|n| n == name),
            _ => true,
        }
    }
}
