use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{datetime_to_timestamp, timestamp_to_datetime};

/// An event seen on the local bus, as recorded in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRecordRow {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub payload: String,
    pub created_at: i64,
}

impl EventRecordRow {
    pub fn into_domain(self) -> EventRecord {
        EventRecord {
            id: self.id,
            kind: self.kind,
            name: self.name,
            payload: serde_json::from_str(&self.payload).unwrap_or(Value::Null),
            created_at: timestamp_to_datetime(self.created_at),
        }
    }
}

impl From<&EventRecord> for EventRecordRow {
    fn from(record: &EventRecord) -> Self {
        Self {
            id: record.id.clone(),
            kind: record.kind.clone(),
            name: record.name.clone(),
            payload: record.payload.to_string(),
            created_at: datetime_to_timestamp(record.created_at),
        }
    }
}
