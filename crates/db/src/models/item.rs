use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

/// A stored item in one of the emulated tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub table: String,
    pub partition: String,
    pub sort: Option<String>,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ItemRow {
    pub table_name: String,
    pub pk: String,
    pub sk: String,
    pub item: String,
    pub updated_at: i64,
}

impl ItemRow {
    pub fn into_domain(self) -> Item {
        Item {
            table: self.table_name,
            partition: self.pk,
            sort: (!self.sk.is_empty()).then_some(self.sk),
            value: serde_json::from_str(&self.item).unwrap_or(Value::Null),
            updated_at: timestamp_to_datetime(self.updated_at),
        }
    }
}

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).single().unwrap_or_default()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
