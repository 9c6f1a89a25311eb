mod event_record;
mod item;

pub use event_record::*;
pub use item::*;

pub(crate) use item::{datetime_to_timestamp, timestamp_to_datetime};
