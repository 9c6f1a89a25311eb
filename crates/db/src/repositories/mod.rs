mod event_log_repository;
mod item_repository;

pub use event_log_repository::*;
pub use item_repository::*;
