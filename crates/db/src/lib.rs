mod emulator;
mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use emulator::*;
pub use error::*;
pub use models::{EventRecord, Item};
pub use pool::*;
pub use repositories::*;
