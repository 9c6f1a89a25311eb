pub mod manifest;
pub mod subsystem;

pub use manifest::*;
pub use subsystem::*;
