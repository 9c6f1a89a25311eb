mod health;
mod sandbox;
pub mod ws;

pub use health::*;
pub use sandbox::*;
