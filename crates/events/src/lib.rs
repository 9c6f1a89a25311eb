//! Local event bus for the sandbox
//!
//! This crate provides the in-process bus, the event types carried on it,
//! and the HTTP listener functions use to publish events and queue
//! messages.

mod bus;
mod emulator;
mod types;

pub use bus::EventBus;
pub use emulator::{event_router, EventBusEmulator, EventBusHandle};
pub use types::*;
