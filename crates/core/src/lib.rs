//! Shared domain types for the local sandbox.
//!
//! This crate holds the project manifest model, the seam every emulated
//! subsystem implements, and the error type the orchestration engine
//! propagates.

pub mod domain;
mod error;

pub use domain::*;
pub use error::*;
