//! ms-core: shared types, errors, configuration, and event system.
//!
//! This crate is the foundational dependency for the other ms-* crates,
//! providing the library identifier, a unified error type, application
//! configuration, a broadcast event bus, and filesystem stat helpers.

pub mod config;
pub mod error;
pub mod events;
pub mod fs;
pub mod ids;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, ErrorKind, Result};
pub use ids::*;
