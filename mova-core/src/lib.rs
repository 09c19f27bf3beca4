//! Mova TSP Core - mobility platform domain logic
//!
//! This library provides the pure domain logic for the Mova transportation
//! service provider backend: geographic primitives and geofencing, tier and
//! benefit rules, multi-party ride settlement, GPS trip validation scoring,
//! and the incentive reward draw. Everything here is deterministic and free
//! of I/O; the API crate wires it to storage and vendors.

pub mod error;
pub mod geo;
pub mod incentive;
pub mod money;
pub mod settlement;
pub mod tier;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
