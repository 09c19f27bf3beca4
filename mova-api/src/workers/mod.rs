//! Long-lived background workers.

pub mod validation;
