//! Error types for the core domain library

use thiserror::Error;

/// Custom error type for core domain operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid WKT geometry: {0}")]
    InvalidWkt(String),

    #[error("Invalid currency amount: {0}")]
    InvalidCurrency(String),

    #[error("Invalid incentive rule: {0}")]
    InvalidRule(String),

    #[error("Invalid travel mode: {0}")]
    InvalidTravelMode(i32),
}

/// Result type for core domain operations
pub type Result<T> = std::result::Result<T, Error>;
