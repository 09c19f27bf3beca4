//! Mova TSP API server library.
//!
//! Mediates between mobile clients and upstream mobility vendors while
//! enforcing the platform's business rules: the dual-currency wallet, the
//! tier and benefit economy, guest ride settlement, trajectory-based trip
//! validation and enterprise carpool eligibility.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod vendors;
pub mod workers;
