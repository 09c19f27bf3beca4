//! External vendor adapters: ride-hailing, card processor, tier service.
//!
//! Each vendor is a trait with an HTTP implementation and a mock used in
//! development wiring and tests. All HTTP calls carry a 10 second timeout;
//! only idempotent reads are retried.

pub mod incentive_hook;
pub mod payment;
pub mod uber;

use std::sync::Mutex;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Per-call timeout for every vendor request.
pub const VENDOR_TIMEOUT_SECS: u64 = 10;

/// Consecutive failures before a vendor's circuit opens.
const BREAKER_THRESHOLD: u32 = 5;
/// How long an open circuit rejects calls before a retry is allowed.
const BREAKER_OPEN_SECS: u64 = 30;

/// Errors surfaced by vendor adapters.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("Vendor authentication failed: {0}")]
    Auth(String),
    #[error("Vendor service error: {0}")]
    Service(String),
    #[error("Duplicate vendor session")]
    DuplicateSession,
    #[error("Vendor payment error: {0}")]
    Payment(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Malformed vendor response: {0}")]
    Malformed(String),
}

impl VendorError {
    /// 5xx-class failures worth paging about.
    pub fn is_service_failure(&self) -> bool {
        matches!(self, VendorError::Service(_) | VendorError::Network(_))
    }
}

/// Monitoring hook for vendor failures. Emits a structured event the
/// alerting pipeline picks up (the Slack seam).
pub fn notify_vendor_failure(vendor: &str, error: &VendorError) {
    if error.is_service_failure() {
        tracing::error!(monitor = "vendor", vendor, error = %error, "vendor call failed");
    } else {
        tracing::warn!(vendor, error = %error, "vendor call rejected");
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Per-vendor circuit breaker: opens after a run of consecutive service
/// failures and rejects calls until the cool-down elapses.
#[derive(Debug)]
pub struct CircuitBreaker {
    vendor: &'static str,
    threshold: u32,
    open_for: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(vendor: &'static str) -> Self {
        Self {
            vendor,
            threshold: BREAKER_THRESHOLD,
            open_for: Duration::from_secs(BREAKER_OPEN_SECS),
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Reject immediately while the circuit is open.
    pub fn check(&self) -> Result<(), VendorError> {
        let mut state = self.state.lock().unwrap();
        if let Some(open_until) = state.open_until {
            if Instant::now() < open_until {
                return Err(VendorError::Service(format!(
                    "{} circuit open",
                    self.vendor
                )));
            }
            // Cool-down elapsed: allow one probe through.
            state.open_until = None;
        }
        Ok(())
    }

    /// Fold a call result through the breaker.
    pub fn track<T>(&self, result: Result<T, VendorError>) -> Result<T, VendorError> {
        let mut state = self.state.lock().unwrap();
        match &result {
            Ok(_) => {
                state.consecutive_failures = 0;
            }
            Err(e) if e.is_service_failure() => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.threshold {
                    tracing::error!(vendor = self.vendor, "circuit breaker opened");
                    state.open_until = Some(Instant::now() + self.open_for);
                    state.consecutive_failures = 0;
                }
            }
            // Business rejections (auth, payment declines) are not
            // availability signals.
            Err(_) => {}
        }
        result
    }
}
