//! Ride-hailing trip entity and its status state machine.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mova_core::geo::Point;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ride status. Terminal states reject further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RidehailStatus {
    Processing,
    Accepted,
    Arriving,
    InProgress,
    Completed,
    Cancelled,
}

impl std::fmt::Display for RidehailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RidehailStatus::Processing => write!(f, "processing"),
            RidehailStatus::Accepted => write!(f, "accepted"),
            RidehailStatus::Arriving => write!(f, "arriving"),
            RidehailStatus::InProgress => write!(f, "in_progress"),
            RidehailStatus::Completed => write!(f, "completed"),
            RidehailStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RidehailStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(RidehailStatus::Processing),
            "accepted" => Ok(RidehailStatus::Accepted),
            "arriving" => Ok(RidehailStatus::Arriving),
            "in_progress" => Ok(RidehailStatus::InProgress),
            "completed" => Ok(RidehailStatus::Completed),
            "cancelled" => Ok(RidehailStatus::Cancelled),
            _ => Err(format!("Invalid ridehail status: {}", s)),
        }
    }
}

impl RidehailStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RidehailStatus::Completed | RidehailStatus::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            RidehailStatus::Processing => 0,
            RidehailStatus::Accepted => 1,
            RidehailStatus::Arriving => 2,
            RidehailStatus::InProgress => 3,
            RidehailStatus::Completed => 4,
            RidehailStatus::Cancelled => 5,
        }
    }

    /// Legal transitions: forward along the progression (vendors may skip
    /// intermediate events) plus cancellation from any non-terminal state.
    /// Backward moves and moves out of a terminal state are illegal.
    pub fn can_transition_to(&self, next: RidehailStatus) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        next == RidehailStatus::Cancelled || next.rank() > self.rank()
    }
}

/// A guest ride booked against the vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidehailTrip {
    pub id: i64,
    /// Platform trip row this ride belongs to, when linked.
    pub trip_id: Option<i64>,
    pub user_id: i64,
    pub vendor_request_id: String,
    pub vendor_trip_id: Option<String>,
    pub product_id: String,
    pub status: RidehailStatus,
    pub estimated_fare: Decimal,
    pub actual_fare: Option<Decimal>,
    pub benefit_credit_applied: Decimal,
    pub pickup: Point,
    pub dropoff: Point,
    pub created_on: DateTime<Utc>,
    pub completed_on: Option<DateTime<Utc>>,
    /// Last applied webhook event time, for staleness checks.
    pub last_event_time: Option<DateTime<Utc>>,
    /// Raw vendor receipt for audit.
    pub receipt_blob: Option<serde_json::Value>,
    /// Whether the financial settlement (completion or cancellation) has
    /// been posted; guards against double posting on webhook replays.
    pub settled: bool,
}

#[async_trait::async_trait]
pub trait RidehailRepository: Send + Sync {
    async fn insert(&self, trip: RidehailTrip) -> Result<RidehailTrip, String>;
    async fn get(&self, id: i64) -> Result<Option<RidehailTrip>, String>;
    async fn find_by_vendor_request(&self, request_id: &str) -> Result<Option<RidehailTrip>, String>;
    async fn update(&self, trip: RidehailTrip) -> Result<RidehailTrip, String>;

    async fn is_event_seen(&self, event_id: &str) -> Result<bool, String>;
    /// Record a webhook event id; false when it was already seen.
    async fn mark_event_seen(&self, event_id: &str) -> Result<bool, String>;
}

/// In-memory implementation for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryRidehailRepository {
    trips: Mutex<HashMap<i64, RidehailTrip>>,
    next_id: Mutex<i64>,
    seen_events: Mutex<HashSet<String>>,
}

impl InMemoryRidehailRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RidehailRepository for InMemoryRidehailRepository {
    async fn insert(&self, mut trip: RidehailTrip) -> Result<RidehailTrip, String> {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        trip.id = *next;
        let mut trips = self.trips.lock().unwrap();
        trips.insert(trip.id, trip.clone());
        Ok(trip)
    }

    async fn get(&self, id: i64) -> Result<Option<RidehailTrip>, String> {
        let trips = self.trips.lock().unwrap();
        Ok(trips.get(&id).cloned())
    }

    async fn find_by_vendor_request(&self, request_id: &str) -> Result<Option<RidehailTrip>, String> {
        let trips = self.trips.lock().unwrap();
        Ok(trips
            .values()
            .find(|t| t.vendor_request_id == request_id)
            .cloned())
    }

    async fn update(&self, trip: RidehailTrip) -> Result<RidehailTrip, String> {
        let mut trips = self.trips.lock().unwrap();
        if !trips.contains_key(&trip.id) {
            return Err(format!("Ride {} not found", trip.id));
        }
        trips.insert(trip.id, trip.clone());
        Ok(trip)
    }

    async fn is_event_seen(&self, event_id: &str) -> Result<bool, String> {
        let seen = self.seen_events.lock().unwrap();
        Ok(seen.contains(event_id))
    }

    async fn mark_event_seen(&self, event_id: &str) -> Result<bool, String> {
        let mut seen = self.seen_events.lock().unwrap();
        Ok(seen.insert(event_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_progression_is_legal() {
        use RidehailStatus::*;
        assert!(Processing.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Arriving));
        assert!(Arriving.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
    }

    #[test]
    fn cancellation_from_any_non_terminal() {
        use RidehailStatus::*;
        for state in [Processing, Accepted, Arriving, InProgress] {
            assert!(state.can_transition_to(Cancelled));
        }
    }

    #[test]
    fn terminal_states_reject_transitions() {
        use RidehailStatus::*;
        assert!(!Completed.can_transition_to(Accepted));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Processing));
    }

    #[test]
    fn forward_skips_allowed_backward_rejected() {
        use RidehailStatus::*;
        assert!(Processing.can_transition_to(InProgress));
        assert!(Accepted.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(Accepted));
        assert!(!Arriving.can_transition_to(Processing));
    }
}
