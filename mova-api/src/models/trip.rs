//! Trips, trajectories, and the validation queue.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mova_core::geo::Point;
use mova_core::validation::TrajectoryPoint;
use serde::{Deserialize, Serialize};

/// A named place with coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
}

impl Place {
    pub fn point(&self) -> Point {
        Point::new(self.lat, self.lng)
    }
}

/// A user journey claimed by the mobile client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: i64,
    pub user_id: i64,
    /// Raw client mode code. Stored as sent; codes the platform has no
    /// validation logic for fail in the validator, not at intake.
    pub travel_mode: i32,
    pub origin: Place,
    pub destination: Place,
    pub started_on: DateTime<Utc>,
    pub estimated_arrival_on: DateTime<Utc>,
    pub ended_on: Option<DateTime<Utc>>,
    pub trip_detail_uuid: String,
    pub navigation_app: Option<String>,
    /// Client-reported distance in kilometers.
    pub distance: f64,
    /// Distance recomputed from the uploaded trajectory.
    pub trajectory_distance: Option<f64>,
    pub end_status: Option<String>,
    pub reservation_id: Option<i64>,
    pub validation_complete: bool,
    /// Market the trip belongs to, for incentive rule lookup.
    pub market: String,
}

/// One pending validation round for a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripValidationQueueRow {
    pub trip_id: i64,
    pub round: i32,
    pub is_deleted: bool,
    pub created_on: DateTime<Utc>,
}

/// Outcome of one validation round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripValidationResult {
    pub trip_id: i64,
    pub round: i32,
    pub passed: bool,
    pub score: f64,
    pub dimensions_json: serde_json::Value,
    pub created_on: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait TripRepository: Send + Sync {
    async fn insert_trip(&self, trip: Trip) -> Result<Trip, String>;
    async fn get_trip(&self, id: i64) -> Result<Option<Trip>, String>;
    async fn update_trip(&self, trip: Trip) -> Result<Trip, String>;

    async fn append_trajectory(
        &self,
        trip_id: i64,
        points: Vec<TrajectoryPoint>,
    ) -> Result<(), String>;
    async fn trajectory_for(&self, trip_id: i64) -> Result<Vec<TrajectoryPoint>, String>;

    async fn enqueue_validation(&self, trip_id: i64, round: i32) -> Result<(), String>;
    /// Lease queue rows whose trip started before `due_before`. A leased
    /// row is invisible to other consumers until released or deleted.
    async fn lease_due_queue_rows(
        &self,
        due_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TripValidationQueueRow>, String>;
    async fn release_queue_row(&self, trip_id: i64) -> Result<(), String>;
    async fn delete_queue_row(&self, trip_id: i64) -> Result<(), String>;
    async fn bump_queue_round(&self, trip_id: i64) -> Result<(), String>;

    async fn insert_result(&self, result: TripValidationResult) -> Result<(), String>;
    async fn results_for(&self, trip_id: i64) -> Result<Vec<TripValidationResult>, String>;
}

#[derive(Debug, Default)]
struct TripState {
    next_trip_id: i64,
    trips: HashMap<i64, Trip>,
    trajectories: HashMap<i64, Vec<TrajectoryPoint>>,
    queue: HashMap<i64, TripValidationQueueRow>,
    leased: HashMap<i64, bool>,
    results: Vec<TripValidationResult>,
}

/// In-memory implementation for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryTripRepository {
    state: Mutex<TripState>,
}

impl InMemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TripRepository for InMemoryTripRepository {
    async fn insert_trip(&self, mut trip: Trip) -> Result<Trip, String> {
        let mut state = self.state.lock().unwrap();
        state.next_trip_id += 1;
        trip.id = state.next_trip_id;
        state.trips.insert(trip.id, trip.clone());
        Ok(trip)
    }

    async fn get_trip(&self, id: i64) -> Result<Option<Trip>, String> {
        let state = self.state.lock().unwrap();
        Ok(state.trips.get(&id).cloned())
    }

    async fn update_trip(&self, trip: Trip) -> Result<Trip, String> {
        let mut state = self.state.lock().unwrap();
        if !state.trips.contains_key(&trip.id) {
            return Err(format!("Trip {} not found", trip.id));
        }
        state.trips.insert(trip.id, trip.clone());
        Ok(trip)
    }

    async fn append_trajectory(
        &self,
        trip_id: i64,
        points: Vec<TrajectoryPoint>,
    ) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.trajectories.entry(trip_id).or_default().extend(points);
        Ok(())
    }

    async fn trajectory_for(&self, trip_id: i64) -> Result<Vec<TrajectoryPoint>, String> {
        let state = self.state.lock().unwrap();
        Ok(state.trajectories.get(&trip_id).cloned().unwrap_or_default())
    }

    async fn enqueue_validation(&self, trip_id: i64, round: i32) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.queue.insert(
            trip_id,
            TripValidationQueueRow {
                trip_id,
                round,
                is_deleted: false,
                created_on: Utc::now(),
            },
        );
        state.leased.insert(trip_id, false);
        Ok(())
    }

    async fn lease_due_queue_rows(
        &self,
        due_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TripValidationQueueRow>, String> {
        let mut state = self.state.lock().unwrap();
        let mut due: Vec<TripValidationQueueRow> = Vec::new();
        let candidates: Vec<i64> = state
            .queue
            .values()
            .filter(|row| !row.is_deleted)
            .map(|row| row.trip_id)
            .collect();
        for trip_id in candidates {
            if due.len() >= limit {
                break;
            }
            if state.leased.get(&trip_id).copied().unwrap_or(false) {
                continue;
            }
            let started_on = match state.trips.get(&trip_id) {
                Some(trip) => trip.started_on,
                None => continue,
            };
            if started_on < due_before {
                state.leased.insert(trip_id, true);
                due.push(state.queue[&trip_id].clone());
            }
        }
        Ok(due)
    }

    async fn release_queue_row(&self, trip_id: i64) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.leased.insert(trip_id, false);
        Ok(())
    }

    async fn delete_queue_row(&self, trip_id: i64) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.queue.get_mut(&trip_id) {
            row.is_deleted = true;
        }
        state.leased.insert(trip_id, false);
        Ok(())
    }

    async fn bump_queue_round(&self, trip_id: i64) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.queue.get_mut(&trip_id) {
            row.round += 1;
        }
        Ok(())
    }

    async fn insert_result(&self, result: TripValidationResult) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if state
            .results
            .iter()
            .any(|r| r.trip_id == result.trip_id && r.round == result.round)
        {
            return Err(format!(
                "Duplicate validation result for trip {} round {}",
                result.trip_id, result.round
            ));
        }
        state.results.push(result);
        Ok(())
    }

    async fn results_for(&self, trip_id: i64) -> Result<Vec<TripValidationResult>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .results
            .iter()
            .filter(|r| r.trip_id == trip_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use mova_core::validation::TravelMode;

    fn trip(user_id: i64, started_ago_hours: i64) -> Trip {
        let start = Utc::now() - Duration::hours(started_ago_hours);
        Trip {
            id: 0,
            user_id,
            travel_mode: TravelMode::Walking.as_i32(),
            origin: Place { lat: 29.76, lng: -95.37, name: String::new(), address: String::new() },
            destination: Place { lat: 29.78, lng: -95.37, name: String::new(), address: String::new() },
            started_on: start,
            estimated_arrival_on: start + Duration::minutes(30),
            ended_on: Some(start + Duration::minutes(25)),
            trip_detail_uuid: uuid::Uuid::new_v4().to_string(),
            navigation_app: None,
            distance: 2.0,
            trajectory_distance: None,
            end_status: None,
            reservation_id: None,
            validation_complete: false,
            market: "HCS".to_string(),
        }
    }

    #[tokio::test]
    async fn leased_rows_are_invisible_until_released() {
        let repo = InMemoryTripRepository::new();
        let t = repo.insert_trip(trip(1006, 30)).await.unwrap();
        repo.enqueue_validation(t.id, 1).await.unwrap();

        let now = Utc::now();
        let first = repo.lease_due_queue_rows(now, 10).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = repo.lease_due_queue_rows(now, 10).await.unwrap();
        assert!(second.is_empty());

        repo.release_queue_row(t.id).await.unwrap();
        let third = repo.lease_due_queue_rows(now, 10).await.unwrap();
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn grace_period_hides_fresh_trips() {
        let repo = InMemoryTripRepository::new();
        let t = repo.insert_trip(trip(1006, 1)).await.unwrap();
        repo.enqueue_validation(t.id, 1).await.unwrap();

        let due_before = Utc::now() - Duration::hours(24);
        assert!(repo.lease_due_queue_rows(due_before, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_result_per_round() {
        let repo = InMemoryTripRepository::new();
        let result = TripValidationResult {
            trip_id: 1,
            round: 1,
            passed: false,
            score: 0.2,
            dimensions_json: serde_json::json!({}),
            created_on: Utc::now(),
        };
        repo.insert_result(result.clone()).await.unwrap();
        assert!(repo.insert_result(result).await.is_err());
    }
}
