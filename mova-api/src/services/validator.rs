//! Trip validation service: drives queued validation rounds and gates
//! incentive payout on a PASS.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mova_core::validation::{validate_trip, PlannedTrip, ValidationOutcome};

use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::models::trip::{Trip, TripRepository, TripValidationQueueRow, TripValidationResult};
use crate::services::incentive::IncentiveService;

pub struct ValidationService {
    trips: Arc<dyn TripRepository>,
    incentive: Arc<IncentiveService>,
    config: Config,
}

impl ValidationService {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        incentive: Arc<IncentiveService>,
        config: Config,
    ) -> Self {
        Self {
            trips,
            incentive,
            config,
        }
    }

    /// One worker pass: lease due queue rows and process each once.
    /// Returns how many rows were processed.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> ApiResult<usize> {
        let due_before = now - Duration::hours(self.config.validation_buffer_hours);
        let rows = self
            .trips
            .lease_due_queue_rows(due_before, 50)
            .await
            .map_err(ApiError::internal)?;
        let count = rows.len();
        for row in rows {
            if let Err(e) = self.process_row(&row).await {
                tracing::error!(trip_id = row.trip_id, error = %e, "validation round failed");
                let _ = self.trips.release_queue_row(row.trip_id).await;
            }
        }
        Ok(count)
    }

    async fn process_row(&self, row: &TripValidationQueueRow) -> ApiResult<()> {
        let Some(trip) = self
            .trips
            .get_trip(row.trip_id)
            .await
            .map_err(ApiError::internal)?
        else {
            self.trips
                .delete_queue_row(row.trip_id)
                .await
                .map_err(ApiError::internal)?;
            return Ok(());
        };

        if trip.validation_complete {
            self.trips
                .delete_queue_row(row.trip_id)
                .await
                .map_err(ApiError::internal)?;
            return Ok(());
        }

        let mut trip = trip;
        let trajectory = self
            .trips
            .trajectory_for(trip.id)
            .await
            .map_err(ApiError::internal)?;
        if !trajectory.is_empty() {
            trip.trajectory_distance =
                Some(mova_core::validation::trajectory_distance_km(&trajectory));
            trip = self
                .trips
                .update_trip(trip)
                .await
                .map_err(ApiError::internal)?;
        }
        let outcome = self.validate(&trip, &trajectory);

        self.trips
            .insert_result(TripValidationResult {
                trip_id: trip.id,
                round: row.round,
                passed: outcome.passed,
                score: outcome.score,
                dimensions_json: serde_json::to_value(&outcome.details).unwrap_or_default(),
                created_on: Utc::now(),
            })
            .await
            .map_err(ApiError::internal)?;

        if outcome.passed {
            let amount = self.incentive.award_for_trip(&trip, &trajectory).await?;
            tracing::info!(
                trip_id = trip.id,
                round = row.round,
                score = outcome.score,
                amount = %amount,
                "trip validated"
            );
            self.complete(trip).await?;
        } else if row.round >= self.config.validation_round_limit {
            tracing::info!(
                trip_id = trip.id,
                round = row.round,
                "validation round limit reached; abandoning"
            );
            self.complete(trip).await?;
        } else {
            self.trips
                .bump_queue_round(trip.id)
                .await
                .map_err(ApiError::internal)?;
            self.trips
                .release_queue_row(trip.id)
                .await
                .map_err(ApiError::internal)?;
        }
        Ok(())
    }

    fn validate(&self, trip: &Trip, trajectory: &[mova_core::validation::TrajectoryPoint])
        -> ValidationOutcome {
        let plan = PlannedTrip {
            origin: trip.origin.point(),
            destination: trip.destination.point(),
            started_on: trip.started_on,
            estimated_arrival_on: trip.estimated_arrival_on,
            ended_on: trip.ended_on.unwrap_or(trip.estimated_arrival_on),
        };
        validate_trip(trip.travel_mode, &plan, trajectory)
    }

    async fn complete(&self, mut trip: Trip) -> ApiResult<()> {
        trip.validation_complete = true;
        let trip_id = trip.id;
        self.trips
            .update_trip(trip)
            .await
            .map_err(ApiError::internal)?;
        self.trips
            .delete_queue_row(trip_id)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }
}
