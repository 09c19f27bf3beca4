//! Incentive engine: converts validated trips into coin rewards.

use std::sync::{Arc, Mutex};

use mova_core::geo::Point;
use mova_core::incentive::draw_reward;
use mova_core::validation::{TrajectoryPoint, TravelMode};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;

use crate::error::{ApiError, ApiResult};
use crate::models::incentive::IncentiveRepository;
use crate::models::trip::Trip;
use crate::models::wallet::ActivityType;
use crate::services::ledger::LedgerService;

pub struct IncentiveService {
    rules: Arc<dyn IncentiveRepository>,
    ledger: LedgerService,
    /// Seeded once per process so the draw sequence is reproducible.
    rng: Mutex<StdRng>,
}

impl IncentiveService {
    pub fn new(rules: Arc<dyn IncentiveRepository>, ledger: LedgerService, seed: u64) -> Self {
        Self {
            rules,
            ledger,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Award coins for a validated trip. Returns the credited amount;
    /// zero means the trip earned nothing (no rule, outside the service
    /// area, or no mode rule). A user's first coin-earning trip pays the
    /// rule's welcome bonus instead of a draw; eligibility comes from the
    /// ledger, so trips that validated but earned nothing don't consume it.
    pub async fn award_for_trip(
        &self,
        trip: &Trip,
        trajectory: &[TrajectoryPoint],
    ) -> ApiResult<Decimal> {
        let Some(rule) = self
            .rules
            .active_rule(&trip.market)
            .await
            .map_err(ApiError::internal)?
        else {
            return Ok(Decimal::ZERO);
        };

        let Some(profile) = self
            .rules
            .service_profile(&trip.market)
            .await
            .map_err(ApiError::internal)?
        else {
            tracing::warn!(market = %trip.market, "no service profile; trip not rewarded");
            return Ok(Decimal::ZERO);
        };
        let path: Vec<Point> = trajectory.iter().map(TrajectoryPoint::point).collect();
        if !profile.polygon.intersects_path(&path) {
            return Ok(Decimal::ZERO);
        }

        let is_first_trip = !self
            .ledger
            .repo()
            .has_incentive_credit(trip.user_id)
            .await
            .map_err(ApiError::internal)?;

        let amount = if is_first_trip {
            rule.w
        } else {
            let Some(mode_rule) = TravelMode::try_from(trip.travel_mode)
                .ok()
                .and_then(|mode| rule.mode_rule(mode))
            else {
                return Ok(Decimal::ZERO);
            };
            let mut rng = self.rng.lock().unwrap();
            draw_reward(&mut *rng, mode_rule, rule.l)
        };

        if amount > Decimal::ZERO {
            self.ledger
                .credit(
                    trip.user_id,
                    ActivityType::Incentive,
                    amount,
                    format!("trip {} incentive", trip.id),
                )
                .await?;
            tracing::info!(
                user_id = trip.user_id,
                trip_id = trip.id,
                amount = %amount,
                first_trip = is_first_trip,
                "incentive awarded"
            );
        }
        Ok(amount)
    }
}
