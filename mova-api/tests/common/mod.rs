//! Shared test harness: application state over mock vendors, plus seeding
//! helpers for markets, rules and users.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mova_api::config::Config;
use mova_api::models::incentive::ServiceProfile;
use mova_api::models::referral::ReferralUser;
use mova_api::models::trip::{Place, Trip};
use mova_api::state::AppState;
use mova_api::vendors::incentive_hook::MockTierVendor;
use mova_api::vendors::payment::MockPaymentClient;
use mova_api::vendors::uber::{sign_webhook_payload, MockUberClient, VendorReceipt};
use mova_core::geo::{Point, Polygon};
use mova_core::incentive::{IncentiveRule, ModeRule};
use mova_core::validation::{TrajectoryPoint, TravelMode};
use rust_decimal::Decimal;

pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

/// Rectangle around Houston used as the HCS service area.
pub const HOUSTON_WKT: &str =
    "POLYGON ((-95.8 29.5, -95.0 29.5, -95.0 30.1, -95.8 30.1, -95.8 29.5))";

pub struct TestApp {
    pub state: Arc<AppState>,
    pub uber: Arc<MockUberClient>,
    pub payment: Arc<MockPaymentClient>,
    pub tier: Arc<MockTierVendor>,
    pub config: Config,
}

pub fn test_config() -> Config {
    let mut config = Config::from_env();
    config.jwt_secret = "test-jwt-secret".to_string();
    config.uber_secret = WEBHOOK_SECRET.to_string();
    config.daily_purchase_limit = Decimal::from(100);
    config.referral_coin = Decimal::ONE;
    config.validation_round_limit = 2;
    config.validation_buffer_hours = 24;
    config.incentive_seed = 42;
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let uber = Arc::new(MockUberClient::new());
        let payment = Arc::new(MockPaymentClient::new());
        let tier = Arc::new(MockTierVendor::new());
        let state = Arc::new(AppState::new(
            config.clone(),
            uber.clone(),
            payment.clone(),
            tier.clone(),
        ));
        Self {
            state,
            uber,
            payment,
            tier,
            config,
        }
    }

    /// Seed the HCS market: service area polygon plus an incentive rule.
    pub async fn seed_houston_market(&self) {
        self.state
            .incentive_repo
            .put_service_profile(ServiceProfile {
                market: "HCS".to_string(),
                polygon: Polygon::from_wkt(HOUSTON_WKT).unwrap(),
            })
            .await
            .unwrap();

        let mut modes = HashMap::new();
        modes.insert(
            TravelMode::Walking,
            ModeRule { distance: 0.5, mean: 0.5, min: 0.25, max: 1.0, beta: 0.05 },
        );
        modes.insert(
            TravelMode::Biking,
            ModeRule { distance: 1.0, mean: 0.75, min: 0.25, max: 2.0, beta: 0.1 },
        );
        self.state
            .incentive_repo
            .publish_rule(IncentiveRule {
                market: "HCS".to_string(),
                d: 1.0,
                h: 1.0,
                d1: 1.0,
                d2: 5.0,
                l: Decimal::from(20),
                w: Decimal::ONE,
                mc: 0.5,
                modes,
            })
            .await
            .unwrap();
    }

    /// Seed a referral-eligible user registered in Houston.
    pub async fn seed_user(&self, user_id: i64, created_ago_days: i64) {
        self.state
            .referral_repo
            .put_user(ReferralUser {
                user_id,
                created_on: Utc::now() - Duration::days(created_ago_days),
                registration_location: Some(Point::new(29.7604, -95.3698)),
                timezone: "America/Chicago".to_string(),
            })
            .await
            .unwrap();
    }

    /// Fund a wallet through the ledger (activity 4).
    pub async fn fund_wallet(&self, user_id: i64, amount: &str) {
        self.state
            .ledger
            .credit(
                user_id,
                mova_api::models::wallet::ActivityType::Reward,
                amount.parse().unwrap(),
                "test funding",
            )
            .await
            .unwrap();
    }

    pub async fn balance(&self, user_id: i64) -> Decimal {
        self.state.ledger.balance(user_id).await.unwrap()
    }

    /// A signed webhook body for the given JSON payload.
    pub fn signed_webhook(&self, payload: &serde_json::Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(payload).unwrap();
        let signature = sign_webhook_payload(WEBHOOK_SECRET, &body);
        (body, signature)
    }
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// A receipt whose `total_charged` is the given display string.
pub fn receipt(request_id: &str, total_charged: &str) -> VendorReceipt {
    VendorReceipt {
        request_id: request_id.to_string(),
        subtotal: total_charged.to_string(),
        total_charged: total_charged.to_string(),
        total_owed: None,
        currency_code: "USD".to_string(),
        charge_adjustments: vec![],
        duration: "14 minutes 9 seconds".to_string(),
        distance: "3.2 miles".to_string(),
    }
}

/// Insert a finished walking trip with a clean trajectory:
/// avg 4 km/h over 25 minutes, route ratio ~1.2 against the plan.
pub async fn seed_walking_trip(
    app: &TestApp,
    user_id: i64,
    started_ago_hours: i64,
) -> (Trip, Vec<TrajectoryPoint>) {
    let start = Utc::now() - Duration::hours(started_ago_hours);
    let total_km = 4.0 * 25.0 / 60.0;
    let direct_km = total_km / 1.2;

    let trip = app
        .state
        .trip_repo
        .insert_trip(Trip {
            id: 0,
            user_id,
            travel_mode: TravelMode::Walking.as_i32(),
            origin: place(29.7604, -95.3698),
            destination: place(29.7604 + direct_km / 111.0, -95.3698),
            started_on: start,
            estimated_arrival_on: start + Duration::minutes(30),
            ended_on: Some(start + Duration::minutes(25)),
            trip_detail_uuid: uuid::Uuid::new_v4().to_string(),
            navigation_app: None,
            distance: total_km,
            trajectory_distance: None,
            end_status: None,
            reservation_id: None,
            validation_complete: false,
            market: "HCS".to_string(),
        })
        .await
        .unwrap();

    let trajectory = straight_trajectory(start, 8, total_km, 25);
    app.state
        .trip_repo
        .append_trajectory(trip.id, trajectory.clone())
        .await
        .unwrap();
    (trip, trajectory)
}

pub fn place(lat: f64, lng: f64) -> Place {
    Place {
        lat,
        lng,
        name: String::new(),
        address: String::new(),
    }
}

/// Straight-line trajectory north from downtown Houston covering
/// `total_km` over `mins` minutes.
pub fn straight_trajectory(
    start: DateTime<Utc>,
    points: usize,
    total_km: f64,
    mins: i64,
) -> Vec<TrajectoryPoint> {
    let step_km = total_km / (points - 1) as f64;
    let step_secs = mins * 60 / (points - 1) as i64;
    (0..points)
        .map(|i| TrajectoryPoint {
            lat: 29.7604 + (i as f64 * step_km) / 111.0,
            lng: -95.3698,
            timestamp: start + Duration::seconds(step_secs * i as i64),
            speed: total_km / (mins as f64 / 60.0),
            accuracy: 5.0,
        })
        .collect()
}
