//! Incentive engine tests: rule resolution, geofencing, first-trip bonus
//! eligibility and draw bounds.

mod common;

use chrono::Utc;
use common::{dec, seed_walking_trip, straight_trajectory, TestApp};
use mova_api::models::wallet::ActivityType;
use mova_core::validation::TravelMode;
use rust_decimal::Decimal;

/// Mark the user as having already earned an incentive, the way a prior
/// rewarded trip would have.
async fn seed_prior_incentive(app: &TestApp, user_id: i64) -> Decimal {
    let amount = dec("0.50");
    app.state
        .ledger
        .credit(user_id, ActivityType::Incentive, amount, "trip 900 incentive")
        .await
        .unwrap();
    amount
}

#[tokio::test]
async fn no_rule_means_no_reward() {
    let app = TestApp::new();
    // No market seeded at all.
    let (trip, trajectory) = seed_walking_trip(&app, 1006, 30).await;
    let amount = app
        .state
        .incentive
        .award_for_trip(&trip, &trajectory)
        .await
        .unwrap();
    assert_eq!(amount, Decimal::ZERO);
    assert_eq!(app.balance(1006).await, Decimal::ZERO);
}

#[tokio::test]
async fn trajectory_outside_service_area_earns_nothing() {
    let app = TestApp::new();
    app.seed_houston_market().await;
    let (trip, _) = seed_walking_trip(&app, 1006, 30).await;

    // A trajectory entirely in Austin.
    let start = Utc::now() - chrono::Duration::hours(30);
    let austin: Vec<_> = straight_trajectory(start, 8, 1.5, 25)
        .into_iter()
        .map(|mut p| {
            p.lat += 0.5;
            p.lng -= 2.4;
            p
        })
        .collect();

    let amount = app
        .state
        .incentive
        .award_for_trip(&trip, &austin)
        .await
        .unwrap();
    assert_eq!(amount, Decimal::ZERO);
}

#[tokio::test]
async fn first_coin_earning_trip_pays_the_welcome_bonus() {
    let app = TestApp::new();
    app.seed_houston_market().await;
    let (trip, trajectory) = seed_walking_trip(&app, 1006, 30).await;
    let amount = app
        .state
        .incentive
        .award_for_trip(&trip, &trajectory)
        .await
        .unwrap();
    assert_eq!(amount, Decimal::ONE);
    assert_eq!(app.balance(1006).await, Decimal::ONE);
}

#[tokio::test]
async fn zero_earning_trip_does_not_consume_the_welcome_bonus() {
    let app = TestApp::new();

    // The first trip validates in a market with no active rule and earns
    // nothing.
    let (first, trajectory) = seed_walking_trip(&app, 1006, 40).await;
    let amount = app
        .state
        .incentive
        .award_for_trip(&first, &trajectory)
        .await
        .unwrap();
    assert_eq!(amount, Decimal::ZERO);

    // Once a rule exists, the next trip is still the user's first
    // coin-earning trip and gets the welcome bonus.
    app.seed_houston_market().await;
    let (second, trajectory) = seed_walking_trip(&app, 1006, 30).await;
    let amount = app
        .state
        .incentive
        .award_for_trip(&second, &trajectory)
        .await
        .unwrap();
    assert_eq!(amount, Decimal::ONE);
}

#[tokio::test]
async fn unlisted_mode_earns_nothing_after_the_first_trip() {
    let app = TestApp::new();
    app.seed_houston_market().await;
    let seeded = seed_prior_incentive(&app, 1006).await;

    // Driving has no mode rule in the seeded market.
    let (mut trip, trajectory) = seed_walking_trip(&app, 1006, 30).await;
    trip.travel_mode = TravelMode::Driving.as_i32();
    let amount = app
        .state
        .incentive
        .award_for_trip(&trip, &trajectory)
        .await
        .unwrap();
    assert_eq!(amount, Decimal::ZERO);
    assert_eq!(app.balance(1006).await, seeded);
}

#[tokio::test]
async fn unknown_mode_code_earns_nothing_after_the_first_trip() {
    let app = TestApp::new();
    app.seed_houston_market().await;
    let seeded = seed_prior_incentive(&app, 1006).await;

    let (mut trip, trajectory) = seed_walking_trip(&app, 1006, 30).await;
    trip.travel_mode = 42;
    let amount = app
        .state
        .incentive
        .award_for_trip(&trip, &trajectory)
        .await
        .unwrap();
    assert_eq!(amount, Decimal::ZERO);
    assert_eq!(app.balance(1006).await, seeded);
}

#[tokio::test]
async fn repeated_draws_stay_within_the_mode_bounds() {
    let app = TestApp::new();
    app.seed_houston_market().await;
    let seeded = seed_prior_incentive(&app, 1006).await;
    let (trip, trajectory) = seed_walking_trip(&app, 1006, 30).await;

    // Walking rule: [0.25, 1.0], beta 0.05, transaction cap 20.
    let mut total = seeded;
    for _ in 0..200 {
        let amount = app
            .state
            .incentive
            .award_for_trip(&trip, &trajectory)
            .await
            .unwrap();
        assert!(
            amount >= "0.25".parse().unwrap() && amount <= Decimal::ONE,
            "draw out of bounds: {}",
            amount
        );
        assert_eq!(amount, amount.round_dp(2));
        total += amount;
    }
    // The ledger received every draw.
    assert_eq!(app.balance(1006).await, total);
}
