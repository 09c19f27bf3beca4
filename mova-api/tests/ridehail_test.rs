//! Ride-hailing orchestration tests: guest booking, webhook intake, fare
//! settlement and cancellation.

mod common;

use common::{dec, receipt, TestApp};
use mova_api::error::codes;
use mova_api::models::ridehail::RidehailStatus;
use mova_api::models::wallet::{SYSTEM_ACCOUNT, UBER_ACCOUNT};
use mova_api::services::ridehail::{
    Coordinates, GuestInfo, OrderGuestTripRequest, RideSelection,
};
use rust_decimal::Decimal;

fn order_request(estimated_fare: &str) -> OrderGuestTripRequest {
    OrderGuestTripRequest {
        guest: GuestInfo {
            phone_number: "+17135550100".to_string(),
        },
        pickup: Coordinates { lat: 29.7604, lng: -95.3698 },
        dropoff: Coordinates { lat: 29.9902, lng: -95.3368 },
        ridehail_trip: RideSelection {
            product_id: "uberx".to_string(),
            fare_id: "fare-1".to_string(),
            estimated_fare: estimated_fare.parse().unwrap(),
            note_for_driver: None,
        },
        zone: None,
    }
}

fn status_event(event_id: &str, request_id: &str, status: &str, event_time: i64) -> serde_json::Value {
    serde_json::json!({
        "event_id": event_id,
        "event_time": event_time,
        "event_type": "guests.trips.status_changed",
        "resource_href": format!("https://api.uber.com/v1/guests/trips/{}", request_id),
        "meta": { "user_id": "guest", "resource_id": request_id, "status": status }
    })
}

fn completed_event(event_id: &str, request_id: &str, event_time: i64) -> serde_json::Value {
    serde_json::json!({
        "event_id": event_id,
        "event_time": event_time,
        "event_type": "guests.trips.completed",
        "meta": { "resource_id": request_id }
    })
}

fn cancelled_event(event_id: &str, request_id: &str, event_time: i64) -> serde_json::Value {
    serde_json::json!({
        "event_id": event_id,
        "event_time": event_time,
        "event_type": "guests.trips.cancelled",
        "meta": { "resource_id": request_id }
    })
}

/// Book a ride for a bronze user (benefit $4) with a $50 wallet.
async fn book_bronze_ride(app: &TestApp, estimated_fare: &str) -> (i64, String) {
    app.tier.set_points(1006, 600); // bronze
    app.fund_wallet(1006, "50").await;
    let response = app
        .state
        .ridehail
        .order_guest_trip(1006, order_request(estimated_fare))
        .await
        .unwrap();
    (response.trip_id, response.uber_request_id)
}

#[tokio::test]
async fn order_debits_required_funds_and_deposits_benefit() {
    let app = TestApp::new();
    let (ride_id, request_id) = book_bronze_ride(&app, "16").await;

    // required = max(0, 16 - 4) = 12
    assert_eq!(app.balance(1006).await, dec("38"));
    assert_eq!(app.balance(UBER_ACCOUNT).await, dec("12"));

    let ride = app.state.ride_repo.get(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RidehailStatus::Processing);
    assert_eq!(ride.estimated_fare, dec("16"));
    assert_eq!(ride.benefit_credit_applied, dec("4"));
    assert_eq!(ride.vendor_request_id, request_id);

    let benefit_rows = app.state.benefit_repo.rows_for_ride(ride_id).await.unwrap();
    assert_eq!(benefit_rows.len(), 1);
    assert_eq!(benefit_rows[0].benefit_amount, dec("4"));
    assert_eq!(benefit_rows[0].transaction_amount, Decimal::ZERO);
}

#[tokio::test]
async fn order_with_insufficient_funds_rejected() {
    let app = TestApp::new();
    app.tier.set_points(1006, 0); // green, no benefit
    app.fund_wallet(1006, "5").await;
    let err = app
        .state
        .ridehail
        .order_guest_trip(1006, order_request("16"))
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::POINT_INSUFFICIENT);
    assert_eq!(app.balance(1006).await, dec("5"));
}

#[tokio::test]
async fn vendor_failure_leaves_no_state_behind() {
    let app = TestApp::new();
    app.tier.set_points(1006, 600);
    app.fund_wallet(1006, "50").await;
    app.uber.arm_booking_failure("internal error");

    let err = app
        .state
        .ridehail
        .order_guest_trip(1006, order_request("16"))
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::VENDOR_SERVICE);
    assert_eq!(app.balance(1006).await, dec("50"));
    assert_eq!(app.balance(UBER_ACCOUNT).await, Decimal::ZERO);
    assert!(app.state.benefit_repo.rows_for_user(1006).await.unwrap().is_empty());
}

#[tokio::test]
async fn completion_settles_refund_with_benefit() {
    // The canonical E=16, A=2, B=4 worked example.
    let app = TestApp::new();
    let (ride_id, request_id) = book_bronze_ride(&app, "16").await;
    assert_eq!(app.balance(1006).await, dec("38"));

    app.uber.put_receipt(&request_id, receipt(&request_id, "$2.00"));
    let (body, signature) = app.signed_webhook(&completed_event("evt-1", &request_id, 1000));
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();

    // User got the 12 back: 38 + 12 = 50.
    assert_eq!(app.balance(1006).await, dec("50"));

    // Benefit rows: the +4 deposit and the -2 usage.
    let rows = app.state.benefit_repo.rows_for_ride(ride_id).await.unwrap();
    let amounts: Vec<Decimal> = rows.iter().map(|r| r.benefit_amount).collect();
    assert_eq!(rows.len(), 2);
    assert!(amounts.contains(&dec("4")));
    assert!(amounts.contains(&dec("-2")));

    // System paid Uber exactly the consumed benefit, and Uber ends
    // holding the actual fare.
    assert_eq!(app.balance(SYSTEM_ACCOUNT).await, dec("-2"));
    assert_eq!(app.balance(UBER_ACCOUNT).await, dec("2"));

    let ride = app.state.ride_repo.get(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RidehailStatus::Completed);
    assert_eq!(ride.actual_fare, Some(dec("2.00")));
    assert!(ride.settled);
}

#[tokio::test]
async fn fare_overrun_debits_user_even_into_negative() {
    // E=6, A=20, B=4: user paid 2 up front, owes 16, short 14.
    let app = TestApp::new();
    app.tier.set_points(1007, 600);
    app.fund_wallet(1007, "3").await;
    let response = app
        .state
        .ridehail
        .order_guest_trip(1007, order_request("6"))
        .await
        .unwrap();
    let request_id = response.uber_request_id;
    assert_eq!(app.balance(1007).await, dec("1"));

    app.uber.put_receipt(&request_id, receipt(&request_id, "$20.00"));
    let (body, signature) = app.signed_webhook(&completed_event("evt-or", &request_id, 1000));
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();

    // Debited 14 more; balance goes negative and is flagged for collection.
    assert_eq!(app.balance(1007).await, dec("-13"));
    // Uber: 2 (order) + 14 (overrun) + 4 (platform benefit payout) = 20.
    assert_eq!(app.balance(UBER_ACCOUNT).await, dec("20"));
}

#[tokio::test]
async fn duplicate_completion_event_has_no_extra_effect() {
    let app = TestApp::new();
    let (ride_id, request_id) = book_bronze_ride(&app, "16").await;
    app.uber.put_receipt(&request_id, receipt(&request_id, "$2.00"));

    let (body, signature) = app.signed_webhook(&completed_event("evt-dup", &request_id, 1000));
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();
    let balance_after_first = app.balance(1006).await;

    // Same event id replayed: accepted, no additional state.
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();
    assert_eq!(app.balance(1006).await, balance_after_first);
    assert_eq!(
        app.state
            .benefit_repo
            .rows_for_ride(ride_id)
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test]
async fn cancellation_refunds_and_zeroes_benefit() {
    let app = TestApp::new();
    let (ride_id, request_id) = book_bronze_ride(&app, "16").await;
    assert_eq!(app.balance(1006).await, dec("38"));

    let (body, signature) = app.signed_webhook(&cancelled_event("evt-c", &request_id, 1000));
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();

    assert_eq!(app.balance(1006).await, dec("50"));
    assert_eq!(app.balance(UBER_ACCOUNT).await, Decimal::ZERO);

    // Exactly one deposit and one offsetting row; net benefit used is zero.
    let rows = app.state.benefit_repo.rows_for_ride(ride_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    let net: Decimal = rows.iter().map(|r| r.benefit_amount).sum();
    assert_eq!(net, Decimal::ZERO);
    assert_eq!(app.state.benefit_repo.used(1006).await.unwrap(), Decimal::ZERO);

    let ride = app.state.ride_repo.get(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RidehailStatus::Cancelled);
    assert!(ride.settled);
}

#[tokio::test]
async fn status_transitions_follow_the_state_machine() {
    let app = TestApp::new();
    let (ride_id, request_id) = book_bronze_ride(&app, "16").await;

    for (i, status) in ["accepted", "arriving", "in_progress"].iter().enumerate() {
        let (body, signature) = app.signed_webhook(&status_event(
            &format!("evt-s{}", i),
            &request_id,
            status,
            1000 + i as i64,
        ));
        app.state
            .ridehail
            .handle_webhook(&body, Some(&signature))
            .await
            .unwrap();
    }
    let ride = app.state.ride_repo.get(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RidehailStatus::InProgress);

    // Backward transition is dropped with no state change.
    let (body, signature) =
        app.signed_webhook(&status_event("evt-back", &request_id, "accepted", 1004));
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();
    let ride = app.state.ride_repo.get(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RidehailStatus::InProgress);
}

#[tokio::test]
async fn stale_events_are_dropped_by_event_time() {
    let app = TestApp::new();
    let (ride_id, request_id) = book_bronze_ride(&app, "16").await;

    let (body, signature) =
        app.signed_webhook(&status_event("evt-new", &request_id, "arriving", 2000));
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();

    // An older accepted event arrives late and is ignored.
    let (body, signature) =
        app.signed_webhook(&status_event("evt-old", &request_id, "accepted", 1000));
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();

    let ride = app.state.ride_repo.get(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.status, RidehailStatus::Arriving);
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let app = TestApp::new();
    let (_, request_id) = book_bronze_ride(&app, "16").await;

    let (body, signature) = app.signed_webhook(&status_event("evt-x", &request_id, "accepted", 1000));
    let mut bad = signature.clone();
    let flipped = if bad.ends_with('0') { "1" } else { "0" };
    bad.replace_range(bad.len() - 1.., flipped);

    let err = app
        .state
        .ridehail
        .handle_webhook(&body, Some(&bad))
        .await
        .unwrap_err();
    assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);

    let err = app.state.ridehail.handle_webhook(&body, None).await.unwrap_err();
    assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);

    // The good signature still works afterwards.
    app.state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap();
}

#[tokio::test]
async fn foreign_currency_receipt_defers_settlement() {
    let app = TestApp::new();
    let (ride_id, request_id) = book_bronze_ride(&app, "16").await;

    let mut euro_receipt = receipt(&request_id, "$2.00");
    euro_receipt.currency_code = "EUR".to_string();
    app.uber.put_receipt(&request_id, euro_receipt);

    let (body, signature) = app.signed_webhook(&completed_event("evt-eur", &request_id, 1000));
    let err = app
        .state
        .ridehail
        .handle_webhook(&body, Some(&signature))
        .await
        .unwrap_err();
    assert_eq!(err.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);

    // Nothing settled; the vendor will retry the event.
    let ride = app.state.ride_repo.get(ride_id).await.unwrap().unwrap();
    assert_eq!(ride.actual_fare, None);
    assert!(!ride.settled);
    assert_eq!(app.balance(1006).await, dec("38"));
}
