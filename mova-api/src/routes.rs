//! HTTP surface: request/response DTOs, handlers and the router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::error_handling::HandleErrorLayer;
use axum::extract::{Extension, Json, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use chrono::{DateTime, Utc};
use mova_core::validation::TrajectoryPoint;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{codes, success, ApiError, ApiResult};
use crate::middleware::auth::AuthUser;
use crate::models::trip::{Place, Trip};
use crate::services::ridehail::{Coordinates, OrderGuestTripRequest};
use crate::services::wallet::DEFAULT_ZONE;
use crate::state::AppState;

type JsonResponse = ApiResult<axum::Json<serde_json::Value>>;

/// Every request carries a deadline; long operations must finish inside it
/// so no orphan work keeps writing after the response.
const REQUEST_DEADLINE_SECS: u64 = 30;

async fn handle_middleware_error(error: tower::BoxError) -> ApiError {
    if error.is::<tower::timeout::error::Elapsed>() {
        ApiError::new(
            codes::INTERNAL,
            StatusCode::REQUEST_TIMEOUT,
            "request deadline exceeded",
        )
    } else {
        ApiError::internal(error.to_string())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        // Wallet
        .route("/wallet/summary", get(wallet_summary))
        .route("/wallet/setting", put(wallet_setting))
        .route("/points/buy", post(points_buy))
        .route("/redeem", post(redeem))
        // Growth
        .route("/referral", post(referral))
        .route("/promocode", post(promocode))
        // Ride-hailing
        .route("/ridehail/estimate", post(ridehail_estimate))
        .route("/ridehail/order", post(ridehail_order))
        .route("/webhook/uber", post(uber_webhook))
        // Trips
        .route("/trip/start", post(trip_start))
        .route("/trip/end", post(trip_end))
        .route("/trip/trajectory", post(trip_trajectory))
        // Enterprise carpool
        .route("/setting_carpool_email", post(setting_carpool_email))
        .route("/verify_carpool_email.html", get(verify_carpool_email))
        .layer(Extension(state))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(tower::timeout::TimeoutLayer::new(Duration::from_secs(
                    REQUEST_DEADLINE_SECS,
                ))),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "OK"
}

// ---- wallet ----

async fn wallet_summary(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
) -> JsonResponse {
    let summary = state.wallet.get_summary(auth.user_id).await?;
    Ok(success(summary))
}

#[derive(Debug, Deserialize)]
struct WalletSettingRequest {
    auto_refill: bool,
    below_balance: Decimal,
    #[serde(default)]
    refill_plan_id: Option<i64>,
}

async fn wallet_setting(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<WalletSettingRequest>,
) -> JsonResponse {
    let summary = state
        .wallet
        .update_settings(
            auth.user_id,
            request.auto_refill,
            request.below_balance,
            request.refill_plan_id,
        )
        .await?;
    Ok(success(summary))
}

#[derive(Debug, Deserialize)]
struct BuyPointsRequest {
    product_id: i64,
    #[serde(default)]
    zone: Option<String>,
}

async fn points_buy(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<BuyPointsRequest>,
) -> JsonResponse {
    let zone = request.zone.as_deref().unwrap_or(DEFAULT_ZONE);
    let entry = state
        .wallet
        .buy_point_product(auth.user_id, request.product_id, zone)
        .await?;
    Ok(success(serde_json::json!({ "balance": entry.balance })))
}

#[derive(Debug, Deserialize)]
struct RedeemRequest {
    id: i64,
    #[serde(default)]
    zone: Option<String>,
}

async fn redeem(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<RedeemRequest>,
) -> JsonResponse {
    let zone = request.zone.as_deref().unwrap_or(DEFAULT_ZONE);
    let entry = state.wallet.redeem(auth.user_id, request.id, zone).await?;
    Ok(success(serde_json::json!({ "balance": entry.balance })))
}

// ---- growth ----

#[derive(Debug, Deserialize)]
struct ReferralRequest {
    referral_code: String,
}

async fn referral(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<ReferralRequest>,
) -> JsonResponse {
    let outcome = state
        .referral
        .apply_referral_code(auth.user_id, &request.referral_code)
        .await?;
    Ok(success(outcome))
}

#[derive(Debug, Deserialize)]
struct PromoRequest {
    promo_code: String,
}

async fn promocode(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<PromoRequest>,
) -> JsonResponse {
    let outcome = state
        .promo
        .apply_promo_code(auth.user_id, &request.promo_code)
        .await?;
    Ok(success(outcome))
}

// ---- ride-hailing ----

#[derive(Debug, Deserialize)]
struct EstimateRequest {
    pickup: Coordinates,
    dropoff: Coordinates,
}

async fn ridehail_estimate(
    Extension(state): Extension<Arc<AppState>>,
    _auth: AuthUser,
    Json(request): Json<EstimateRequest>,
) -> JsonResponse {
    let products = state
        .ridehail
        .estimate(request.pickup, request.dropoff)
        .await?;
    Ok(success(products))
}

async fn ridehail_order(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<OrderGuestTripRequest>,
) -> JsonResponse {
    let response = state.ridehail.order_guest_trip(auth.user_id, request).await?;
    Ok(success(response))
}

/// Webhook entry point. No JWT; authentication is the HMAC signature, and
/// a bad signature yields a bodyless 401.
async fn uber_webhook(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("X-Uber-Signature")
        .and_then(|v| v.to_str().ok());
    match state.ridehail.handle_webhook(&body, signature).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) if e.status == StatusCode::UNAUTHORIZED => {
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(e) => e.into_response(),
    }
}

// ---- trips ----

#[derive(Debug, Deserialize)]
struct TripStartRequest {
    travel_mode: i32,
    origin: Place,
    destination: Place,
    #[serde(default)]
    started_on: Option<DateTime<Utc>>,
    estimated_arrival_on: DateTime<Utc>,
    #[serde(default)]
    navigation_app: Option<String>,
    #[serde(default)]
    reservation_id: Option<i64>,
    #[serde(default = "default_market")]
    market: String,
}

fn default_market() -> String {
    "HCS".to_string()
}

async fn trip_start(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<TripStartRequest>,
) -> JsonResponse {
    // Mode codes are stored as the client sent them; codes without
    // validation logic fail in the validator, not here.
    let trip = state
        .trip_repo
        .insert_trip(Trip {
            id: 0,
            user_id: auth.user_id,
            travel_mode: request.travel_mode,
            origin: request.origin,
            destination: request.destination,
            started_on: request.started_on.unwrap_or_else(Utc::now),
            estimated_arrival_on: request.estimated_arrival_on,
            ended_on: None,
            trip_detail_uuid: uuid::Uuid::new_v4().to_string(),
            navigation_app: request.navigation_app,
            distance: 0.0,
            trajectory_distance: None,
            end_status: None,
            reservation_id: request.reservation_id,
            validation_complete: false,
            market: request.market,
        })
        .await
        .map_err(ApiError::internal)?;
    Ok(success(serde_json::json!({ "trip_id": trip.id })))
}

#[derive(Debug, Deserialize)]
struct TripEndRequest {
    trip_id: i64,
    distance: f64,
    ended_on: DateTime<Utc>,
    #[serde(default)]
    end_status: Option<String>,
}

async fn trip_end(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<TripEndRequest>,
) -> JsonResponse {
    let mut trip = state
        .trip_repo
        .get_trip(request.trip_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("trip not found"))?;
    if trip.user_id != auth.user_id {
        return Err(ApiError::not_found("trip not found"));
    }

    trip.ended_on = Some(request.ended_on);
    trip.distance = request.distance;
    trip.end_status = request.end_status;
    let trip = state
        .trip_repo
        .update_trip(trip)
        .await
        .map_err(ApiError::internal)?;

    // End of trip queues the first validation round; the worker waits out
    // the trajectory-upload grace period before scoring it.
    state
        .trip_repo
        .enqueue_validation(trip.id, 1)
        .await
        .map_err(ApiError::internal)?;

    Ok(success(serde_json::json!({
        "trip_id": trip.id,
        "mode": trip.travel_mode,
    })))
}

#[derive(Debug, Deserialize)]
struct TrajectoryUploadRequest {
    trip_id: i64,
    points: Vec<TrajectoryPoint>,
}

async fn trip_trajectory(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<TrajectoryUploadRequest>,
) -> JsonResponse {
    let trip = state
        .trip_repo
        .get_trip(request.trip_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("trip not found"))?;
    if trip.user_id != auth.user_id {
        return Err(ApiError::not_found("trip not found"));
    }
    let count = request.points.len();
    state
        .trip_repo
        .append_trajectory(request.trip_id, request.points)
        .await
        .map_err(ApiError::internal)?;
    Ok(success(serde_json::json!({ "accepted": count })))
}

// ---- enterprise carpool ----

#[derive(Debug, Deserialize)]
struct CarpoolEmailRequest {
    email: String,
    verify_type: String,
    #[serde(default)]
    group_id: Option<i64>,
}

async fn setting_carpool_email(
    Extension(state): Extension<Arc<AppState>>,
    auth: AuthUser,
    Json(request): Json<CarpoolEmailRequest>,
) -> JsonResponse {
    let outcome = state
        .enterprise
        .request_carpool_email_verification(
            auth.user_id,
            &request.email,
            &request.verify_type,
            request.group_id,
        )
        .await?;
    let joined = outcome == crate::services::enterprise::VerificationRequestOutcome::Joined;
    Ok(success(serde_json::json!({ "joined": joined })))
}

#[derive(Debug, Deserialize)]
struct VerifyEmailQuery {
    verify_token: String,
}

/// The only non-JSON endpoint: users open the emailed link in a browser,
/// so both arms render HTML.
async fn verify_carpool_email(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Html<String> {
    match state.enterprise.verify_email(&query.verify_token).await {
        Ok(verified) => Html(format!(
            "<!DOCTYPE html><html><head><title>Email verified</title></head>\
             <body><h1>Email verified</h1>\
             <p>{} is now linked to your carpool group.</p></body></html>",
            verified.email
        )),
        Err(e) => {
            tracing::warn!(error = %e, "carpool email verification failed");
            Html(
                "<!DOCTYPE html><html><head><title>Verification failed</title></head>\
                 <body><h1>Verification failed</h1>\
                 <p>This verification link is invalid or has expired.</p></body></html>"
                    .to_string(),
            )
        }
    }
}
