//! Ride-hailing orchestrator: estimates, guest booking, webhook intake and
//! end-to-end financial settlement.

use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, TimeZone, Utc};
use mova_core::geo::Point;
use mova_core::settlement::{cancellation_refund, RideSettlement};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{codes, ApiError, ApiResult};
use crate::models::benefit::BenefitRepository;
use crate::models::notifications::{DeliveryChannel, NotificationKind, NotificationRepository};
use crate::models::ridehail::{RidehailRepository, RidehailStatus, RidehailTrip};
use crate::models::wallet::{ActivityType, LedgerRepository, SYSTEM_ACCOUNT, UBER_ACCOUNT};
use crate::services::ledger::LedgerService;
use crate::services::tier::TierService;
use crate::services::wallet::{WalletService, DEFAULT_ZONE};
use crate::vendors::uber::{verify_webhook_signature, GuestTripRequest, RidehailVendor, UberProduct};
use crate::vendors::{notify_vendor_failure, VendorError};

/// Wallet currency; receipts in any other currency are rejected and their
/// settlement deferred.
const WALLET_CURRENCY: &str = "USD";

/// Booking request as received from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderGuestTripRequest {
    pub guest: GuestInfo,
    pub pickup: Coordinates,
    pub dropoff: Coordinates,
    pub ridehail_trip: RideSelection,
    #[serde(default)]
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuestInfo {
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    fn point(&self) -> Point {
        Point::new(self.lat, self.lng)
    }

    fn is_valid(&self) -> bool {
        self.lat.abs() <= 90.0 && self.lng.abs() <= 180.0
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RideSelection {
    pub product_id: String,
    pub fare_id: String,
    pub estimated_fare: Decimal,
    #[serde(default)]
    pub note_for_driver: Option<String>,
}

/// Booking response.
#[derive(Debug, Clone, Serialize)]
pub struct OrderGuestTripResponse {
    pub trip_id: i64,
    pub uber_request_id: String,
    pub benefit_applied: Decimal,
}

/// Inbound vendor webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event_id: String,
    /// Epoch seconds.
    pub event_time: i64,
    pub event_type: String,
    #[serde(default)]
    pub resource_href: Option<String>,
    pub meta: WebhookMeta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMeta {
    #[serde(default)]
    pub user_id: Option<String>,
    pub resource_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

fn status_message(status: RidehailStatus) -> &'static str {
    match status {
        RidehailStatus::Processing => "Your ride request is being processed.",
        RidehailStatus::Accepted => "Your driver accepted the trip.",
        RidehailStatus::Arriving => "Your driver is arriving.",
        RidehailStatus::InProgress => "Your trip has started.",
        RidehailStatus::Completed => "Your trip is complete.",
        RidehailStatus::Cancelled => "Your trip was cancelled.",
    }
}

pub struct RidehailService {
    rides: Arc<dyn RidehailRepository>,
    ledger_repo: Arc<dyn LedgerRepository>,
    ledger: LedgerService,
    benefits: Arc<dyn BenefitRepository>,
    notifications: Arc<dyn NotificationRepository>,
    tier: Arc<TierService>,
    wallet: Arc<WalletService>,
    vendor: Arc<dyn RidehailVendor>,
    config: Config,
}

impl RidehailService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rides: Arc<dyn RidehailRepository>,
        ledger_repo: Arc<dyn LedgerRepository>,
        benefits: Arc<dyn BenefitRepository>,
        notifications: Arc<dyn NotificationRepository>,
        tier: Arc<TierService>,
        wallet: Arc<WalletService>,
        vendor: Arc<dyn RidehailVendor>,
        config: Config,
    ) -> Self {
        Self {
            rides,
            ledger: LedgerService::new(ledger_repo.clone()),
            ledger_repo,
            benefits,
            notifications,
            tier,
            wallet,
            vendor,
            config,
        }
    }

    fn vendor_error(error: VendorError) -> ApiError {
        notify_vendor_failure("uber", &error);
        match error {
            VendorError::Auth(msg) => {
                ApiError::new(codes::VENDOR_AUTH, StatusCode::BAD_GATEWAY, format!("uber: {}", msg))
            }
            VendorError::DuplicateSession => ApiError::bad_request(
                codes::VENDOR_DUPLICATE_SESSION,
                "uber: duplicate session",
            ),
            VendorError::Payment(msg) => {
                ApiError::bad_request(codes::VENDOR_PAYMENT, format!("uber: {}", msg))
            }
            VendorError::Service(msg) | VendorError::Network(msg) | VendorError::Malformed(msg) => {
                ApiError::new(codes::VENDOR_SERVICE, StatusCode::BAD_GATEWAY, format!("uber: {}", msg))
            }
        }
    }

    /// Fare estimates for a pickup/dropoff pair, vendor order preserved.
    pub async fn estimate(&self, pickup: Coordinates, dropoff: Coordinates)
        -> ApiResult<Vec<UberProduct>> {
        if !pickup.is_valid() || !dropoff.is_valid() {
            return Err(ApiError::bad_request(
                codes::MALFORMED_REQUEST,
                "coordinates out of range",
            ));
        }
        self.vendor
            .estimate(pickup.point(), dropoff.point())
            .await
            .map_err(Self::vendor_error)
    }

    /// Book a guest ride. Funds are verified before the vendor call; the
    /// ledger legs, the benefit deposit and the ride row post only after
    /// the vendor accepts, so a vendor failure leaves no state behind.
    pub async fn order_guest_trip(
        &self,
        user_id: i64,
        request: OrderGuestTripRequest,
    ) -> ApiResult<OrderGuestTripResponse> {
        if request.guest.phone_number.trim().is_empty() {
            return Err(ApiError::missing_field("guest.phone_number"));
        }
        if request.ridehail_trip.product_id.is_empty() {
            return Err(ApiError::missing_field("ridehail_trip.product_id"));
        }
        if request.ridehail_trip.fare_id.is_empty() {
            return Err(ApiError::missing_field("ridehail_trip.fare_id"));
        }
        if !request.pickup.is_valid() || !request.dropoff.is_valid() {
            return Err(ApiError::bad_request(
                codes::MALFORMED_REQUEST,
                "coordinates out of range",
            ));
        }
        if request.ridehail_trip.estimated_fare < Decimal::ZERO {
            return Err(ApiError::bad_request(
                codes::MALFORMED_REQUEST,
                "estimated fare must not be negative",
            ));
        }

        let tier = self.tier.get_user_tier(user_id).await?;
        let benefit = tier.uber_benefit;
        let estimated_fare = request.ridehail_trip.estimated_fare;
        let required_user_funds = (estimated_fare - benefit).max(Decimal::ZERO);

        if self
            .ledger_repo
            .is_blocked(user_id)
            .await
            .map_err(ApiError::internal)?
        {
            return Err(ApiError::coin_suspended());
        }
        let wallet = self
            .ledger_repo
            .ensure_wallet(user_id)
            .await
            .map_err(ApiError::internal)?;
        if wallet.balance < required_user_funds {
            return Err(ApiError::insufficient_points());
        }

        // Vendor booking is a write: one attempt, never retried.
        let booking = self
            .vendor
            .book_guest_trip(&GuestTripRequest {
                guest_phone: request.guest.phone_number.clone(),
                pickup: request.pickup.point(),
                dropoff: request.dropoff.point(),
                product_id: request.ridehail_trip.product_id.clone(),
                fare_id: request.ridehail_trip.fare_id.clone(),
                note_for_driver: request.ridehail_trip.note_for_driver.clone(),
            })
            .await
            .map_err(Self::vendor_error)?;

        let ride = self
            .rides
            .insert(RidehailTrip {
                id: 0,
                trip_id: None,
                user_id,
                vendor_request_id: booking.request_id.clone(),
                vendor_trip_id: None,
                product_id: request.ridehail_trip.product_id,
                status: RidehailStatus::Processing,
                estimated_fare,
                actual_fare: None,
                benefit_credit_applied: benefit,
                pickup: request.pickup.point(),
                dropoff: request.dropoff.point(),
                created_on: Utc::now(),
                completed_on: None,
                last_event_time: None,
                receipt_blob: None,
                settled: false,
            })
            .await
            .map_err(ApiError::internal)?;

        let zone = request.zone.as_deref().unwrap_or(DEFAULT_ZONE);
        if required_user_funds > Decimal::ZERO {
            self.wallet
                .transfer_debit(
                    user_id,
                    required_user_funds,
                    UBER_ACCOUNT,
                    ActivityType::Spend,
                    format!("uber trip {}", ride.id),
                    zone,
                )
                .await?;
        }
        if benefit > Decimal::ZERO {
            self.benefits
                .record(user_id, benefit, Decimal::ZERO, ride.id)
                .await
                .map_err(ApiError::internal)?;
        }

        Ok(OrderGuestTripResponse {
            trip_id: ride.id,
            uber_request_id: booking.request_id,
            benefit_applied: benefit,
        })
    }

    /// Webhook entry point. Signature failures map to a bodyless 401 in the
    /// route layer; processing failures return 500 so the vendor retries,
    /// and the event id is only consumed after a fully successful pass.
    pub async fn handle_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> ApiResult<()> {
        let signature = signature
            .ok_or_else(|| ApiError::unauthorized(codes::BAD_AUTH, "missing webhook signature"))?;
        if !verify_webhook_signature(&self.config.uber_secret, raw_body, signature) {
            return Err(ApiError::unauthorized(codes::BAD_AUTH, "invalid webhook signature"));
        }

        let payload: WebhookPayload = serde_json::from_slice(raw_body).map_err(|e| {
            ApiError::bad_request(codes::MALFORMED_REQUEST, format!("bad webhook payload: {}", e))
        })?;

        if self
            .rides
            .is_event_seen(&payload.event_id)
            .await
            .map_err(ApiError::internal)?
        {
            tracing::debug!(event_id = %payload.event_id, "duplicate webhook event dropped");
            return Ok(());
        }

        let event_time = Utc
            .timestamp_opt(payload.event_time, 0)
            .single()
            .unwrap_or_else(Utc::now);

        let ride = match self
            .rides
            .find_by_vendor_request(&payload.meta.resource_id)
            .await
            .map_err(ApiError::internal)?
        {
            Some(ride) => ride,
            None => {
                tracing::warn!(
                    resource_id = %payload.meta.resource_id,
                    "webhook for unknown ride dropped"
                );
                self.consume_event(&payload.event_id).await?;
                return Ok(());
            }
        };

        if let Some(last) = ride.last_event_time {
            if event_time < last {
                tracing::warn!(ride_id = ride.id, "stale webhook event dropped");
                self.consume_event(&payload.event_id).await?;
                return Ok(());
            }
        }

        match payload.event_type.as_str() {
            "guests.trips.status_changed" => {
                self.handle_status_change(ride, &payload, event_time).await?
            }
            "guests.trips.completed" => self.handle_completed(ride, event_time).await?,
            "guests.trips.cancelled" => self.handle_cancelled(ride, event_time).await?,
            other => {
                tracing::warn!(event_type = other, "unhandled webhook event type");
            }
        }

        self.consume_event(&payload.event_id).await
    }

    async fn consume_event(&self, event_id: &str) -> ApiResult<()> {
        self.rides
            .mark_event_seen(event_id)
            .await
            .map_err(ApiError::internal)?;
        Ok(())
    }

    async fn handle_status_change(
        &self,
        mut ride: RidehailTrip,
        payload: &WebhookPayload,
        event_time: DateTime<Utc>,
    ) -> ApiResult<()> {
        let Some(raw_status) = payload.meta.status.as_deref() else {
            return Err(ApiError::missing_field("meta.status"));
        };
        let next: RidehailStatus = match raw_status.parse() {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(status = raw_status, "unknown ride status dropped");
                return Ok(());
            }
        };
        if !ride.status.can_transition_to(next) {
            tracing::warn!(
                ride_id = ride.id,
                from = %ride.status,
                to = %next,
                "illegal ride status transition dropped"
            );
            return Ok(());
        }

        ride.status = next;
        ride.last_event_time = Some(event_time);
        let user_id = ride.user_id;
        self.rides.update(ride).await.map_err(ApiError::internal)?;

        let _ = self
            .notifications
            .enqueue(
                user_id,
                NotificationKind::RideStatus,
                DeliveryChannel::Push,
                "Ride update".to_string(),
                status_message(next).to_string(),
            )
            .await;

        // The cancelled status carries the refund with it even when the
        // dedicated cancellation event never arrives.
        if next == RidehailStatus::Cancelled {
            if let Some(updated) = self
                .rides
                .find_by_vendor_request(&payload.meta.resource_id)
                .await
                .map_err(ApiError::internal)?
            {
                self.post_cancellation(updated).await?;
            }
        }
        Ok(())
    }

    async fn handle_completed(
        &self,
        mut ride: RidehailTrip,
        event_time: DateTime<Utc>,
    ) -> ApiResult<()> {
        if ride.status == RidehailStatus::Cancelled {
            tracing::warn!(ride_id = ride.id, "completion event for cancelled ride dropped");
            return Ok(());
        }
        if ride.settled {
            return Ok(());
        }

        let receipt = self
            .vendor
            .fetch_receipt(&ride.vendor_request_id)
            .await
            .map_err(|e| {
                notify_vendor_failure("uber", &e);
                ApiError::internal(format!("receipt fetch failed: {}", e))
            })?;

        if receipt.currency_code != WALLET_CURRENCY {
            // Multi-currency settlement is not supported; defer.
            return Err(ApiError::internal(format!(
                "receipt currency {} does not match wallet currency",
                receipt.currency_code
            )));
        }
        let actual_fare = receipt
            .total_charged_amount()
            .map_err(|e| ApiError::internal(format!("unparseable receipt: {}", e)))?;

        let settlement = RideSettlement::compute(
            ride.estimated_fare,
            actual_fare,
            ride.benefit_credit_applied,
        );

        if settlement.user_refund > Decimal::ZERO {
            self.ledger
                .transfer(
                    ride.user_id,
                    ActivityType::Transfer,
                    settlement.user_refund,
                    UBER_ACCOUNT,
                    ride.user_id,
                    format!("uber trip {} fare refund", ride.id),
                )
                .await?;
        }
        if settlement.user_charge > Decimal::ZERO {
            // Overrun: the debit posts even into a negative balance.
            let entry = self
                .ledger
                .transfer(
                    ride.user_id,
                    ActivityType::Transfer,
                    settlement.user_charge,
                    ride.user_id,
                    UBER_ACCOUNT,
                    format!("uber trip {} fare overrun", ride.id),
                )
                .await?;
            if entry.balance < Decimal::ZERO {
                tracing::warn!(
                    user_id = ride.user_id,
                    ride_id = ride.id,
                    balance = %entry.balance,
                    "fare overrun drove balance negative; flagged for collection"
                );
            }
        }
        if settlement.platform_payout > Decimal::ZERO {
            self.ledger
                .transfer(
                    SYSTEM_ACCOUNT,
                    ActivityType::Transfer,
                    settlement.platform_payout,
                    SYSTEM_ACCOUNT,
                    UBER_ACCOUNT,
                    format!("uber trip {} benefit payout", ride.id),
                )
                .await?;
        }
        if ride.benefit_credit_applied > Decimal::ZERO {
            self.benefits
                .record(
                    ride.user_id,
                    -settlement.benefit_used,
                    settlement.user_refund,
                    ride.id,
                )
                .await
                .map_err(ApiError::internal)?;
        }

        ride.status = RidehailStatus::Completed;
        ride.actual_fare = Some(actual_fare);
        ride.completed_on = Some(event_time);
        ride.last_event_time = Some(event_time);
        ride.receipt_blob = Some(serde_json::to_value(&receipt).unwrap_or_default());
        ride.settled = true;
        let user_id = ride.user_id;
        self.rides.update(ride).await.map_err(ApiError::internal)?;

        let _ = self
            .notifications
            .enqueue(
                user_id,
                NotificationKind::RideStatus,
                DeliveryChannel::Push,
                "Ride update".to_string(),
                status_message(RidehailStatus::Completed).to_string(),
            )
            .await;
        Ok(())
    }

    async fn handle_cancelled(
        &self,
        mut ride: RidehailTrip,
        event_time: DateTime<Utc>,
    ) -> ApiResult<()> {
        if ride.status == RidehailStatus::Completed {
            tracing::warn!(ride_id = ride.id, "cancellation for completed ride dropped");
            return Ok(());
        }
        if ride.status != RidehailStatus::Cancelled {
            ride.status = RidehailStatus::Cancelled;
            ride.last_event_time = Some(event_time);
            ride = self.rides.update(ride).await.map_err(ApiError::internal)?;
            let _ = self
                .notifications
                .enqueue(
                    ride.user_id,
                    NotificationKind::RideStatus,
                    DeliveryChannel::Push,
                    "Ride update".to_string(),
                    status_message(RidehailStatus::Cancelled).to_string(),
                )
                .await;
        }
        self.post_cancellation(ride).await
    }

    /// Cancellation refund: return everything collected at order time and
    /// offset the benefit deposit so net consumed benefit is zero. Guarded
    /// by the settled flag so replays post nothing.
    async fn post_cancellation(&self, mut ride: RidehailTrip) -> ApiResult<()> {
        if ride.settled {
            return Ok(());
        }
        let refund = cancellation_refund(ride.estimated_fare, ride.benefit_credit_applied);
        if refund > Decimal::ZERO {
            self.ledger
                .transfer(
                    ride.user_id,
                    ActivityType::Refund,
                    refund,
                    UBER_ACCOUNT,
                    ride.user_id,
                    format!("uber trip {} cancellation refund", ride.id),
                )
                .await?;
        }
        if ride.benefit_credit_applied > Decimal::ZERO {
            self.benefits
                .record(
                    ride.user_id,
                    -ride.benefit_credit_applied,
                    refund,
                    ride.id,
                )
                .await
                .map_err(ApiError::internal)?;
        }
        ride.settled = true;
        self.rides.update(ride).await.map_err(ApiError::internal)?;
        Ok(())
    }
}
