//! Uber guest-rides vendor adapter: estimates, booking, receipts, and
//! webhook signature verification.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use mova_core::geo::Point;
use mova_core::money::parse_dollar_amount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{CircuitBreaker, VendorError, VENDOR_TIMEOUT_SECS};

type HmacSha256 = Hmac<Sha256>;

/// A bookable product returned by the estimate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UberProduct {
    pub product_id: String,
    pub display: String,
    pub fare_id: String,
    pub fare_display: String,
    pub fare_currency: String,
    pub fare_value: Decimal,
    /// Minutes until pickup.
    pub pickup_eta: i32,
    /// Trip duration estimate in minutes.
    pub trip_duration: i32,
    pub no_cars_available: bool,
}

/// Booking request for a guest rider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestTripRequest {
    pub guest_phone: String,
    pub pickup: Point,
    pub dropoff: Point,
    pub product_id: String,
    pub fare_id: String,
    pub note_for_driver: Option<String>,
}

/// Successful booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResponse {
    pub request_id: String,
}

/// Vendor receipt as delivered, amounts still display strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorReceipt {
    pub request_id: String,
    pub subtotal: String,
    pub total_charged: String,
    #[serde(default)]
    pub total_owed: Option<String>,
    pub currency_code: String,
    #[serde(default)]
    pub charge_adjustments: Vec<ChargeAdjustment>,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub distance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeAdjustment {
    pub name: String,
    pub amount: String,
    #[serde(rename = "type")]
    pub adjustment_type: String,
}

impl VendorReceipt {
    /// Parse `total_charged`; any failure rejects the receipt so settlement
    /// is deferred rather than posted from a guessed amount.
    pub fn total_charged_amount(&self) -> Result<Decimal, VendorError> {
        parse_dollar_amount(&self.total_charged)
            .map_err(|e| VendorError::Malformed(e.to_string()))
    }
}

/// Webhook signature check: hex HMAC-SHA256 of the raw body, compared in
/// constant time via the MAC verifier.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Sign a payload the way the vendor does; used by tests and the mock.
pub fn sign_webhook_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Ride-hailing vendor operations.
#[async_trait]
pub trait RidehailVendor: Send + Sync {
    async fn estimate(&self, pickup: Point, dropoff: Point)
        -> Result<Vec<UberProduct>, VendorError>;
    async fn book_guest_trip(&self, request: &GuestTripRequest)
        -> Result<BookingResponse, VendorError>;
    async fn cancel_trip(&self, request_id: &str) -> Result<(), VendorError>;
    async fn fetch_receipt(&self, request_id: &str) -> Result<VendorReceipt, VendorError>;
}

/// HTTP client against the Uber guest-rides API.
pub struct HttpUberClient {
    client: reqwest::Client,
    base_url: String,
    server_token: String,
    breaker: CircuitBreaker,
}

impl HttpUberClient {
    pub fn new(base_url: String, server_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(VENDOR_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url,
            server_token,
            breaker: CircuitBreaker::new("uber"),
        }
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> VendorError {
        match status.as_u16() {
            401 | 403 => VendorError::Auth(body),
            409 => VendorError::DuplicateSession,
            402 => VendorError::Payment(body),
            s if s >= 500 => VendorError::Service(body),
            _ => VendorError::Malformed(body),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, VendorError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.server_token)
            .send()
            .await
            .map_err(|e| VendorError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_status(status, body));
        }
        response
            .json()
            .await
            .map_err(|e| VendorError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl RidehailVendor for HttpUberClient {
    async fn estimate(
        &self,
        pickup: Point,
        dropoff: Point,
    ) -> Result<Vec<UberProduct>, VendorError> {
        #[derive(Deserialize)]
        struct EstimateRow {
            product_id: Option<String>,
            display: Option<String>,
            fare_id: Option<String>,
            fare_display: Option<String>,
            fare_currency: Option<String>,
            fare_value: Option<String>,
            pickup_eta: Option<i32>,
            trip_duration: Option<i32>,
            #[serde(default)]
            no_cars_available: bool,
        }

        let path = format!(
            "/v1/guests/trips/estimates?start_latitude={}&start_longitude={}&end_latitude={}&end_longitude={}",
            pickup.lat, pickup.lng, dropoff.lat, dropoff.lng
        );

        // Estimates are idempotent reads: retry twice with backoff.
        self.breaker.check()?;
        let mut attempt = 0;
        let rows: Vec<EstimateRow> = loop {
            match self.breaker.track(self.get_json(&path).await) {
                Ok(rows) => break rows,
                Err(e) if e.is_service_failure() && attempt < 2 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(200 * (1 << attempt))).await;
                }
                Err(e) => return Err(e),
            }
        };

        // Filter malformed rows, preserve vendor order.
        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let fare_value = row.fare_value.as_deref().and_then(|v| v.parse().ok())?;
                Some(UberProduct {
                    product_id: row.product_id?,
                    display: row.display?,
                    fare_id: row.fare_id?,
                    fare_display: row.fare_display?,
                    fare_currency: row.fare_currency?,
                    fare_value,
                    pickup_eta: row.pickup_eta.unwrap_or(0),
                    trip_duration: row.trip_duration.unwrap_or(0),
                    no_cars_available: row.no_cars_available,
                })
            })
            .collect())
    }

    async fn book_guest_trip(
        &self,
        request: &GuestTripRequest,
    ) -> Result<BookingResponse, VendorError> {
        self.breaker.check()?;
        let result = async {
            let response = self
                .client
                .post(format!("{}/v1/guests/trips", self.base_url))
                .bearer_auth(&self.server_token)
                .json(request)
                .send()
                .await
                .map_err(|e| VendorError::Network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Self::map_status(status, body));
            }
            response
                .json()
                .await
                .map_err(|e| VendorError::Malformed(e.to_string()))
        }
        .await;
        self.breaker.track(result)
    }

    async fn cancel_trip(&self, request_id: &str) -> Result<(), VendorError> {
        self.breaker.check()?;
        let result = async {
            let response = self
                .client
                .delete(format!("{}/v1/guests/trips/{}", self.base_url, request_id))
                .bearer_auth(&self.server_token)
                .send()
                .await
                .map_err(|e| VendorError::Network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Self::map_status(status, body));
            }
            Ok(())
        }
        .await;
        self.breaker.track(result)
    }

    async fn fetch_receipt(&self, request_id: &str) -> Result<VendorReceipt, VendorError> {
        self.breaker.check()?;
        let result = self
            .get_json(&format!("/v1/guests/trips/{}/receipt", request_id))
            .await;
        self.breaker.track(result)
    }
}

/// Mock vendor for development wiring and tests. Bookings succeed with
/// generated request ids unless a failure is armed; receipts are served
/// from a configured map.
#[derive(Debug, Default)]
pub struct MockUberClient {
    pub products: Mutex<Vec<UberProduct>>,
    pub receipts: Mutex<HashMap<String, VendorReceipt>>,
    pub fail_next_booking: Mutex<Option<String>>,
    pub bookings: Mutex<Vec<GuestTripRequest>>,
    pub cancellations: Mutex<Vec<String>>,
}

impl MockUberClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_booking_failure(&self, reason: &str) {
        *self.fail_next_booking.lock().unwrap() = Some(reason.to_string());
    }

    pub fn put_receipt(&self, request_id: &str, receipt: VendorReceipt) {
        self.receipts
            .lock()
            .unwrap()
            .insert(request_id.to_string(), receipt);
    }
}

#[async_trait]
impl RidehailVendor for MockUberClient {
    async fn estimate(
        &self,
        _pickup: Point,
        _dropoff: Point,
    ) -> Result<Vec<UberProduct>, VendorError> {
        Ok(self.products.lock().unwrap().clone())
    }

    async fn book_guest_trip(
        &self,
        request: &GuestTripRequest,
    ) -> Result<BookingResponse, VendorError> {
        if let Some(reason) = self.fail_next_booking.lock().unwrap().take() {
            return Err(VendorError::Service(reason));
        }
        self.bookings.lock().unwrap().push(request.clone());
        Ok(BookingResponse {
            request_id: format!("uber-req-{}", uuid::Uuid::new_v4()),
        })
    }

    async fn cancel_trip(&self, request_id: &str) -> Result<(), VendorError> {
        self.cancellations.lock().unwrap().push(request_id.to_string());
        Ok(())
    }

    async fn fetch_receipt(&self, request_id: &str) -> Result<VendorReceipt, VendorError> {
        self.receipts
            .lock()
            .unwrap()
            .get(request_id)
            .cloned()
            .ok_or_else(|| VendorError::Malformed(format!("no receipt for {}", request_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let secret = "webhook-secret";
        let body = br#"{"event_id":"e1"}"#;
        let signature = sign_webhook_payload(secret, body);
        assert!(verify_webhook_signature(secret, body, &signature));
    }

    #[test]
    fn flipped_byte_rejected() {
        let secret = "webhook-secret";
        let body = br#"{"event_id":"e1"}"#;
        let mut signature = sign_webhook_payload(secret, body);
        // Flip one hex nibble.
        let flipped = if signature.ends_with('0') { "1" } else { "0" };
        signature.replace_range(signature.len() - 1.., flipped);
        assert!(!verify_webhook_signature(secret, body, &signature));
        assert!(!verify_webhook_signature(secret, b"other body", &sign_webhook_payload(secret, body)));
        assert!(!verify_webhook_signature(secret, body, "not-hex!"));
    }

    #[test]
    fn receipt_parse_rejects_garbage() {
        let receipt = VendorReceipt {
            request_id: "r1".to_string(),
            subtotal: "$15.00".to_string(),
            total_charged: "fifteen dollars".to_string(),
            total_owed: None,
            currency_code: "USD".to_string(),
            charge_adjustments: vec![],
            duration: "14 minutes 9 seconds".to_string(),
            distance: "3.2 miles".to_string(),
        };
        assert!(receipt.total_charged_amount().is_err());
    }
}
