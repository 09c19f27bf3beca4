//! Incentive-hook vendor: the external service holding tier points.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CircuitBreaker, VendorError, VENDOR_TIMEOUT_SECS};

/// Raw tier points for a user as reported by the vendor.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TierPoints {
    pub points: i64,
}

#[async_trait]
pub trait TierVendor: Send + Sync {
    async fn fetch_tier_points(&self, user_id: i64) -> Result<TierPoints, VendorError>;
}

/// HTTP client against the incentive-hook service.
pub struct HttpTierClient {
    client: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl HttpTierClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(VENDOR_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url,
            breaker: CircuitBreaker::new("incentive-hook"),
        }
    }
}

#[async_trait]
impl TierVendor for HttpTierClient {
    async fn fetch_tier_points(&self, user_id: i64) -> Result<TierPoints, VendorError> {
        self.breaker.check()?;
        let result = async {
            let response = self
                .client
                .get(format!("{}/v2/tier/{}", self.base_url, user_id))
                .send()
                .await
                .map_err(|e| VendorError::Network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(if status.as_u16() >= 500 {
                    VendorError::Service(body)
                } else {
                    VendorError::Malformed(body)
                });
            }
            response
                .json()
                .await
                .map_err(|e| VendorError::Malformed(e.to_string()))
        }
        .await;
        self.breaker.track(result)
    }
}

/// Mock tier vendor with a static points table.
#[derive(Debug, Default)]
pub struct MockTierVendor {
    pub points: Mutex<HashMap<i64, i64>>,
    pub fail_all: Mutex<bool>,
}

impl MockTierVendor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_points(&self, user_id: i64, points: i64) {
        self.points.lock().unwrap().insert(user_id, points);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.fail_all.lock().unwrap() = unavailable;
    }
}

#[async_trait]
impl TierVendor for MockTierVendor {
    async fn fetch_tier_points(&self, user_id: i64) -> Result<TierPoints, VendorError> {
        if *self.fail_all.lock().unwrap() {
            return Err(VendorError::Service("tier service down".to_string()));
        }
        let points = self
            .points
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(0);
        Ok(TierPoints { points })
    }
}
