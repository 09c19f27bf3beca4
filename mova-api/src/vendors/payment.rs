//! Card processor adapter backing coin purchases and auto-refill.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{CircuitBreaker, VendorError, VENDOR_TIMEOUT_SECS};

/// Result of a card charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResult {
    pub external_transaction_id: String,
    pub status: String,
}

/// Card processor operations. Charges are writes and are never retried.
#[async_trait]
pub trait PaymentVendor: Send + Sync {
    async fn charge(
        &self,
        customer_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<ChargeResult, VendorError>;
}

/// HTTP client against the card processor.
pub struct HttpPaymentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    breaker: CircuitBreaker,
}

impl HttpPaymentClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(VENDOR_TIMEOUT_SECS))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url,
            api_key,
            breaker: CircuitBreaker::new("payment"),
        }
    }
}

#[async_trait]
impl PaymentVendor for HttpPaymentClient {
    async fn charge(
        &self,
        customer_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<ChargeResult, VendorError> {
        #[derive(Serialize)]
        struct ChargeRequest<'a> {
            customer_id: &'a str,
            amount: Decimal,
            currency: &'a str,
        }

        self.breaker.check()?;
        let result = async {
            let response = self
                .client
                .post(format!("{}/v1/charges", self.base_url))
                .bearer_auth(&self.api_key)
                .json(&ChargeRequest {
                    customer_id,
                    amount,
                    currency,
                })
                .send()
                .await
                .map_err(|e| VendorError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(match status.as_u16() {
                    401 | 403 => VendorError::Auth(body),
                    402 => VendorError::Payment(body),
                    s if s >= 500 => VendorError::Service(body),
                    _ => VendorError::Malformed(body),
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

/// Mock processor for development wiring and tests.
#[derive(Debug, Default)]
pub struct MockPaymentClient {
    pub charges: Mutex<Vec<(String, Decimal)>>,
    pub fail_next_charge: Mutex<Option<String>>,
}

impl MockPaymentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_charge_failure(&self, reason: &str) {
        *self.fail_next_charge.lock().unwrap() = Some(reason.to_string());
    }
}

#[async_trait]
impl PaymentVendor for MockPaymentClient {
    async fn charge(
        &self,
        customer_id: &str,
        amount: Decimal,
        _currency: &str,
    ) -> Result<ChargeResult, VendorError> {
        if let Some(reason) = self.fail_next_charge.lock().unwrap().take() {
            return Err(VendorError::Payment(reason));
        }
        self.charges
            .lock()
            .unwrap()
            .push((customer_id.to_string(), amount));
        Ok(ChargeResult {
            external_transaction_id: format!("ch_{}", uuid::Uuid::new_v4()),
            status: "succeeded".to_string(),
        })
    }
}
