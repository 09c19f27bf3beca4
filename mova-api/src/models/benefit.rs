//! Uber benefit credit ledger, independent of the coin wallet.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One benefit ledger row. `benefit_amount` is signed: deposits positive,
/// usage negative. `transaction_amount` mirrors the associated user cash
/// movement for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UberBenefitTransaction {
    pub id: i64,
    pub user_id: i64,
    pub benefit_amount: Decimal,
    pub transaction_amount: Decimal,
    /// The ride this row belongs to.
    pub transaction_id: i64,
    pub created_on: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait BenefitRepository: Send + Sync {
    async fn record(
        &self,
        user_id: i64,
        benefit_amount: Decimal,
        transaction_amount: Decimal,
        transaction_id: i64,
    ) -> Result<UberBenefitTransaction, String>;

    async fn rows_for_user(&self, user_id: i64) -> Result<Vec<UberBenefitTransaction>, String>;
    async fn rows_for_ride(&self, ride_id: i64) -> Result<Vec<UberBenefitTransaction>, String>;

    /// Consumed benefit: `-Σ benefit_amount`, clamped at zero.
    async fn used(&self, user_id: i64) -> Result<Decimal, String>;
}

/// In-memory implementation for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryBenefitRepository {
    rows: Mutex<Vec<UberBenefitTransaction>>,
}

impl InMemoryBenefitRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BenefitRepository for InMemoryBenefitRepository {
    async fn record(
        &self,
        user_id: i64,
        benefit_amount: Decimal,
        transaction_amount: Decimal,
        transaction_id: i64,
    ) -> Result<UberBenefitTransaction, String> {
        let mut rows = self.rows.lock().unwrap();
        let row = UberBenefitTransaction {
            id: rows.len() as i64 + 1,
            user_id,
            benefit_amount,
            transaction_amount,
            transaction_id,
            created_on: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn rows_for_user(&self, user_id: i64) -> Result<Vec<UberBenefitTransaction>, String> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|r| r.user_id == user_id).cloned().collect())
    }

    async fn rows_for_ride(&self, ride_id: i64) -> Result<Vec<UberBenefitTransaction>, String> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|r| r.transaction_id == ride_id)
            .cloned()
            .collect())
    }

    async fn used(&self, user_id: i64) -> Result<Decimal, String> {
        let rows = self.rows.lock().unwrap();
        let sum: Decimal = rows
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.benefit_amount)
            .sum();
        Ok((-sum).max(Decimal::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn used_clamps_at_zero() {
        let repo = InMemoryBenefitRepository::new();
        repo.record(1006, Decimal::from(4), Decimal::ZERO, 1).await.unwrap();
        assert_eq!(repo.used(1006).await.unwrap(), Decimal::ZERO);
        repo.record(1006, Decimal::from(-2), Decimal::from(12), 1).await.unwrap();
        // Deposit outweighs usage, so nothing counts as consumed.
        assert_eq!(repo.used(1006).await.unwrap(), Decimal::ZERO);
        repo.record(1006, Decimal::from(-8), Decimal::ZERO, 2).await.unwrap();
        assert_eq!(repo.used(1006).await.unwrap(), Decimal::from(6));
    }
}
