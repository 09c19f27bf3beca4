//! Ledger service: the single write path into the points ledger.
//!
//! The ledger is a leaf component: it depends on nothing and every other
//! service calls into it. It never retries and never rejects on sign alone;
//! callers own business rules like suspension and sufficiency.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::{ApiError, ApiResult};
use crate::models::wallet::{ActivityType, LedgerEntry, LedgerRepository, RecordTransaction};

#[derive(Clone)]
pub struct LedgerService {
    repo: Arc<dyn LedgerRepository>,
}

impl LedgerService {
    pub fn new(repo: Arc<dyn LedgerRepository>) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &Arc<dyn LedgerRepository> {
        &self.repo
    }

    /// Record a transaction; paired writes post both sides atomically and
    /// return the `user_id` side's balance.
    pub async fn record_transaction(&self, tx: RecordTransaction) -> ApiResult<LedgerEntry> {
        tracing::debug!(
            user_id = tx.user_id,
            activity = %tx.activity_type,
            points = %tx.points,
            payer = ?tx.payer,
            payee = ?tx.payee,
            "ledger write"
        );
        self.repo
            .record(tx)
            .await
            .map_err(ApiError::internal)
    }

    /// Paired transfer of `amount` from `payer` to `payee`, reported from
    /// `report_user`'s side.
    pub async fn transfer(
        &self,
        report_user: i64,
        activity_type: ActivityType,
        amount: Decimal,
        payer: i64,
        payee: i64,
        note: impl Into<String>,
    ) -> ApiResult<LedgerEntry> {
        self.record_transaction(RecordTransaction::transfer(
            report_user,
            activity_type,
            amount,
            payer,
            payee,
            note,
        ))
        .await
    }

    pub async fn credit(
        &self,
        user_id: i64,
        activity_type: ActivityType,
        amount: Decimal,
        note: impl Into<String>,
    ) -> ApiResult<LedgerEntry> {
        self.record_transaction(RecordTransaction::single(user_id, activity_type, amount, note))
            .await
    }

    pub async fn balance(&self, user_id: i64) -> ApiResult<Decimal> {
        Ok(self
            .repo
            .ensure_wallet(user_id)
            .await
            .map_err(ApiError::internal)?
            .balance)
    }
}
