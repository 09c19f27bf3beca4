//! Wallet and points ledger data models.
//!
//! The ledger is append-only: a wallet's balance is always the sum of its
//! transaction rows, and the `UserWallet.balance` column is a materialized
//! cache updated in the same critical section as each insert.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Service-account id range; balances here may legitimately go negative.
pub const SERVICE_ACCOUNT_MIN: i64 = 2000;
pub const SERVICE_ACCOUNT_MAX: i64 = 2199;

/// Platform system account.
pub const SYSTEM_ACCOUNT: i64 = 2002;
/// Transaction fee collection account.
pub const TRANSACTION_FEE_ACCOUNT: i64 = 2104;
/// Parking fee collection account.
pub const PARKING_FEE_ACCOUNT: i64 = 2105;
/// Uber settlement account.
pub const UBER_ACCOUNT: i64 = 2107;

pub fn is_service_account(user_id: i64) -> bool {
    (SERVICE_ACCOUNT_MIN..=SERVICE_ACCOUNT_MAX).contains(&user_id)
}

/// Economic reason for a ledger row. Persisted for auditing; has no effect
/// on balance arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Purchase = 2,
    Debit = 3,
    Reward = 4,
    Refund = 5,
    Incentive = 6,
    ServiceFee = 8,
    Spend = 11,
    Transfer = 18,
}

impl ActivityType {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }
}

impl TryFrom<i32> for ActivityType {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(ActivityType::Purchase),
            3 => Ok(ActivityType::Debit),
            4 => Ok(ActivityType::Reward),
            5 => Ok(ActivityType::Refund),
            6 => Ok(ActivityType::Incentive),
            8 => Ok(ActivityType::ServiceFee),
            11 => Ok(ActivityType::Spend),
            18 => Ok(ActivityType::Transfer),
            _ => Err(format!("Invalid activity type: {}", value)),
        }
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityType::Purchase => write!(f, "purchase"),
            ActivityType::Debit => write!(f, "debit"),
            ActivityType::Reward => write!(f, "reward"),
            ActivityType::Refund => write!(f, "refund"),
            ActivityType::Incentive => write!(f, "incentive"),
            ActivityType::ServiceFee => write!(f, "service_fee"),
            ActivityType::Spend => write!(f, "spend"),
            ActivityType::Transfer => write!(f, "transfer"),
        }
    }
}

/// One user wallet. Created lazily on first touch, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserWallet {
    pub user_id: i64,
    pub balance: Decimal,
    pub auto_refill: bool,
    pub below_balance: Decimal,
    pub refill_plan_id: Option<i64>,
    pub payment_customer_id: Option<String>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl UserWallet {
    fn empty(user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Decimal::ZERO,
            auto_refill: false,
            below_balance: Decimal::ZERO,
            refill_plan_id: None,
            payment_customer_id: None,
            created_on: now,
            updated_on: now,
        }
    }
}

/// Append-only coin transaction row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: i64,
    pub user_id: i64,
    pub activity_type: ActivityType,
    /// Signed: positive credits, negative debits.
    pub points: Decimal,
    pub payer: Option<i64>,
    pub payee: Option<i64>,
    pub ref_transaction_id: Option<i64>,
    pub note: String,
    pub created_on: DateTime<Utc>,
}

/// Campaign-issued token transaction. Expired balance is retained but
/// unspendable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransaction {
    pub id: i64,
    pub user_id: i64,
    pub activity_type: ActivityType,
    pub points: Decimal,
    pub campaign_id: i64,
    pub issued_on: DateTime<Utc>,
    pub expired_on: DateTime<Utc>,
    /// Running balance for the (user, campaign) pair after this row.
    pub balance: Decimal,
    pub note: String,
    pub created_on: DateTime<Utc>,
}

/// External card charge backing a coin purchase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseTransaction {
    pub id: i64,
    pub user_id: i64,
    pub point_transaction_id: i64,
    pub points: Decimal,
    pub amount: Decimal,
    pub currency: String,
    pub external_transaction_id: String,
    pub created_on: DateTime<Utc>,
}

/// Coin suspension row. An active row forbids debits and purchases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedUser {
    pub user_id: i64,
    pub is_deleted: bool,
    pub created_on: DateTime<Utc>,
}

/// Input to a ledger write.
#[derive(Debug, Clone)]
pub struct RecordTransaction {
    pub user_id: i64,
    pub activity_type: ActivityType,
    pub points: Decimal,
    pub note: String,
    /// When both payer and payee are set, the write is a paired transfer:
    /// one row per side, posted atomically.
    pub payer: Option<i64>,
    pub payee: Option<i64>,
    pub ref_transaction_id: Option<i64>,
}

impl RecordTransaction {
    pub fn single(user_id: i64, activity_type: ActivityType, points: Decimal, note: impl Into<String>) -> Self {
        Self {
            user_id,
            activity_type,
            points,
            note: note.into(),
            payer: None,
            payee: None,
            ref_transaction_id: None,
        }
    }

    /// Paired transfer of `amount > 0` from `payer` to `payee`, reported
    /// from `user_id`'s perspective.
    pub fn transfer(
        user_id: i64,
        activity_type: ActivityType,
        amount: Decimal,
        payer: i64,
        payee: i64,
        note: impl Into<String>,
    ) -> Self {
        let points = if user_id == payee { amount } else { -amount };
        Self {
            user_id,
            activity_type,
            points,
            note: note.into(),
            payer: Some(payer),
            payee: Some(payee),
            ref_transaction_id: None,
        }
    }
}

/// Result of a ledger write: the new balance of the `user_id` side.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub transaction_id: i64,
    pub balance: Decimal,
}

/// Repository owning wallets, coin/token transactions, purchases and
/// suspension rows.
#[async_trait::async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Atomically insert the transaction row(s) and refresh the wallet
    /// balance cache. Paired transfers insert one row per side.
    async fn record(&self, tx: RecordTransaction) -> Result<LedgerEntry, String>;

    async fn get_wallet(&self, user_id: i64) -> Result<Option<UserWallet>, String>;
    /// Lazily create an empty wallet on first touch.
    async fn ensure_wallet(&self, user_id: i64) -> Result<UserWallet, String>;
    async fn update_wallet_settings(
        &self,
        user_id: i64,
        auto_refill: bool,
        below_balance: Decimal,
        refill_plan_id: Option<i64>,
    ) -> Result<UserWallet, String>;
    async fn set_auto_refill(&self, user_id: i64, enabled: bool) -> Result<(), String>;
    async fn set_payment_customer(&self, user_id: i64, customer_id: String) -> Result<(), String>;

    /// Balance derived from the transaction rows (not the cache).
    async fn derived_balance(&self, user_id: i64) -> Result<Decimal, String>;
    async fn transactions_for(&self, user_id: i64) -> Result<Vec<PointsTransaction>, String>;
    /// True when the user has ever been credited an incentive reward.
    /// A trip that passed validation but paid nothing leaves no such row.
    async fn has_incentive_credit(&self, user_id: i64) -> Result<bool, String>;

    async fn record_token_grant(
        &self,
        user_id: i64,
        campaign_id: i64,
        points: Decimal,
        expired_on: DateTime<Utc>,
        note: String,
    ) -> Result<TokenTransaction, String>;
    /// Total unexpired token balance as of `now`.
    async fn token_balance(&self, user_id: i64, now: DateTime<Utc>) -> Result<Decimal, String>;
    async fn token_transactions_for(&self, user_id: i64) -> Result<Vec<TokenTransaction>, String>;
    /// True when the user already holds a grant from the campaign.
    async fn has_token_grant(&self, user_id: i64, campaign_id: i64) -> Result<bool, String>;

    async fn record_purchase(
        &self,
        user_id: i64,
        point_transaction_id: i64,
        points: Decimal,
        amount: Decimal,
        currency: String,
        external_transaction_id: String,
    ) -> Result<PurchaseTransaction, String>;
    /// Purchases with `created_on` in `[from, to)`.
    async fn purchases_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PurchaseTransaction>, String>;

    /// Redemption (spend) totals in `[from, to)`, as a positive sum.
    async fn redeemed_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Decimal, String>;

    async fn is_blocked(&self, user_id: i64) -> Result<bool, String>;
    async fn block_user(&self, user_id: i64) -> Result<(), String>;
}

#[derive(Debug, Default)]
struct LedgerState {
    next_transaction_id: i64,
    next_token_id: i64,
    next_purchase_id: i64,
    wallets: HashMap<i64, UserWallet>,
    transactions: Vec<PointsTransaction>,
    token_transactions: Vec<TokenTransaction>,
    purchases: Vec<PurchaseTransaction>,
    blocked: HashMap<i64, BlockedUser>,
}

impl LedgerState {
    fn wallet_mut(&mut self, user_id: i64, now: DateTime<Utc>) -> &mut UserWallet {
        self.wallets
            .entry(user_id)
            .or_insert_with(|| UserWallet::empty(user_id, now))
    }

    fn insert_row(
        &mut self,
        user_id: i64,
        tx: &RecordTransaction,
        points: Decimal,
        now: DateTime<Utc>,
    ) -> i64 {
        self.next_transaction_id += 1;
        let id = self.next_transaction_id;
        self.transactions.push(PointsTransaction {
            id,
            user_id,
            activity_type: tx.activity_type,
            points,
            payer: tx.payer,
            payee: tx.payee,
            ref_transaction_id: tx.ref_transaction_id,
            note: tx.note.clone(),
            created_on: now,
        });
        let wallet = self.wallet_mut(user_id, now);
        wallet.balance += points;
        wallet.updated_on = now;
        if wallet.balance < Decimal::ZERO && !is_service_account(user_id) {
            tracing::warn!(user_id, balance = %wallet.balance, "user balance went negative");
        }
        id
    }
}

/// In-memory implementation for development and testing. A single mutex
/// makes every write a serializable critical section, which also keeps the
/// wallet balance cache in lockstep with the rows.
#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn record(&self, tx: RecordTransaction) -> Result<LedgerEntry, String> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();

        let entry_id = match (tx.payer, tx.payee) {
            (Some(payer), Some(payee)) => {
                let amount = tx.points.abs();
                let payee_id = state.insert_row(payee, &tx, amount, now);
                let payer_id = state.insert_row(payer, &tx, -amount, now);
                if tx.user_id == payer {
                    payer_id
                } else {
                    payee_id
                }
            }
            _ => state.insert_row(tx.user_id, &tx, tx.points, now),
        };

        let balance = state.wallet_mut(tx.user_id, now).balance;
        Ok(LedgerEntry {
            transaction_id: entry_id,
            balance,
        })
    }

    async fn get_wallet(&self, user_id: i64) -> Result<Option<UserWallet>, String> {
        let state = self.state.lock().unwrap();
        Ok(state.wallets.get(&user_id).cloned())
    }

    async fn ensure_wallet(&self, user_id: i64) -> Result<UserWallet, String> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        Ok(state.wallet_mut(user_id, now).clone())
    }

    async fn update_wallet_settings(
        &self,
        user_id: i64,
        auto_refill: bool,
        below_balance: Decimal,
        refill_plan_id: Option<i64>,
    ) -> Result<UserWallet, String> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let wallet = state.wallet_mut(user_id, now);
        wallet.auto_refill = auto_refill;
        wallet.below_balance = below_balance;
        wallet.refill_plan_id = refill_plan_id;
        wallet.updated_on = now;
        Ok(wallet.clone())
    }

    async fn set_auto_refill(&self, user_id: i64, enabled: bool) -> Result<(), String> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let wallet = state.wallet_mut(user_id, now);
        wallet.auto_refill = enabled;
        wallet.updated_on = now;
        Ok(())
    }

    async fn set_payment_customer(&self, user_id: i64, customer_id: String) -> Result<(), String> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let wallet = state.wallet_mut(user_id, now);
        wallet.payment_customer_id = Some(customer_id);
        wallet.updated_on = now;
        Ok(())
    }

    async fn derived_balance(&self, user_id: i64) -> Result<Decimal, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.points)
            .sum())
    }

    async fn transactions_for(&self, user_id: i64) -> Result<Vec<PointsTransaction>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn has_incentive_credit(&self, user_id: i64) -> Result<bool, String> {
        let state = self.state.lock().unwrap();
        Ok(state.transactions.iter().any(|t| {
            t.user_id == user_id
                && t.activity_type == ActivityType::Incentive
                && t.points > Decimal::ZERO
        }))
    }

    async fn record_token_grant(
        &self,
        user_id: i64,
        campaign_id: i64,
        points: Decimal,
        expired_on: DateTime<Utc>,
        note: String,
    ) -> Result<TokenTransaction, String> {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        let prior: Decimal = state
            .token_transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.campaign_id == campaign_id)
            .map(|t| t.points)
            .sum();
        state.next_token_id += 1;
        let row = TokenTransaction {
            id: state.next_token_id,
            user_id,
            activity_type: ActivityType::Reward,
            points,
            campaign_id,
            issued_on: now,
            expired_on,
            balance: prior + points,
            note,
            created_on: now,
        };
        state.token_transactions.push(row.clone());
        Ok(row)
    }

    async fn token_balance(&self, user_id: i64, now: DateTime<Utc>) -> Result<Decimal, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .token_transactions
            .iter()
            .filter(|t| t.user_id == user_id && t.expired_on > now)
            .map(|t| t.points)
            .sum())
    }

    async fn token_transactions_for(&self, user_id: i64) -> Result<Vec<TokenTransaction>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .token_transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn has_token_grant(&self, user_id: i64, campaign_id: i64) -> Result<bool, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .token_transactions
            .iter()
            .any(|t| t.user_id == user_id && t.campaign_id == campaign_id))
    }

    async fn record_purchase(
        &self,
        user_id: i64,
        point_transaction_id: i64,
        points: Decimal,
        amount: Decimal,
        currency: String,
        external_transaction_id: String,
    ) -> Result<PurchaseTransaction, String> {
        let mut state = self.state.lock().unwrap();
        state.next_purchase_id += 1;
        let row = PurchaseTransaction {
            id: state.next_purchase_id,
            user_id,
            point_transaction_id,
            points,
            amount,
            currency,
            external_transaction_id,
            created_on: Utc::now(),
        };
        state.purchases.push(row.clone());
        Ok(row)
    }

    async fn purchases_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PurchaseTransaction>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .purchases
            .iter()
            .filter(|p| p.user_id == user_id && p.created_on >= from && p.created_on < to)
            .cloned()
            .collect())
    }

    async fn redeemed_between(
        &self,
        user_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Decimal, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .transactions
            .iter()
            .filter(|t| {
                t.user_id == user_id
                    && t.activity_type == ActivityType::Spend
                    && t.points < Decimal::ZERO
                    && t.created_on >= from
                    && t.created_on < to
                    && t.payer.is_none()
            })
            .map(|t| -t.points)
            .sum())
    }

    async fn is_blocked(&self, user_id: i64) -> Result<bool, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .blocked
            .get(&user_id)
            .map(|b| !b.is_deleted)
            .unwrap_or(false))
    }

    async fn block_user(&self, user_id: i64) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.blocked.insert(
            user_id,
            BlockedUser {
                user_id,
                is_deleted: false,
                created_on: Utc::now(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wallet_balance_matches_transaction_sum() {
        let repo = InMemoryLedgerRepository::new();
        repo.record(RecordTransaction::single(
            1006,
            ActivityType::Purchase,
            Decimal::from(10),
            "buy",
        ))
        .await
        .unwrap();
        repo.record(RecordTransaction::single(
            1006,
            ActivityType::Spend,
            Decimal::from(-3),
            "spend",
        ))
        .await
        .unwrap();

        let wallet = repo.get_wallet(1006).await.unwrap().unwrap();
        let derived = repo.derived_balance(1006).await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(7));
        assert_eq!(wallet.balance, derived);
    }

    #[tokio::test]
    async fn paired_transfer_writes_both_sides() {
        let repo = InMemoryLedgerRepository::new();
        let entry = repo
            .record(RecordTransaction::transfer(
                1006,
                ActivityType::Transfer,
                Decimal::from(12),
                UBER_ACCOUNT,
                1006,
                "refund",
            ))
            .await
            .unwrap();
        assert_eq!(entry.balance, Decimal::from(12));
        assert_eq!(
            repo.derived_balance(UBER_ACCOUNT).await.unwrap(),
            Decimal::from(-12)
        );
    }

    #[tokio::test]
    async fn expired_tokens_are_unspendable_but_retained() {
        let repo = InMemoryLedgerRepository::new();
        let now = Utc::now();
        repo.record_token_grant(
            1006,
            1,
            Decimal::from(5),
            now - chrono::Duration::days(1),
            "expired".into(),
        )
        .await
        .unwrap();
        repo.record_token_grant(
            1006,
            2,
            Decimal::from(3),
            now + chrono::Duration::days(30),
            "live".into(),
        )
        .await
        .unwrap();

        assert_eq!(repo.token_balance(1006, now).await.unwrap(), Decimal::from(3));
        assert_eq!(repo.token_transactions_for(1006).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn incentive_credit_flag_ignores_other_activity() {
        let repo = InMemoryLedgerRepository::new();
        repo.record(RecordTransaction::single(
            1006,
            ActivityType::Reward,
            Decimal::ONE,
            "referral",
        ))
        .await
        .unwrap();
        assert!(!repo.has_incentive_credit(1006).await.unwrap());

        repo.record(RecordTransaction::single(
            1006,
            ActivityType::Incentive,
            Decimal::ONE,
            "trip 1 incentive",
        ))
        .await
        .unwrap();
        assert!(repo.has_incentive_credit(1006).await.unwrap());
    }

    #[tokio::test]
    async fn blocked_flag_respects_soft_delete() {
        let repo = InMemoryLedgerRepository::new();
        assert!(!repo.is_blocked(1006).await.unwrap());
        repo.block_user(1006).await.unwrap();
        assert!(repo.is_blocked(1006).await.unwrap());
    }
}
