//! Wallet service: user-facing rules wrapped around the ledger.
//!
//! Enforces coin suspension, the daily purchase limit with second-offense
//! auto-suspension, the daily redeem limit, and the auto-refill trigger
//! whose failure is absorbed silently (the debit stands, auto-refill flips
//! off, a notification is queued).

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Config;
use crate::error::{codes, ApiError, ApiResult};
use crate::models::notifications::{DeliveryChannel, NotificationKind, NotificationRepository};
use crate::models::wallet::{ActivityType, LedgerEntry, LedgerRepository, RecordTransaction};
use crate::services::ledger::LedgerService;
use crate::vendors::payment::PaymentVendor;
use crate::vendors::notify_vendor_failure;

/// Zone assumed when the client does not supply one.
pub const DEFAULT_ZONE: &str = "America/Chicago";

/// A purchasable coin product.
#[derive(Debug, Clone, Serialize)]
pub struct PointProduct {
    pub id: i64,
    pub points: Decimal,
    pub amount: Decimal,
    pub currency: &'static str,
}

/// A redeemable catalog item.
#[derive(Debug, Clone, Serialize)]
pub struct RedeemItem {
    pub id: i64,
    pub name: &'static str,
    pub points: Decimal,
}

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Coin product catalog. Ids are stable; mobile clients hardcode them.
pub fn point_products() -> Vec<PointProduct> {
    vec![
        PointProduct { id: 1, points: dec("4.99"), amount: dec("4.99"), currency: "USD" },
        PointProduct { id: 2, points: dec("9.99"), amount: dec("9.99"), currency: "USD" },
        PointProduct { id: 3, points: dec("19.99"), amount: dec("19.99"), currency: "USD" },
        PointProduct { id: 4, points: dec("24.99"), amount: dec("24.99"), currency: "USD" },
        PointProduct { id: 5, points: dec("49.99"), amount: dec("49.99"), currency: "USD" },
        PointProduct { id: 6, points: dec("99"), amount: dec("99"), currency: "USD" },
    ]
}

pub fn redeem_items() -> Vec<RedeemItem> {
    vec![
        RedeemItem { id: 1, name: "$5 transit pass", points: dec("5") },
        RedeemItem { id: 2, name: "$10 gift card", points: dec("10") },
        RedeemItem { id: 3, name: "$25 gift card", points: dec("25") },
    ]
}

fn find_product(product_id: i64) -> Option<PointProduct> {
    point_products().into_iter().find(|p| p.id == product_id)
}

/// `[start, end)` of the local calendar day containing `now` in `zone`.
pub fn local_day_bounds(zone: &str, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz: Tz = zone.parse().unwrap_or(chrono_tz::America::Chicago);
    let local_date = now.with_timezone(&tz).date_naive();
    let midnight = local_date.and_time(NaiveTime::MIN);
    let start = midnight
        .and_local_timezone(tz)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);
    let next = (local_date + chrono::Duration::days(1)).and_time(NaiveTime::MIN);
    let end = next
        .and_local_timezone(tz)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);
    (start, end)
}

/// Wallet summary exposed to clients.
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub balance: BalanceSummary,
    pub auto_refill: AutoRefillSettings,
    pub payment_customer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSummary {
    pub coins: Decimal,
    pub tokens: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoRefillSettings {
    pub enabled: bool,
    pub below_balance: Decimal,
    pub refill_plan: Option<PointProduct>,
}

pub struct WalletService {
    ledger: LedgerService,
    ledger_repo: Arc<dyn LedgerRepository>,
    notifications: Arc<dyn NotificationRepository>,
    payment: Arc<dyn PaymentVendor>,
    config: Config,
}

impl WalletService {
    pub fn new(
        ledger_repo: Arc<dyn LedgerRepository>,
        notifications: Arc<dyn NotificationRepository>,
        payment: Arc<dyn PaymentVendor>,
        config: Config,
    ) -> Self {
        Self {
            ledger: LedgerService::new(ledger_repo.clone()),
            ledger_repo,
            notifications,
            payment,
            config,
        }
    }

    /// Read-only wallet summary; creates the wallet lazily.
    pub async fn get_summary(&self, user_id: i64) -> ApiResult<WalletSummary> {
        let wallet = self
            .ledger_repo
            .ensure_wallet(user_id)
            .await
            .map_err(ApiError::internal)?;
        let tokens = self
            .ledger_repo
            .token_balance(user_id, Utc::now())
            .await
            .map_err(ApiError::internal)?;
        Ok(WalletSummary {
            balance: BalanceSummary {
                coins: wallet.balance,
                tokens,
            },
            auto_refill: AutoRefillSettings {
                enabled: wallet.auto_refill,
                below_balance: wallet.below_balance,
                refill_plan: wallet.refill_plan_id.and_then(find_product),
            },
            payment_customer_id: wallet.payment_customer_id,
        })
    }

    pub async fn update_settings(
        &self,
        user_id: i64,
        auto_refill: bool,
        below_balance: Decimal,
        refill_plan_id: Option<i64>,
    ) -> ApiResult<WalletSummary> {
        if let Some(plan_id) = refill_plan_id {
            if find_product(plan_id).is_none() {
                return Err(ApiError::bad_request(
                    codes::REFILL_PLAN_NOT_FOUND,
                    format!("refill plan {} not found", plan_id),
                ));
            }
        }
        self.ledger_repo
            .update_wallet_settings(user_id, auto_refill, below_balance, refill_plan_id)
            .await
            .map_err(ApiError::internal)?;
        self.get_summary(user_id).await
    }

    pub async fn credit(
        &self,
        user_id: i64,
        amount: Decimal,
        activity_type: ActivityType,
        note: impl Into<String>,
    ) -> ApiResult<LedgerEntry> {
        self.ledger.credit(user_id, activity_type, amount, note).await
    }

    async fn ensure_not_blocked(&self, user_id: i64) -> ApiResult<()> {
        if self
            .ledger_repo
            .is_blocked(user_id)
            .await
            .map_err(ApiError::internal)?
        {
            return Err(ApiError::coin_suspended());
        }
        Ok(())
    }

    /// Debit `amount` from the user. Blocked users are rejected; the
    /// balance must cover the debit. Runs the auto-refill check afterward.
    pub async fn debit(
        &self,
        user_id: i64,
        amount: Decimal,
        activity_type: ActivityType,
        note: impl Into<String>,
        zone: &str,
    ) -> ApiResult<LedgerEntry> {
        self.ensure_not_blocked(user_id).await?;
        let wallet = self
            .ledger_repo
            .ensure_wallet(user_id)
            .await
            .map_err(ApiError::internal)?;
        if wallet.balance < amount {
            return Err(ApiError::insufficient_points());
        }
        let entry = self
            .ledger
            .record_transaction(RecordTransaction::single(
                user_id,
                activity_type,
                -amount,
                note,
            ))
            .await?;
        self.check_auto_refill(user_id, zone).await;
        Ok(entry)
    }

    /// Debit via a paired transfer to `payee` (used by the ride
    /// orchestrator), with the same rules and auto-refill check as `debit`.
    pub async fn transfer_debit(
        &self,
        user_id: i64,
        amount: Decimal,
        payee: i64,
        activity_type: ActivityType,
        note: impl Into<String>,
        zone: &str,
    ) -> ApiResult<LedgerEntry> {
        self.ensure_not_blocked(user_id).await?;
        let wallet = self
            .ledger_repo
            .ensure_wallet(user_id)
            .await
            .map_err(ApiError::internal)?;
        if wallet.balance < amount {
            return Err(ApiError::insufficient_points());
        }
        let entry = self
            .ledger
            .transfer(user_id, activity_type, amount, user_id, payee, note)
            .await?;
        self.check_auto_refill(user_id, zone).await;
        Ok(entry)
    }

    /// Auto-refill trigger. Failures here never fail the enclosing debit:
    /// auto-refill flips off and a notification is queued instead.
    async fn check_auto_refill(&self, user_id: i64, zone: &str) {
        let wallet = match self.ledger_repo.get_wallet(user_id).await {
            Ok(Some(wallet)) => wallet,
            _ => return,
        };
        if !wallet.auto_refill || wallet.balance >= wallet.below_balance {
            return;
        }
        // Without a payment customer the refill is skipped with no error
        // surface at all.
        if wallet.payment_customer_id.is_none() {
            return;
        }
        let Some(plan_id) = wallet.refill_plan_id else {
            return;
        };

        if let Err(e) = self.buy_point_product(user_id, plan_id, zone).await {
            tracing::warn!(user_id, error = %e, "auto-refill failed; disabling");
            let _ = self.ledger_repo.set_auto_refill(user_id, false).await;
            let _ = self
                .notifications
                .enqueue(
                    user_id,
                    NotificationKind::AutoRefillDisabled,
                    DeliveryChannel::Push,
                    "Auto-refill disabled".to_string(),
                    "We couldn't refill your wallet. Auto-refill has been turned off."
                        .to_string(),
                )
                .await;
        }
    }

    /// Today's card spend for the user, local to `zone`.
    async fn daily_purchase_sum(&self, user_id: i64, zone: &str) -> ApiResult<Decimal> {
        let (from, to) = local_day_bounds(zone, Utc::now());
        let purchases = self
            .ledger_repo
            .purchases_between(user_id, from, to)
            .await
            .map_err(ApiError::internal)?;
        Ok(purchases.iter().map(|p| p.amount).sum())
    }

    /// Limit warnings already sent today, local to `zone`.
    async fn limit_warnings_today(&self, user_id: i64, zone: &str) -> ApiResult<usize> {
        let (from, to) = local_day_bounds(zone, Utc::now());
        let sent = self
            .notifications
            .for_user(user_id)
            .await
            .map_err(ApiError::internal)?;
        Ok(sent
            .iter()
            .filter(|n| {
                n.kind == NotificationKind::PurchaseLimitWarning
                    && n.created_on >= from
                    && n.created_on < to
            })
            .count())
    }

    /// Purchase a coin product through the card processor, subject to the
    /// daily limit escalation:
    /// a purchase pushing the day's spend over the limit warns; a second
    /// offense in the same day suspends the user.
    pub async fn buy_point_product(
        &self,
        user_id: i64,
        product_id: i64,
        zone: &str,
    ) -> ApiResult<LedgerEntry> {
        self.ensure_not_blocked(user_id).await?;
        let product = find_product(product_id)
            .ok_or_else(|| ApiError::not_found(format!("product {} not found", product_id)))?;

        let spent_today = self.daily_purchase_sum(user_id, zone).await?;
        let limit = self.config.daily_purchase_limit;
        if spent_today + product.amount > limit {
            if self.limit_warnings_today(user_id, zone).await? >= 1 {
                // Second offense in one day: suspend and reject as suspended.
                self.ledger_repo
                    .block_user(user_id)
                    .await
                    .map_err(ApiError::internal)?;
                let _ = self
                    .notifications
                    .enqueue(
                        user_id,
                        NotificationKind::CoinSuspension,
                        DeliveryChannel::Email,
                        "Coin purchases suspended".to_string(),
                        crate::error::SUSPENSION_MESSAGE.to_string(),
                    )
                    .await;
                return Err(ApiError::coin_suspended());
            }
            let _ = self
                .notifications
                .enqueue(
                    user_id,
                    NotificationKind::PurchaseLimitWarning,
                    DeliveryChannel::Email,
                    "Daily purchase limit reached".to_string(),
                    format!("Coin purchases are limited to ${} per day.", limit),
                )
                .await;
            return Err(ApiError::bad_request(
                codes::COIN_PURCHASE_DAILY_LIMIT,
                format!("daily purchase limit of ${} exceeded", limit),
            ));
        }

        let wallet = self
            .ledger_repo
            .ensure_wallet(user_id)
            .await
            .map_err(ApiError::internal)?;
        let customer_id = wallet
            .payment_customer_id
            .unwrap_or_else(|| format!("cust_{}", user_id));

        // Card charges are writes: one attempt, no automatic retry.
        let charge = match self
            .payment
            .charge(&customer_id, product.amount, product.currency)
            .await
        {
            Ok(charge) => charge,
            Err(e) => {
                notify_vendor_failure("payment", &e);
                return Err(ApiError::bad_request(
                    codes::VENDOR_PAYMENT,
                    format!("payment failed: {}", e),
                ));
            }
        };

        let entry = self
            .ledger
            .record_transaction(RecordTransaction::single(
                user_id,
                ActivityType::Purchase,
                product.points,
                format!("purchase product {}", product.id),
            ))
            .await?;
        self.ledger_repo
            .record_purchase(
                user_id,
                entry.transaction_id,
                product.points,
                product.amount,
                product.currency.to_string(),
                charge.external_transaction_id,
            )
            .await
            .map_err(ApiError::internal)?;
        let _ = self
            .notifications
            .enqueue(
                user_id,
                NotificationKind::PurchaseConfirmation,
                DeliveryChannel::Email,
                "Coin purchase receipt".to_string(),
                format!("You bought {} Coins for ${}.", product.points, product.amount),
            )
            .await;
        Ok(entry)
    }

    /// Redeem a catalog item, subject to the daily redeem limit.
    pub async fn redeem(&self, user_id: i64, item_id: i64, zone: &str) -> ApiResult<LedgerEntry> {
        self.ensure_not_blocked(user_id).await?;
        let item = redeem_items()
            .into_iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| ApiError::not_found(format!("redeem item {} not found", item_id)))?;

        let (from, to) = local_day_bounds(zone, Utc::now());
        let redeemed_today = self
            .ledger_repo
            .redeemed_between(user_id, from, to)
            .await
            .map_err(ApiError::internal)?;
        if redeemed_today + item.points > self.config.daily_redeem_limit {
            return Err(ApiError::bad_request(
                codes::COIN_REDEEM_DAILY_LIMIT,
                "daily redeem limit exceeded",
            ));
        }

        self.debit(
            user_id,
            item.points,
            ActivityType::Spend,
            format!("redeem {}", item.name),
            zone,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_day_bounds_use_zone_midnight() {
        // 02:00 UTC is still the previous day in Houston (UTC-6/-5).
        let now = Utc.with_ymd_and_hms(2024, 3, 2, 2, 0, 0).unwrap();
        let (start, end) = local_day_bounds("America/Chicago", now);
        assert!(start <= now && now < end);
        assert_eq!((end - start).num_hours(), 24);
        let local_start = start.with_timezone(&chrono_tz::America::Chicago);
        assert_eq!(local_start.time(), NaiveTime::MIN);
    }

    #[test]
    fn unknown_zone_falls_back() {
        let now = Utc::now();
        let (start, end) = local_day_bounds("Not/AZone", now);
        assert!(start <= now && now < end);
    }

    #[test]
    fn catalog_contains_the_known_products() {
        let products = point_products();
        let p1 = products.iter().find(|p| p.id == 1).unwrap();
        assert_eq!(p1.points, dec("4.99"));
        assert_eq!(p1.amount, dec("4.99"));
        let p6 = products.iter().find(|p| p.id == 6).unwrap();
        assert_eq!(p6.amount, dec("99"));
    }
}
