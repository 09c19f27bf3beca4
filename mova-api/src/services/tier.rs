//! Tier service: cached lookup against the incentive-hook vendor.
//!
//! Fail-open: a vendor outage demotes nobody below green, it just returns
//! the minimum benefit and logs a warning. Failures are never cached so a
//! recovered vendor is picked up on the next call.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use mova_core::tier::{benefit_rules, BenefitRules, TierLevel};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::ApiResult;
use crate::models::benefit::BenefitRepository;
use crate::vendors::incentive_hook::TierVendor;
use crate::vendors::notify_vendor_failure;

const TIER_CACHE_TTL_SECS: u64 = 60;

/// A user's tier with the currently available ride benefit.
#[derive(Debug, Clone, Serialize)]
pub struct UserTier {
    pub level: TierLevel,
    pub points: i64,
    pub uber_benefit: Decimal,
}

pub struct TierService {
    vendor: Arc<dyn TierVendor>,
    benefits: Arc<dyn BenefitRepository>,
    cache: Cache<i64, i64>,
}

impl TierService {
    pub fn new(vendor: Arc<dyn TierVendor>, benefits: Arc<dyn BenefitRepository>) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(TIER_CACHE_TTL_SECS))
            .max_capacity(100_000)
            .build();
        Self {
            vendor,
            benefits,
            cache,
        }
    }

    /// Tier points for a user, cached for 60 seconds.
    async fn tier_points(&self, user_id: i64) -> i64 {
        if let Some(points) = self.cache.get(&user_id).await {
            return points;
        }
        match self.vendor.fetch_tier_points(user_id).await {
            Ok(tier) => {
                self.cache.insert(user_id, tier.points).await;
                tier.points
            }
            Err(e) => {
                notify_vendor_failure("incentive-hook", &e);
                tracing::warn!(user_id, "tier vendor unavailable, defaulting to green");
                0
            }
        }
    }

    /// Tier and remaining Uber benefit:
    /// `deposit(level) - used`, clamped at zero.
    pub async fn get_user_tier(&self, user_id: i64) -> ApiResult<UserTier> {
        let points = self.tier_points(user_id).await;
        let level = TierLevel::from_points(points);
        let used = self
            .benefits
            .used(user_id)
            .await
            .map_err(crate::error::ApiError::internal)?;
        let uber_benefit = (level.uber_benefit_deposit() - used).max(Decimal::ZERO);
        Ok(UserTier {
            level,
            points,
            uber_benefit,
        })
    }

    /// Static benefit rule row for a level.
    pub fn get_user_tier_benefits(&self, level: TierLevel) -> BenefitRules {
        benefit_rules(level)
    }
}
