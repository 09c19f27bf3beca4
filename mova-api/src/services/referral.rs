//! Referral service: codes, the acceptance window, geofenced eligibility
//! and the tier-multiplied coin reward.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::Config;
use crate::error::{codes, ApiError, ApiResult};
use crate::models::incentive::IncentiveRepository;
use crate::models::referral::{ReferralHistory, ReferralRepository};
use crate::models::wallet::ActivityType;
use crate::services::ledger::LedgerService;
use crate::services::tier::TierService;
use crate::services::wallet::local_day_bounds;
use mova_core::money::round_cents;
use mova_core::tier::fill_toast;

/// Successful referral response.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralOutcome {
    pub referral_id: i64,
    pub toast: String,
}

/// Encode a user id as a shareable referral code.
pub fn encode_referral_code(user_id: i64) -> String {
    bs58::encode(user_id.to_be_bytes()).into_string()
}

/// Decode a referral code back to the inviter's user id.
pub fn decode_referral_code(code: &str) -> Option<i64> {
    let bytes = bs58::decode(code).into_vec().ok()?;
    if bytes.len() != 8 {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes);
    Some(i64::from_be_bytes(buf))
}

pub struct ReferralService {
    referrals: Arc<dyn ReferralRepository>,
    markets: Arc<dyn IncentiveRepository>,
    ledger: LedgerService,
    tier: Arc<TierService>,
    config: Config,
}

impl ReferralService {
    pub fn new(
        referrals: Arc<dyn ReferralRepository>,
        markets: Arc<dyn IncentiveRepository>,
        ledger: LedgerService,
        tier: Arc<TierService>,
        config: Config,
    ) -> Self {
        Self {
            referrals,
            markets,
            ledger,
            tier,
            config,
        }
    }

    /// Apply a referral code for `user_id` (the receiver).
    pub async fn apply_referral_code(
        &self,
        user_id: i64,
        code: &str,
    ) -> ApiResult<ReferralOutcome> {
        let sender_id = decode_referral_code(code).ok_or_else(|| {
            ApiError::bad_request(codes::REFERRAL_INVALID_CODE, "invalid referral code")
        })?;
        let sender = self
            .referrals
            .get_user(sender_id)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| {
                ApiError::bad_request(codes::REFERRAL_INVALID_CODE, "invalid referral code")
            })?;
        if sender_id == user_id {
            return Err(ApiError::bad_request(
                codes::REFERRAL_SELF,
                "you cannot refer yourself",
            ));
        }
        if self
            .referrals
            .for_receiver(user_id)
            .await
            .map_err(ApiError::internal)?
            .is_some()
        {
            return Err(ApiError::bad_request(
                codes::REFERRAL_ALREADY_REFERRED,
                "a referral was already applied to this account",
            ));
        }

        let receiver = self
            .referrals
            .get_user(user_id)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::not_found("user not found"))?;

        // The window is counted in local calendar days from account
        // creation: day 5 still qualifies, day 6 does not.
        let (today_start, _) = local_day_bounds(&receiver.timezone, Utc::now());
        let (created_day_start, _) = local_day_bounds(&receiver.timezone, receiver.created_on);
        let account_age_days = (today_start - created_day_start).num_days();
        if account_age_days > self.config.referral_window_days {
            return Err(ApiError::bad_request(
                codes::REFERRAL_WINDOW_EXPIRED,
                "referral codes can only be used within 5 days of signing up",
            ));
        }

        // Registration must fall inside a service area.
        let location = receiver.registration_location.ok_or_else(|| {
            ApiError::bad_request(codes::REFERRAL_NOT_ELIGIBLE, "account is outside service areas")
        })?;
        let profiles = self
            .markets
            .service_profiles()
            .await
            .map_err(ApiError::internal)?;
        if !profiles.iter().any(|p| p.polygon.contains(location)) {
            return Err(ApiError::bad_request(
                codes::REFERRAL_NOT_ELIGIBLE,
                "account is outside service areas",
            ));
        }

        let receiver_tier = self.tier.get_user_tier(user_id).await?;
        let receiver_rules = self.tier.get_user_tier_benefits(receiver_tier.level);
        let receiver_reward =
            round_cents(self.config.referral_coin * receiver_rules.referral_multiplier);

        let sender_tier = self.tier.get_user_tier(sender.user_id).await?;
        let sender_rules = self.tier.get_user_tier_benefits(sender_tier.level);
        let sender_reward =
            round_cents(self.config.referral_coin * sender_rules.referral_multiplier);

        self.ledger
            .credit(
                user_id,
                ActivityType::Reward,
                receiver_reward,
                format!("referral reward from {}", sender.user_id),
            )
            .await?;
        self.ledger
            .credit(
                sender.user_id,
                ActivityType::Reward,
                sender_reward,
                format!("referral reward for inviting {}", user_id),
            )
            .await?;

        let row = self
            .referrals
            .insert(ReferralHistory {
                id: 0,
                sender_user_id: sender.user_id,
                receiver_user_id: user_id,
                referral_code: code.to_string(),
                reward_amount: receiver_reward,
                created_on: Utc::now(),
            })
            .await
            .map_err(|_| {
                ApiError::bad_request(
                    codes::REFERRAL_ALREADY_REFERRED,
                    "a referral was already applied to this account",
                )
            })?;

        Ok(ReferralOutcome {
            referral_id: row.id,
            toast: fill_toast(receiver_rules.toast, receiver_reward),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referral_code_round_trip() {
        let code = encode_referral_code(1005);
        assert_eq!(decode_referral_code(&code), Some(1005));
        assert_eq!(decode_referral_code("not-a-code!"), None);
        assert_eq!(decode_referral_code(""), None);
    }
}
