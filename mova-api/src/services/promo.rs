//! Promo codes: campaign lookup and one-shot grants of coins or tokens.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{codes, ApiError, ApiResult};
use crate::models::wallet::{ActivityType, LedgerRepository};
use crate::services::ledger::LedgerService;

/// What a campaign grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoGrant {
    Coins,
    Tokens,
}

#[derive(Debug, Clone)]
pub struct PromoCampaign {
    pub id: i64,
    pub code: String,
    pub grant: PromoGrant,
    pub amount: Decimal,
    pub active: bool,
    pub expires_on: DateTime<Utc>,
    /// Token validity window for token campaigns.
    pub token_ttl_days: i64,
    pub toast: String,
}

/// Promo application response.
#[derive(Debug, Clone, Serialize)]
pub struct PromoOutcome {
    #[serde(rename = "type")]
    pub grant: PromoGrant,
    pub toast: String,
}

pub struct PromoService {
    campaigns: Mutex<HashMap<String, PromoCampaign>>,
    used: Mutex<HashSet<(i64, i64)>>,
    ledger_repo: Arc<dyn LedgerRepository>,
    ledger: LedgerService,
}

impl PromoService {
    pub fn new(ledger_repo: Arc<dyn LedgerRepository>) -> Self {
        Self {
            campaigns: Mutex::new(HashMap::new()),
            used: Mutex::new(HashSet::new()),
            ledger: LedgerService::new(ledger_repo.clone()),
            ledger_repo,
        }
    }

    pub fn add_campaign(&self, campaign: PromoCampaign) {
        self.campaigns
            .lock()
            .unwrap()
            .insert(campaign.code.to_uppercase(), campaign);
    }

    fn invalid() -> ApiError {
        ApiError::bad_request(codes::PROMO_INVALID, "invalid promo code")
    }

    pub async fn apply_promo_code(&self, user_id: i64, code: &str) -> ApiResult<PromoOutcome> {
        let campaign = self
            .campaigns
            .lock()
            .unwrap()
            .get(&code.trim().to_uppercase())
            .cloned()
            .ok_or_else(Self::invalid)?;
        if !campaign.active || campaign.expires_on <= Utc::now() {
            return Err(Self::invalid());
        }

        match campaign.grant {
            PromoGrant::Coins => {
                // One grant per user per campaign.
                {
                    let mut used = self.used.lock().unwrap();
                    if !used.insert((user_id, campaign.id)) {
                        return Err(Self::invalid());
                    }
                }
                self.ledger
                    .credit(
                        user_id,
                        ActivityType::Reward,
                        campaign.amount,
                        format!("promo campaign {}", campaign.id),
                    )
                    .await?;
            }
            PromoGrant::Tokens => {
                if self
                    .ledger_repo
                    .has_token_grant(user_id, campaign.id)
                    .await
                    .map_err(ApiError::internal)?
                {
                    return Err(Self::invalid());
                }
                self.ledger_repo
                    .record_token_grant(
                        user_id,
                        campaign.id,
                        campaign.amount,
                        Utc::now() + chrono::Duration::days(campaign.token_ttl_days),
                        format!("promo campaign {}", campaign.id),
                    )
                    .await
                    .map_err(ApiError::internal)?;
            }
        }

        Ok(PromoOutcome {
            grant: campaign.grant,
            toast: campaign.toast,
        })
    }
}
