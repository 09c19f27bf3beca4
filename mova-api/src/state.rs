//! Application state: repositories, services and vendor clients wired
//! together and shared across handlers.

use std::sync::Arc;

use mova_core::geo::Polygon;

use crate::config::Config;
use crate::models::benefit::{BenefitRepository, InMemoryBenefitRepository};
use crate::models::enterprise::{EnterpriseRepository, InMemoryEnterpriseRepository};
use crate::models::incentive::{InMemoryIncentiveRepository, IncentiveRepository, ServiceProfile};
use crate::models::notifications::{InMemoryNotificationRepository, NotificationRepository};
use crate::models::referral::{InMemoryReferralRepository, ReferralRepository};
use crate::models::ridehail::{InMemoryRidehailRepository, RidehailRepository};
use crate::models::trip::{InMemoryTripRepository, TripRepository};
use crate::models::wallet::{InMemoryLedgerRepository, LedgerRepository};
use crate::services::{
    EnterpriseService, IncentiveService, LedgerService, PromoService, ReferralService,
    RidehailService, TierService, ValidationService, WalletService,
};
use crate::vendors::incentive_hook::TierVendor;
use crate::vendors::payment::PaymentVendor;
use crate::vendors::uber::RidehailVendor;

/// Shared application state.
pub struct AppState {
    pub config: Config,

    pub ledger_repo: Arc<dyn LedgerRepository>,
    pub benefit_repo: Arc<dyn BenefitRepository>,
    pub ride_repo: Arc<dyn RidehailRepository>,
    pub trip_repo: Arc<dyn TripRepository>,
    pub incentive_repo: Arc<dyn IncentiveRepository>,
    pub enterprise_repo: Arc<dyn EnterpriseRepository>,
    pub referral_repo: Arc<dyn ReferralRepository>,
    pub notification_repo: Arc<dyn NotificationRepository>,

    pub ledger: LedgerService,
    pub wallet: Arc<WalletService>,
    pub tier: Arc<TierService>,
    pub ridehail: Arc<RidehailService>,
    pub incentive: Arc<IncentiveService>,
    pub validator: Arc<ValidationService>,
    pub enterprise: Arc<EnterpriseService>,
    pub referral: Arc<ReferralService>,
    pub promo: Arc<PromoService>,
}

impl AppState {
    pub fn new(
        config: Config,
        uber: Arc<dyn RidehailVendor>,
        payment: Arc<dyn PaymentVendor>,
        tier_vendor: Arc<dyn TierVendor>,
    ) -> Self {
        let ledger_repo: Arc<dyn LedgerRepository> = Arc::new(InMemoryLedgerRepository::new());
        let benefit_repo: Arc<dyn BenefitRepository> = Arc::new(InMemoryBenefitRepository::new());
        let ride_repo: Arc<dyn RidehailRepository> = Arc::new(InMemoryRidehailRepository::new());
        let trip_repo: Arc<dyn TripRepository> = Arc::new(InMemoryTripRepository::new());
        let incentive_repo: Arc<dyn IncentiveRepository> =
            Arc::new(InMemoryIncentiveRepository::new());
        let enterprise_repo: Arc<dyn EnterpriseRepository> =
            Arc::new(InMemoryEnterpriseRepository::new());
        let referral_repo: Arc<dyn ReferralRepository> = Arc::new(InMemoryReferralRepository::new());
        let notification_repo: Arc<dyn NotificationRepository> =
            Arc::new(InMemoryNotificationRepository::new());

        let ledger = LedgerService::new(ledger_repo.clone());
        let wallet = Arc::new(WalletService::new(
            ledger_repo.clone(),
            notification_repo.clone(),
            payment,
            config.clone(),
        ));
        let tier = Arc::new(TierService::new(tier_vendor, benefit_repo.clone()));
        let ridehail = Arc::new(RidehailService::new(
            ride_repo.clone(),
            ledger_repo.clone(),
            benefit_repo.clone(),
            notification_repo.clone(),
            tier.clone(),
            wallet.clone(),
            uber,
            config.clone(),
        ));
        let incentive = Arc::new(IncentiveService::new(
            incentive_repo.clone(),
            ledger.clone(),
            config.incentive_seed,
        ));
        let validator = Arc::new(ValidationService::new(
            trip_repo.clone(),
            incentive.clone(),
            config.clone(),
        ));
        let enterprise = Arc::new(EnterpriseService::new(
            enterprise_repo.clone(),
            notification_repo.clone(),
        ));
        let referral = Arc::new(ReferralService::new(
            referral_repo.clone(),
            incentive_repo.clone(),
            ledger.clone(),
            tier.clone(),
            config.clone(),
        ));
        let promo = Arc::new(PromoService::new(ledger_repo.clone()));

        Self {
            config,
            ledger_repo,
            benefit_repo,
            ride_repo,
            trip_repo,
            incentive_repo,
            enterprise_repo,
            referral_repo,
            notification_repo,
            ledger,
            wallet,
            tier,
            ridehail,
            incentive,
            validator,
            enterprise,
            referral,
            promo,
        }
    }

    /// Load market service profiles from the configured JSON file mapping
    /// market code to a WKT polygon.
    pub async fn load_service_profiles(&self) -> anyhow::Result<usize> {
        let raw = std::fs::read_to_string(&self.config.service_profile_path)?;
        let map: std::collections::HashMap<String, String> = serde_json::from_str(&raw)?;
        let mut loaded = 0;
        for (market, wkt) in map {
            match Polygon::from_wkt(&wkt) {
                Ok(polygon) => {
                    self.incentive_repo
                        .put_service_profile(ServiceProfile { market, polygon })
                        .await
                        .map_err(anyhow::Error::msg)?;
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!(market = %market, error = %e, "bad service profile skipped");
                }
            }
        }
        Ok(loaded)
    }
}
