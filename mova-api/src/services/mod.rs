//! Business services orchestrating repositories and vendors.

pub mod enterprise;
pub mod incentive;
pub mod ledger;
pub mod promo;
pub mod referral;
pub mod ridehail;
pub mod tier;
pub mod validator;
pub mod wallet;

pub use enterprise::EnterpriseService;
pub use incentive::IncentiveService;
pub use ledger::LedgerService;
pub use promo::PromoService;
pub use referral::ReferralService;
pub use ridehail::RidehailService;
pub use tier::TierService;
pub use validator::ValidationService;
pub use wallet::WalletService;
