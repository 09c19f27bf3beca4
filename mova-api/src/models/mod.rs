//! Data models and repository traits.
//!
//! Each module owns its entities plus a repository trait with an in-memory
//! implementation. The in-memory stores enforce the same locking discipline
//! a SQL backend would: ledger writes take one mutex so writes against a
//! wallet serialize, and validation queue rows are leased to a single
//! consumer.

pub mod benefit;
pub mod enterprise;
pub mod incentive;
pub mod notifications;
pub mod referral;
pub mod ridehail;
pub mod trip;
pub mod wallet;

pub use benefit::{BenefitRepository, InMemoryBenefitRepository};
pub use enterprise::{EnterpriseRepository, InMemoryEnterpriseRepository};
pub use incentive::{InMemoryIncentiveRepository, IncentiveRepository};
pub use notifications::{InMemoryNotificationRepository, NotificationRepository};
pub use referral::{InMemoryReferralRepository, ReferralRepository};
pub use ridehail::{InMemoryRidehailRepository, RidehailRepository};
pub use trip::{InMemoryTripRepository, TripRepository};
pub use wallet::{InMemoryLedgerRepository, LedgerRepository};
