//! Ride-fare settlement algebra.
//!
//! A guest ride collects `max(0, estimated_fare - benefit)` from the user up
//! front. When the actual fare arrives on the completion receipt, the
//! difference is settled across three accounts: the user wallet, the Uber
//! service account, and the platform system account which funds the consumed
//! benefit credit. Every leg is a paired transfer, so the amounts posted for
//! a ride always sum to zero.

use rust_decimal::Decimal;

/// Result of settling a completed ride.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RideSettlement {
    /// What the user already paid at order time: `max(0, E - B)`.
    pub user_paid: Decimal,
    /// What the user should end up paying: `max(0, A - B)`.
    pub user_owes: Decimal,
    /// Refund due back to the user (Uber account -> user).
    pub user_refund: Decimal,
    /// Additional charge when the actual fare exceeded the estimate
    /// (user -> Uber account). Non-zero only when `A > E`.
    pub user_charge: Decimal,
    /// Benefit credit consumed by this ride: `min(A, B)`.
    pub benefit_used: Decimal,
    /// Platform payout covering the consumed benefit (system account ->
    /// Uber account), so Uber ends the ride holding exactly `A`.
    pub platform_payout: Decimal,
}

impl RideSettlement {
    /// Compute the settlement for estimated fare `e`, actual fare `a` and
    /// benefit credit `b` applied at order time.
    pub fn compute(e: Decimal, a: Decimal, b: Decimal) -> Self {
        let user_paid = (e - b).max(Decimal::ZERO);
        let user_owes = (a - b).max(Decimal::ZERO);
        let user_refund = (user_paid - user_owes).max(Decimal::ZERO);
        let user_charge = (user_owes - user_paid).max(Decimal::ZERO);
        let benefit_used = a.min(b);
        Self {
            user_paid,
            user_owes,
            user_refund,
            user_charge,
            benefit_used,
            platform_payout: benefit_used,
        }
    }
}

/// Refund amount for a cancelled ride: everything collected at order time.
pub fn cancellation_refund(estimated_fare: Decimal, benefit: Decimal) -> Decimal {
    (estimated_fare - benefit).max(Decimal::ZERO)
}
