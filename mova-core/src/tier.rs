//! Tier classification and the static per-tier benefit rule table.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// User tier levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    Green,
    Bronze,
    Silver,
    Gold,
}

impl std::fmt::Display for TierLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TierLevel::Green => write!(f, "green"),
            TierLevel::Bronze => write!(f, "bronze"),
            TierLevel::Silver => write!(f, "silver"),
            TierLevel::Gold => write!(f, "gold"),
        }
    }
}

impl std::str::FromStr for TierLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "green" => Ok(TierLevel::Green),
            "bronze" => Ok(TierLevel::Bronze),
            "silver" => Ok(TierLevel::Silver),
            "gold" => Ok(TierLevel::Gold),
            _ => Err(format!("Invalid tier level: {}", s)),
        }
    }
}

impl TierLevel {
    /// Classify tier points into a level.
    pub fn from_points(points: i64) -> Self {
        match points {
            p if p >= 1501 => TierLevel::Gold,
            p if p >= 1001 => TierLevel::Silver,
            p if p >= 501 => TierLevel::Bronze,
            _ => TierLevel::Green,
        }
    }

    /// Monthly Uber benefit deposit for the level, in USD.
    pub fn uber_benefit_deposit(&self) -> Decimal {
        match self {
            TierLevel::Green => Decimal::ZERO,
            TierLevel::Bronze => Decimal::from(4),
            TierLevel::Silver => Decimal::from(6),
            TierLevel::Gold => Decimal::from(8),
        }
    }
}

/// Static benefit rules attached to a tier level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenefitRules {
    pub level: TierLevel,
    pub raffle_multiplier: Decimal,
    pub referral_multiplier: Decimal,
    pub uber_credit: Decimal,
    /// Toast template with `{1}` coin-amount and `{2}` pluralization
    /// placeholders.
    pub toast: &'static str,
}

const REFERRAL_TOAST: &str = "We've added {1} Coin{2} to your Wallet!";

/// Look up the static rule row for a level.
pub fn benefit_rules(level: TierLevel) -> BenefitRules {
    let (raffle, referral, credit) = match level {
        TierLevel::Green => ("1.0", "1.00", 0),
        TierLevel::Bronze => ("2.0", "1.15", 4),
        TierLevel::Silver => ("3.0", "1.25", 6),
        TierLevel::Gold => ("4.0", "1.50", 8),
    };
    BenefitRules {
        level,
        raffle_multiplier: raffle.parse().unwrap(),
        referral_multiplier: referral.parse().unwrap(),
        uber_credit: Decimal::from(credit),
        toast: REFERRAL_TOAST,
    }
}

/// Fill a toast template: `{1}` gets the coin amount, `{2}` the plural "s".
pub fn fill_toast(template: &str, amount: Decimal) -> String {
    let plural = if amount == Decimal::ONE { "" } else { "s" };
    template
        .replace("{1}", &crate::money::display_coins(amount))
        .replace("{2}", plural)
}
