//! Server configuration loaded from the environment.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Runtime configuration. Every field has a production default so the
/// server boots in a bare environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub jwt_secret: String,

    /// Maximum card spend per user per local calendar day, USD.
    pub daily_purchase_limit: Decimal,
    /// Maximum coin redemption per user per local calendar day.
    pub daily_redeem_limit: Decimal,
    /// Coins granted per referral before the tier multiplier.
    pub referral_coin: Decimal,
    /// Days after account creation during which a referral code is accepted.
    pub referral_window_days: i64,

    /// Validation rounds before a trip is abandoned.
    pub validation_round_limit: i32,
    /// Hours after trip start before the first validation attempt.
    pub validation_buffer_hours: i64,

    pub uber_base_url: String,
    pub uber_secret: String,
    pub payment_base_url: String,
    pub payment_secret: String,
    pub incentive_hook_base_url: String,

    /// JSON file mapping market code to its WKT service-area polygon.
    pub service_profile_path: String,

    /// Seed for the incentive reward draw.
    pub incentive_seed: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_addr: env_or("BIND_ADDR", "127.0.0.1:8080"),
            jwt_secret: env_or("JWT_SECRET", "default_secret_change_in_production"),
            daily_purchase_limit: env_decimal("DAILY_PURCHASE_LIMIT", "100"),
            daily_redeem_limit: env_decimal("DAILY_REDEEM_LIMIT", "100"),
            referral_coin: env_decimal("REFERRAL_COIN", "1"),
            referral_window_days: env_parsed("REFERRAL_WINDOW_DAYS", 5),
            validation_round_limit: env_parsed("VALIDATION_ROUND_LIMIT", 2),
            validation_buffer_hours: env_parsed("VALIDATION_BUFFER_TIME", 24),
            uber_base_url: env_or("UBER_BASE_URL", "https://api.uber.com"),
            uber_secret: env_or("UBER_SECRET", ""),
            payment_base_url: env_or("PAYMENT_BASE_URL", "https://api.payment.example.com"),
            payment_secret: env_or("PAYMENT_SECRET", ""),
            incentive_hook_base_url: env_or(
                "INCENTIVE_HOOK_BASE_URL",
                "https://incentive-hook.example.com",
            ),
            service_profile_path: env_or("SERVICE_PROFILE_PATH", "./data/service_profiles.json"),
            incentive_seed: env_parsed("INCENTIVE_SEED", 0x6d6f7661),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_decimal(key: &str, default: &str) -> Decimal {
    let raw = env_or(key, default);
    Decimal::from_str(&raw).unwrap_or_else(|_| Decimal::from_str(default).unwrap())
}

fn env_parsed<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
