//! Currency-string parsing for vendor receipts.
//!
//! Vendor receipts carry amounts as display strings (`"$15.75"`). Any parse
//! failure rejects the receipt so settlement can be deferred rather than
//! posted from a guessed amount.

use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn dollar_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\$?\s*(\d+(?:\.\d{1,2})?)$").unwrap())
}

/// Parse a `"$d.dd"` display amount into a `Decimal`.
pub fn parse_dollar_amount(raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    let captures = dollar_pattern()
        .captures(trimmed)
        .ok_or_else(|| Error::InvalidCurrency(raw.to_string()))?;
    Decimal::from_str(&captures[1]).map_err(|_| Error::InvalidCurrency(raw.to_string()))
}

/// Round to cents, half up.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

/// Render a coin amount the way user-facing toasts show it: no trailing
/// zeros, no currency sign.
pub fn display_coins(amount: Decimal) -> String {
    amount.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn parses_display_amounts() {
        assert_eq!(parse_dollar_amount("$15.75").unwrap(), dec("15.75"));
        assert_eq!(parse_dollar_amount("$ 2.50").unwrap(), dec("2.50"));
        assert_eq!(parse_dollar_amount("8").unwrap(), dec("8"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_dollar_amount("fifteen").is_err());
        assert!(parse_dollar_amount("$1,500.00").is_err());
        assert!(parse_dollar_amount("").is_err());
        assert!(parse_dollar_amount("$-3.00").is_err());
    }

    #[test]
    fn display_drops_trailing_zeros() {
        assert_eq!(display_coins(dec("1.00")), "1");
        assert_eq!(display_coins(dec("4.99")), "4.99");
    }
}
