//! Money in integer minor units.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_object::ValueObject;

/// ISO-4217 style currency code (three ASCII uppercase letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl AsRef<str>) -> Result<Self, DomainError> {
        let code = code.as_ref().trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter code, got '{code}'"
            )));
        }
        Ok(Self(code))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount of money in minor units (cents for USD).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

impl ValueObject for Money {}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    /// Parse a decimal major-unit string ("1250.5") into minor units (two decimals).
    pub fn parse_major(s: &str, currency: Currency) -> Result<Self, DomainError> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };
        let invalid = || DomainError::validation(format!("invalid amount '{s}'"));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if frac.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| invalid())? };
        let frac_minor: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };
        let minor = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac_minor))
            .ok_or_else(invalid)?;
        Ok(Self::new(if negative { -minor } else { minor }, currency))
    }

    /// Major-unit decimal rendering with two fraction digits ("1250.50").
    pub fn to_major_string(&self) -> String {
        let sign = if self.amount_minor < 0 { "-" } else { "" };
        let abs = self.amount_minor.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }

    pub fn is_negative(&self) -> bool {
        self.amount_minor < 0
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        let amount = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or_else(|| DomainError::validation("amount overflow"))?;
        Ok(Money::new(amount, self.currency.clone()))
    }

    /// Scale by a percentage (0-100, fractional allowed), rounding half away from zero.
    ///
    /// The percentage is fixed to millionths first so the product is exact;
    /// a non-finite percentage scales to zero.
    pub fn scale_percent(&self, percent: f64) -> Money {
        let fixed = if percent.is_finite() {
            (percent * PERCENT_SCALE as f64).round() as i128
        } else {
            0
        };
        let numerator = i128::from(self.amount_minor).saturating_mul(fixed);
        Money::new(round_div(numerator, 100 * PERCENT_SCALE), self.currency.clone())
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::validation(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )));
        }
        Ok(())
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.to_major_string(), self.currency)
    }
}

/// Fixed-point resolution of [`Money::scale_percent`]: millionths of a percent.
const PERCENT_SCALE: i128 = 1_000_000;

/// `amount * basis_points / 10_000`, rounded half away from zero.
pub fn apply_basis_points(amount_minor: i64, basis_points: u32) -> i64 {
    round_div(i128::from(amount_minor) * i128::from(basis_points), 10_000)
}

/// Integer division rounding half away from zero. `denominator` must be positive.
pub fn round_div(numerator: i128, denominator: i128) -> i64 {
    let half = denominator / 2;
    let q = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    q as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn currency_is_normalized_and_validated() {
        assert_eq!(Currency::new(" eur ").unwrap().as_str(), "EUR");
        assert!(Currency::new("EURO").is_err());
        assert!(Currency::new("E1R").is_err());
    }

    #[test]
    fn parse_major_handles_fraction_lengths() {
        let usd = Currency::usd();
        assert_eq!(Money::parse_major("12", usd.clone()).unwrap().amount_minor, 1200);
        assert_eq!(Money::parse_major("12.5", usd.clone()).unwrap().amount_minor, 1250);
        assert_eq!(Money::parse_major("12.05", usd.clone()).unwrap().amount_minor, 1205);
        assert_eq!(Money::parse_major("-0.99", usd.clone()).unwrap().amount_minor, -99);
        assert!(Money::parse_major("12.345", usd.clone()).is_err());
        assert!(Money::parse_major("abc", usd.clone()).is_err());
        assert!(Money::parse_major("", usd).is_err());
    }

    #[test]
    fn major_string_renders_two_decimals() {
        assert_eq!(Money::new(125_050, Currency::usd()).to_major_string(), "1250.50");
        assert_eq!(Money::new(-5, Currency::usd()).to_major_string(), "-0.05");
    }

    #[test]
    fn add_rejects_currency_mismatch() {
        let a = Money::new(100, Currency::usd());
        let b = Money::new(100, Currency::new("EUR").unwrap());
        assert!(a.checked_add(&b).is_err());
    }

    #[test]
    fn basis_points_round_half_away_from_zero() {
        // 1050 * 5% = 52.5 -> 53
        assert_eq!(apply_basis_points(1050, 500), 53);
        assert_eq!(apply_basis_points(-1050, 500), -53);
        assert_eq!(apply_basis_points(1000, 0), 0);
    }

    #[test]
    fn percent_scaling_is_exact_at_half_minor_units() {
        // 250 * 64.6% = 161.5 and 375 * 9.2% = 34.5; f64 lands just below both.
        assert_eq!(Money::new(250, Currency::usd()).scale_percent(64.6).amount_minor, 162);
        assert_eq!(Money::new(375, Currency::usd()).scale_percent(9.2).amount_minor, 35);
        assert_eq!(Money::new(-250, Currency::usd()).scale_percent(64.6).amount_minor, -162);
        assert_eq!(Money::new(999, Currency::usd()).scale_percent(100.0).amount_minor, 999);
        assert_eq!(Money::new(999, Currency::usd()).scale_percent(f64::NAN).amount_minor, 0);
    }

    proptest! {
        #[test]
        fn percent_scaling_matches_exact_rational(
            minor in -1_000_000_000i64..1_000_000_000,
            thousandths in 0u32..=100_000,
        ) {
            let percent = f64::from(thousandths) / 1000.0;
            let scaled = Money::new(minor, Currency::usd()).scale_percent(percent);
            let expected = round_div(i128::from(minor) * i128::from(thousandths), 100_000);
            prop_assert_eq!(scaled.amount_minor, expected);
        }

        #[test]
        fn parse_major_inverts_to_major_string(minor in -1_000_000_000i64..1_000_000_000i64) {
            let money = Money::new(minor, Currency::usd());
            let parsed = Money::parse_major(&money.to_major_string(), Currency::usd()).unwrap();
            prop_assert_eq!(parsed, money);
        }
    }
}
