use super::currency::Currency;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-point monetary amount: integer minor units paired with a
/// currency. Never represented as a float anywhere in the crate,
/// per the design note on crypto/accounting integer pitfalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: i64,
    pub currency: Currency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("currency mismatch: {0} vs {1}")]
    CurrencyMismatch(Currency, Currency),
    #[error("amount overflow")]
    Overflow,
    #[error("amount must be non-negative, got {0}")]
    Negative(i64),
}

impl Money {
    pub fn new(amount_minor: i64, currency: Currency) -> Self {
        Self { amount_minor, currency }
    }

    pub fn zero(currency: Currency) -> Self {
        Self { amount_minor: 0, currency }
    }

    pub fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    fn require_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(self.currency, other.currency));
        }
        Ok(())
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount_minor = self
            .amount_minor
            .checked_add(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount_minor, self.currency))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.require_same_currency(other)?;
        let amount_minor = self
            .amount_minor
            .checked_sub(other.amount_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Money::new(amount_minor, self.currency))
    }

    /// Scales by a basis-points rate (e.g. `platform_fee_rate_bps`),
    /// rounding down, which is the conservative direction for fees.
    pub fn scale_bps(&self, bps: u32) -> Money {
        let scaled = (self.amount_minor as i128 * bps as i128) / 10_000i128;
        Money::new(scaled as i64, self.currency)
    }

    pub fn is_within_range(&self, lower_inclusive: i64, upper_exclusive: i64) -> bool {
        self.amount_minor >= lower_inclusive && self.amount_minor < upper_exclusive
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = self.currency.decimal_places();
        if places == 0 {
            write!(f, "{} {}", self.amount_minor, self.currency)
        } else {
            let divisor = 10i64.pow(places as u32);
            let whole = self.amount_minor / divisor;
            let frac = (self.amount_minor % divisor).abs();
            write!(f, "{}.{:0width$} {}", whole, frac, self.currency, width = places as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_rejects_currency_mismatch() {
        let usd = Money::new(100, Currency::USD);
        let eur = Money::new(100, Currency::EUR);
        assert_eq!(
            usd.checked_add(&eur),
            Err(MoneyError::CurrencyMismatch(Currency::USD, Currency::EUR))
        );
    }

    #[test]
    fn scale_bps_rounds_down() {
        // 5% of 1000 cents = 50 cents; matches the happy-path scenario's platform fee.
        let amount = Money::new(1000, Currency::USD);
        assert_eq!(amount.scale_bps(500).amount_minor, 50);

        // 2.9% of 1000 cents = 29 cents.
        assert_eq!(amount.scale_bps(290).amount_minor, 29);
    }

    #[test]
    fn is_within_range_is_lower_inclusive_upper_exclusive() {
        let amount = Money::new(100, Currency::USD);
        assert!(amount.is_within_range(100, 200));
        assert!(!amount.is_within_range(101, 200));
        let edge = Money::new(200, Currency::USD);
        assert!(!edge.is_within_range(100, 200));
    }

    #[test]
    fn display_formats_minor_units_with_decimal_places() {
        assert_eq!(Money::new(92100, Currency::USD).to_string(), "921.00 USD");
        assert_eq!(Money::new(500, Currency::JPY).to_string(), "500 JPY");
    }
}
