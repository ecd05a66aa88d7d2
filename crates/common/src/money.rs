//! Money amounts stored as integer cents.

use serde::{Deserialize, Serialize};

/// Money amount represented in cents to avoid floating point issues.
///
/// Over the wire amounts travel as decimal numbers in major units
/// (`50.0` is fifty units); see [`major_units`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from a whole number of major units.
    pub const fn from_dollars(dollars: i64) -> Self {
        Self {
            cents: dollars * 100,
        }
    }

    /// Converts a decimal major-unit amount, rounding to the nearest cent.
    ///
    /// Returns `None` for NaN, infinities and values outside the `i64` cent range.
    pub fn from_major(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents < i64::MIN as f64 || cents > i64::MAX as f64 {
            return None;
        }
        Some(Self {
            cents: cents as i64,
        })
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub const fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the amount as a decimal number of major units.
    pub fn as_major(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    /// Returns the dollar portion (whole number).
    pub fn dollars(&self) -> i64 {
        self.cents / 100
    }

    /// Returns the cents portion (remainder after dollars).
    pub fn cents_part(&self) -> i64 {
        self.cents.abs() % 100
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    /// Multiplies by a quantity, or `None` if the result leaves the `i64`
    /// cent range.
    pub fn checked_multiply(&self, quantity: u32) -> Option<Money> {
        self.cents
            .checked_mul(i64::from(quantity))
            .map(Money::from_cents)
    }

    /// Adds two amounts, or `None` on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.cents.checked_add(other.cents).map(Money::from_cents)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cents < 0 {
            write!(f, "-${}.{:02}", self.dollars().abs(), self.cents_part())
        } else {
            write!(f, "${}.{:02}", self.dollars(), self.cents_part())
        }
    }
}

/// Serde adapter writing [`Money`] as a decimal number of major units.
///
/// Use with `#[serde(with = "common::money::major_units")]`.
pub mod major_units {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use super::Money;

    pub fn serialize<S: Serializer>(money: &Money, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(money.as_major())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Money, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Money::from_major(amount).ok_or_else(|| D::Error::custom("amount is not a finite number"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(1234);
        assert_eq!(money.cents(), 1234);
        assert_eq!(money.dollars(), 12);
        assert_eq!(money.cents_part(), 34);
    }

    #[test]
    fn test_money_from_major_rounds_to_cents() {
        assert_eq!(Money::from_major(50.0), Some(Money::from_cents(5000)));
        assert_eq!(Money::from_major(999.99), Some(Money::from_cents(99999)));
        assert_eq!(Money::from_major(0.005), Some(Money::from_cents(1)));
        assert_eq!(Money::from_major(-1.0), Some(Money::from_cents(-100)));
    }

    #[test]
    fn test_money_from_major_rejects_non_finite() {
        assert_eq!(Money::from_major(f64::NAN), None);
        assert_eq!(Money::from_major(f64::INFINITY), None);
        assert_eq!(Money::from_major(1e300), None);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "$12.34");
        assert_eq!(Money::from_cents(5).to_string(), "$0.05");
        assert_eq!(Money::from_cents(-1234).to_string(), "-$12.34");
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!(a.checked_add(b), Some(Money::from_cents(1500)));
        assert_eq!(a.checked_multiply(3), Some(Money::from_cents(3000)));
    }

    #[test]
    fn test_money_arithmetic_overflow_is_none() {
        let huge = Money::from_major(1e16).unwrap();

        assert_eq!(huge.checked_multiply(10), None);
        assert_eq!(Money::from_cents(i64::MAX).checked_add(Money::from_cents(1)), None);
        assert_eq!(huge.checked_multiply(0), Some(Money::zero()));
    }

    #[test]
    fn test_major_units_adapter() {
        #[derive(Serialize, Deserialize)]
        struct Priced {
            #[serde(with = "major_units")]
            price: Money,
        }

        let json = serde_json::to_string(&Priced {
            price: Money::from_cents(1050),
        })
        .unwrap();
        assert_eq!(json, r#"{"price":10.5}"#);

        let parsed: Priced = serde_json::from_str(r#"{"price":999.99}"#).unwrap();
        assert_eq!(parsed.price.cents(), 99999);
    }
}
