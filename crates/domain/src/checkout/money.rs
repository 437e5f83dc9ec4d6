//! Currency-aware money amounts.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// ISO 4217 currency code (three uppercase ASCII letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses a currency code, normalizing to uppercase.
    pub fn new(code: impl AsRef<str>) -> Result<Self, DomainError> {
        let code = code.as_ref().trim();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(DomainError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CurrencyCode::new(value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

/// An amount of money in a specific currency.
///
/// Stored as whole `units` plus `nanos` (10^-9 units), both carrying the same
/// sign. All arithmetic is exact; combining different currencies is an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr")]
pub struct Money {
    currency_code: CurrencyCode,
    units: i64,
    nanos: i32,
}

#[derive(Deserialize)]
struct MoneyRepr {
    currency_code: CurrencyCode,
    units: i64,
    #[serde(default)]
    nanos: i32,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = DomainError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Money::new(repr.currency_code, repr.units, repr.nanos)
    }
}

impl Money {
    /// Creates an amount, validating that `nanos` is in range and agrees in sign with `units`.
    pub fn new(currency_code: CurrencyCode, units: i64, nanos: i32) -> Result<Self, DomainError> {
        if i128::from(nanos).abs() >= NANOS_PER_UNIT {
            return Err(DomainError::InvalidMoney(format!(
                "nanos {nanos} out of range"
            )));
        }
        if (units > 0 && nanos < 0) || (units < 0 && nanos > 0) {
            return Err(DomainError::InvalidMoney(format!(
                "units {units} and nanos {nanos} have different signs"
            )));
        }
        Ok(Self {
            currency_code,
            units,
            nanos,
        })
    }

    /// Creates a whole-unit amount.
    pub fn from_units(currency_code: CurrencyCode, units: i64) -> Self {
        Self {
            currency_code,
            units,
            nanos: 0,
        }
    }

    /// Creates an amount from minor units at two decimal places (e.g. cents).
    pub fn from_cents(currency_code: CurrencyCode, cents: i64) -> Self {
        let units = cents / 100;
        let nanos = ((cents % 100) * 10_000_000) as i32;
        Self {
            currency_code,
            units,
            nanos,
        }
    }

    /// Creates an amount from a total count of nanos.
    pub fn from_total_nanos(currency_code: CurrencyCode, total: i128) -> Result<Self, DomainError> {
        let units = i64::try_from(total / NANOS_PER_UNIT).map_err(|_| DomainError::Overflow)?;
        let nanos = (total % NANOS_PER_UNIT) as i32;
        Ok(Self {
            currency_code,
            units,
            nanos,
        })
    }

    /// Returns zero in the given currency.
    pub fn zero(currency_code: CurrencyCode) -> Self {
        Self::from_units(currency_code, 0)
    }

    /// Returns the currency.
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency_code
    }

    /// Returns the whole-unit part.
    pub fn units(&self) -> i64 {
        self.units
    }

    /// Returns the fractional part in nanos.
    pub fn nanos(&self) -> i32 {
        self.nanos
    }

    /// Returns the amount as a single count of nanos.
    pub fn total_nanos(&self) -> i128 {
        i128::from(self.units) * NANOS_PER_UNIT + i128::from(self.nanos)
    }

    /// Returns true if the amount is negative.
    pub fn is_negative(&self) -> bool {
        self.units < 0 || self.nanos < 0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.units == 0 && self.nanos == 0
    }

    /// Adds another amount of the same currency.
    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        if self.currency_code != other.currency_code {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency_code.to_string(),
                actual: other.currency_code.to_string(),
            });
        }
        Money::from_total_nanos(
            self.currency_code.clone(),
            self.total_nanos() + other.total_nanos(),
        )
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Result<Money, DomainError> {
        Money::from_total_nanos(
            self.currency_code.clone(),
            self.total_nanos() * i128::from(quantity),
        )
    }

    /// Returns the amount as a floating-point number of units.
    ///
    /// Only for rate math and display; never for accumulation.
    pub fn as_f64(&self) -> f64 {
        self.units as f64 + f64::from(self.nanos) / 1e9
    }

    /// Creates an amount from floating-point units, rounding to the nearest nano.
    pub fn from_f64(currency_code: CurrencyCode, amount: f64) -> Result<Self, DomainError> {
        if !amount.is_finite() {
            return Err(DomainError::InvalidMoney(format!("{amount} is not finite")));
        }
        let total = (amount * 1e9).round();
        if total.abs() >= i128::MAX as f64 {
            return Err(DomainError::Overflow);
        }
        Money::from_total_nanos(currency_code, total as i128)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cents = self.total_nanos() / 10_000_000;
        let sign = if cents < 0 { "-" } else { "" };
        let cents = cents.abs();
        write!(
            f,
            "{sign}{}.{:02} {}",
            cents / 100,
            cents % 100,
            self.currency_code
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> CurrencyCode {
        CurrencyCode::new("USD").unwrap()
    }

    #[test]
    fn test_currency_code_normalizes() {
        assert_eq!(CurrencyCode::new("eur").unwrap().as_str(), "EUR");
        assert!(CurrencyCode::new("EURO").is_err());
        assert!(CurrencyCode::new("U$D").is_err());
        assert!(CurrencyCode::new("").is_err());
    }

    #[test]
    fn test_money_from_cents() {
        let money = Money::from_cents(usd(), 1234);
        assert_eq!(money.units(), 12);
        assert_eq!(money.nanos(), 340_000_000);
        assert_eq!(money.to_string(), "12.34 USD");
    }

    #[test]
    fn test_money_rejects_inconsistent_signs() {
        assert!(Money::new(usd(), 1, -5).is_err());
        assert!(Money::new(usd(), -1, 5).is_err());
        assert!(Money::new(usd(), 0, -5).is_ok());
        assert!(Money::new(usd(), 0, 1_000_000_000).is_err());
    }

    #[test]
    fn test_money_addition_carries_nanos() {
        let a = Money::new(usd(), 1, 750_000_000).unwrap();
        let b = Money::new(usd(), 2, 500_000_000).unwrap();
        let sum = a.checked_add(&b).unwrap();
        assert_eq!(sum.units(), 4);
        assert_eq!(sum.nanos(), 250_000_000);
    }

    #[test]
    fn test_money_addition_rejects_currency_mismatch() {
        let a = Money::from_units(usd(), 1);
        let b = Money::from_units(CurrencyCode::new("EUR").unwrap(), 1);
        assert!(matches!(
            a.checked_add(&b),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_money_multiply() {
        let price = Money::new(usd(), 19, 990_000_000).unwrap();
        let total = price.multiply(3).unwrap();
        assert_eq!(total.units(), 59);
        assert_eq!(total.nanos(), 970_000_000);
    }

    #[test]
    fn test_negative_display() {
        let refund = Money::new(usd(), -3, -50_000_000).unwrap();
        assert!(refund.is_negative());
        assert_eq!(refund.to_string(), "-3.05 USD");
    }

    #[test]
    fn test_from_f64_rounds_to_nanos() {
        let money = Money::from_f64(usd(), 1.1).unwrap();
        assert_eq!(money.units(), 1);
        assert_eq!(money.nanos(), 100_000_000);
        assert!(Money::from_f64(usd(), f64::NAN).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Money =
            serde_json::from_str(r#"{"currency_code":"USD","units":5,"nanos":0}"#).unwrap();
        assert_eq!(ok, Money::from_units(usd(), 5));

        let bad = serde_json::from_str::<Money>(r#"{"currency_code":"USD","units":5,"nanos":-1}"#);
        assert!(bad.is_err());
        let bad_code = serde_json::from_str::<Money>(r#"{"currency_code":"XX","units":5}"#);
        assert!(bad_code.is_err());
    }
}
