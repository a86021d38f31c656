use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits every amount is held at.
pub const MONEY_SCALE: u32 = 2;

/// Largest magnitude accepted for a single amount (PayPal caps values at 15 integer digits).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_569_325_055, 23_283_064, 0, false, 2);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Invalid currency code: {0}")]
    InvalidCurrency(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Amount {0} has more than two decimal places")]
    TooPrecise(String),
    #[error("Amount {0} is out of range")]
    OutOfRange(String),
    #[error("Currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
    #[error("Arithmetic overflow: {0}")]
    Overflow(String),
}

/// ISO-4217 style three-letter currency code, always upper-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    pub fn new(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(MoneyError::InvalidCurrency(code.to_string()));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a decimal string that must carry at most two fractional digits.
pub fn parse_amount(value: &str) -> Result<Decimal, MoneyError> {
    let value = value.trim();
    let parsed = Decimal::from_str(value).map_err(|_| MoneyError::InvalidAmount(value.to_string()))?;
    if parsed.normalize().scale() > MONEY_SCALE {
        return Err(MoneyError::TooPrecise(value.to_string()));
    }
    if parsed.abs() > MAX_AMOUNT {
        return Err(MoneyError::OutOfRange(value.to_string()));
    }
    Ok(parsed)
}

/// A fixed-point monetary amount in a single currency.
///
/// On the wire this is the provider's `{"currency_code": "USD", "value": "105.00"}`
/// shape. The value is always a decimal string so no binary float ever touches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MoneyWire", into = "MoneyWire")]
pub struct Money {
    amount: Decimal,
    currency: CurrencyCode,
}

impl Money {
    /// Build an amount, rounding half away from zero to two decimal places.
    pub fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        let mut amount = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(MONEY_SCALE);
        Self { amount, currency }
    }

    pub fn zero(currency: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Strict parse: rejects anything that would need rounding.
    pub fn parse(value: &str, currency: CurrencyCode) -> Result<Self, MoneyError> {
        Ok(Self::new(parse_amount(value)?, currency))
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Decimal string with exactly two fractional digits, e.g. `"105.00"`.
    pub fn value(&self) -> String {
        self.amount.to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    pub fn checked_add(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let sum = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| MoneyError::Overflow(format!("{} + {}", self, other)))?;
        Ok(Money::new(sum, self.currency.clone()))
    }

    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let difference = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| MoneyError::Overflow(format!("{} - {}", self, other)))?;
        Ok(Money::new(difference, self.currency.clone()))
    }

    /// Unit price times a quantity.
    pub fn checked_mul(&self, quantity: u32) -> Result<Money, MoneyError> {
        let product = self
            .amount
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| MoneyError::Overflow(format!("{} x {}", self, quantity)))?;
        Ok(Money::new(product, self.currency.clone()))
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.value())
    }
}

#[derive(Serialize, Deserialize)]
struct MoneyWire {
    currency_code: CurrencyCode,
    value: String,
}

impl TryFrom<MoneyWire> for Money {
    type Error = MoneyError;

    fn try_from(wire: MoneyWire) -> Result<Self, Self::Error> {
        Money::parse(&wire.value, wire.currency_code)
    }
}

impl From<Money> for MoneyWire {
    fn from(money: Money) -> Self {
        Self {
            value: money.value(),
            currency_code: money.currency,
        }
    }
}
