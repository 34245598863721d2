//! Value Objects for the Arvault domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of decimal places kept on a derived reciprocal rate.
pub const RECIPROCAL_RATE_SCALE: u32 = 5;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// A required request field was absent or empty
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Currency code is not a three-letter ISO-style code
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),

    /// Currency pair is malformed (e.g. same currency on both sides)
    #[error("Invalid currency pair: {0}")]
    InvalidCurrencyPair(String),

    /// Account identifier is empty or malformed
    #[error("Invalid account id: {0}")]
    InvalidAccountId(String),

    /// Amount must be positive
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Rate must be positive and have a representable reciprocal
    #[error("Invalid rate: {0}")]
    InvalidRate(String),

    /// Stored transaction status could not be parsed
    #[error("Invalid transaction status: {0}")]
    InvalidStatus(String),
}

// =============================================================================
// Currency
// =============================================================================

/// Currency represents a three-letter currency code (e.g. ARS, USD)
///
/// # Invariants
/// - Exactly three ASCII letters
/// - Always stored upper-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Create a Currency from a code, normalizing to upper-case
    ///
    /// # Examples
    /// ```
    /// # use arvault_domain::value_objects::Currency;
    /// let usd = Currency::new("usd").unwrap();
    /// assert_eq!(usd.code(), "USD");
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidCurrency` if the code is not three letters
    pub fn new(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::InvalidCurrency(format!(
                "Expected a three-letter code, got '{}'",
                code
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Get the currency code
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// CurrencyPair
// =============================================================================

/// A directed currency pair: `base` is given, `counter` is received
///
/// # Invariants
/// - Base and counter differ
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    base: Currency,
    counter: Currency,
}

impl CurrencyPair {
    /// Create a directed pair
    ///
    /// # Errors
    /// Returns `DomainError::InvalidCurrencyPair` if both sides are the same currency
    pub fn new(base: Currency, counter: Currency) -> Result<Self, DomainError> {
        if base == counter {
            return Err(DomainError::InvalidCurrencyPair(format!(
                "Base and counter must differ, got {}/{}",
                base, counter
            )));
        }
        Ok(Self { base, counter })
    }

    /// Get the base currency
    pub fn base(&self) -> &Currency {
        &self.base
    }

    /// Get the counter currency
    pub fn counter(&self) -> &Currency {
        &self.counter
    }

    /// The same pair in the opposite direction
    pub fn inverse(&self) -> Self {
        Self {
            base: self.counter.clone(),
            counter: self.base.clone(),
        }
    }

    /// Both currencies in lexicographic order.
    ///
    /// Row locks on house accounts are always taken in this order so that two
    /// opposite-direction exchanges can never wait on each other.
    pub fn lock_order(&self) -> (&Currency, &Currency) {
        if self.base <= self.counter {
            (&self.base, &self.counter)
        } else {
            (&self.counter, &self.base)
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.counter)
    }
}

// =============================================================================
// AccountId
// =============================================================================

/// Identifier of an account (house or client)
///
/// # Invariants
/// - Non-empty, no surrounding whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Create an AccountId
    ///
    /// # Errors
    /// Returns `DomainError::InvalidAccountId` if the id is blank
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidAccountId("Account id must be non-empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TransactionId
// =============================================================================

/// Identifier of a journaled exchange attempt (UUID v7, time-ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generate a fresh time-ordered id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID (e.g. loaded from storage)
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Amounts and rates
// =============================================================================

/// Check that an amount is strictly positive
///
/// # Errors
/// Returns `DomainError::InvalidAmount` if value <= 0
pub fn positive_amount(value: Decimal) -> Result<Decimal, DomainError> {
    if value <= Decimal::ZERO {
        return Err(DomainError::InvalidAmount(format!("Amount must be positive, got {}", value)));
    }
    Ok(value)
}

/// Reciprocal of a rate rounded to five decimal places, half away from zero.
///
/// ```
/// # use arvault_domain::value_objects::reciprocal_rate;
/// # use rust_decimal_macros::dec;
/// assert_eq!(reciprocal_rate(dec!(0.00068)).unwrap(), dec!(1470.58824));
/// assert_eq!(reciprocal_rate(dec!(4)).unwrap(), dec!(0.25));
/// ```
///
/// # Errors
/// Returns `DomainError::InvalidRate` if the rate is not positive or the
/// reciprocal rounds to zero (rates above 200000).
pub fn reciprocal_rate(rate: Decimal) -> Result<Decimal, DomainError> {
    if rate <= Decimal::ZERO {
        return Err(DomainError::InvalidRate(format!("Rate must be positive, got {}", rate)));
    }

    let reciprocal = Decimal::ONE
        .checked_div(rate)
        .ok_or_else(|| DomainError::InvalidRate(format!("Reciprocal of {} overflows", rate)))?
        .round_dp_with_strategy(RECIPROCAL_RATE_SCALE, RoundingStrategy::MidpointAwayFromZero);

    if reciprocal.is_zero() {
        return Err(DomainError::InvalidRate(format!(
            "Reciprocal of {} rounds to zero at {} decimal places",
            rate, RECIPROCAL_RATE_SCALE
        )));
    }

    Ok(reciprocal.normalize())
}

/// `amount * rate` when the product is exact in a `Decimal`.
///
/// `None` when the product overflows or would need more than 28 fractional
/// digits, in which case `rust_decimal` would round it.
///
/// ```
/// # use arvault_domain::value_objects::exact_product;
/// # use rust_decimal_macros::dec;
/// assert_eq!(exact_product(dec!(1000), dec!(0.00068)), Some(dec!(0.68)));
/// assert_eq!(exact_product(dec!(0.000000000000000000000001), dec!(0.00068)), None);
/// ```
pub fn exact_product(amount: Decimal, rate: Decimal) -> Option<Decimal> {
    let (amount, rate) = (amount.normalize(), rate.normalize());
    let product = amount.checked_mul(rate)?;
    (product.scale() == amount.scale() + rate.scale()).then_some(product)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_validation() {
        assert_eq!(Currency::new("ars").unwrap().code(), "ARS");
        assert_eq!(Currency::new(" USD ").unwrap().code(), "USD");
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("USDT").is_err());
        assert!(Currency::new("U$D").is_err());
        assert!(Currency::new("").is_err());
    }

    #[test]
    fn test_currency_serde_rejects_invalid_code() {
        let parsed: Result<Currency, _> = serde_json::from_str("\"EURO\"");
        assert!(parsed.is_err());

        let parsed: Currency = serde_json::from_str("\"eur\"").unwrap();
        assert_eq!(parsed.code(), "EUR");
    }

    #[test]
    fn test_pair_rejects_same_currency() {
        let usd = Currency::new("USD").unwrap();
        assert!(CurrencyPair::new(usd.clone(), usd).is_err());
    }

    #[test]
    fn test_pair_inverse_and_lock_order() {
        let ars = Currency::new("ARS").unwrap();
        let usd = Currency::new("USD").unwrap();

        let pair = CurrencyPair::new(usd.clone(), ars.clone()).unwrap();
        assert_eq!(pair.to_string(), "USD/ARS");
        assert_eq!(pair.inverse().to_string(), "ARS/USD");

        // Both directions lock in the same order
        assert_eq!(pair.lock_order(), (&ars, &usd));
        assert_eq!(pair.inverse().lock_order(), (&ars, &usd));
    }

    #[test]
    fn test_account_id_validation() {
        assert_eq!(AccountId::new(" client-1 ").unwrap().as_str(), "client-1");
        assert!(AccountId::new("   ").is_err());
    }

    #[test]
    fn test_transaction_ids_are_time_ordered() {
        let first = TransactionId::new();
        let second = TransactionId::new();
        assert!(first < second);
    }

    #[test]
    fn test_positive_amount() {
        assert!(positive_amount(dec!(0.01)).is_ok());
        assert!(positive_amount(dec!(0)).is_err());
        assert!(positive_amount(dec!(-5)).is_err());
    }

    #[test]
    fn test_reciprocal_rate_rounding() {
        assert_eq!(reciprocal_rate(dec!(1470.58824)).unwrap(), dec!(0.00068));
        assert_eq!(reciprocal_rate(dec!(3)).unwrap(), dec!(0.33333));
        // 1/1.5 = 0.666666... rounds up at the fifth place
        assert_eq!(reciprocal_rate(dec!(1.5)).unwrap(), dec!(0.66667));
    }

    #[test]
    fn test_exact_product() {
        assert_eq!(exact_product(dec!(100), dec!(0.92)), Some(dec!(92)));
        assert_eq!(exact_product(dec!(100.000), dec!(0.9200)), Some(dec!(92)));
        // 6.8e-28 needs 29 fractional digits
        assert_eq!(exact_product(dec!(0.000000000000000000000001), dec!(0.00068)), None);
        // 96-bit mantissa overflow with a fractional part rescales silently
        assert_eq!(exact_product(Decimal::MAX, dec!(0.5)), None);
        assert_eq!(exact_product(Decimal::MAX, dec!(2)), None);
    }

    #[test]
    fn test_reciprocal_rate_rejects_degenerate_rates() {
        assert!(reciprocal_rate(dec!(0)).is_err());
        assert!(reciprocal_rate(dec!(-2)).is_err());
        assert!(reciprocal_rate(dec!(500000)).is_err());
    }
}
