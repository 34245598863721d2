//! Inbound requests and their validated forms.
//!
//! Requests arrive with every field optional so that a missing field is a
//! validation error rather than a deserialization failure.

use crate::value_objects::{positive_amount, AccountId, Currency, CurrencyPair, DomainError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Raw exchange request as received from a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    /// Currency the client gives
    pub base_currency: Option<String>,
    /// Currency the client receives
    pub counter_currency: Option<String>,
    /// Client account to debit
    pub base_account_id: Option<String>,
    /// Client account to credit
    pub counter_account_id: Option<String>,
    /// Amount of base currency
    pub base_amount: Option<Decimal>,
}

/// A validated exchange request
///
/// Serialized with the pair spread into `baseCurrency` / `counterCurrency`
/// so a result echoes the request in the shape it was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "OrderFields", try_from = "OrderFields")]
pub struct ExchangeOrder {
    /// Directed pair (base → counter)
    pub pair: CurrencyPair,
    /// Client account to debit
    pub base_account_id: AccountId,
    /// Client account to credit
    pub counter_account_id: AccountId,
    /// Amount of base currency (> 0)
    pub base_amount: Decimal,
}

impl ExchangeRequest {
    /// Validate all five fields
    ///
    /// # Errors
    /// - `MissingField` when any field is absent or blank
    /// - `InvalidCurrency` / `InvalidCurrencyPair` for bad codes or identical sides
    /// - `InvalidAmount` when `baseAmount <= 0`
    pub fn validate(&self) -> Result<ExchangeOrder, DomainError> {
        let base = Currency::new(required(&self.base_currency, "baseCurrency")?)?;
        let counter = Currency::new(required(&self.counter_currency, "counterCurrency")?)?;
        let base_account_id = AccountId::new(required(&self.base_account_id, "baseAccountId")?)?;
        let counter_account_id =
            AccountId::new(required(&self.counter_account_id, "counterAccountId")?)?;
        let base_amount = positive_amount(self.base_amount.ok_or(DomainError::MissingField("baseAmount"))?)?;

        Ok(ExchangeOrder {
            pair: CurrencyPair::new(base, counter)?,
            base_account_id,
            counter_account_id,
            base_amount,
        })
    }
}

/// Raw request to set a directed rate (and its reciprocal)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    /// Base currency
    pub base_currency: Option<String>,
    /// Counter currency
    pub counter_currency: Option<String>,
    /// Units of counter per unit of base
    pub rate: Option<Decimal>,
}

impl RateRequest {
    /// Validate the pair and rate
    ///
    /// # Errors
    /// Returns `MissingField`, `InvalidCurrency`, `InvalidCurrencyPair` or `InvalidRate`
    pub fn validate(&self) -> Result<(CurrencyPair, Decimal), DomainError> {
        let base = Currency::new(required(&self.base_currency, "baseCurrency")?)?;
        let counter = Currency::new(required(&self.counter_currency, "counterCurrency")?)?;
        let rate = self.rate.ok_or(DomainError::MissingField("rate"))?;
        if rate <= Decimal::ZERO {
            return Err(DomainError::InvalidRate(format!("Rate must be positive, got {}", rate)));
        }
        Ok((CurrencyPair::new(base, counter)?, rate))
    }
}

/// Raw administrative balance update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRequest {
    /// New absolute balance
    pub balance: Option<Decimal>,
}

impl BalanceRequest {
    /// Validate the balance is present
    ///
    /// Negative balances are allowed: this is an administrative override.
    pub fn validate(&self) -> Result<Decimal, DomainError> {
        self.balance.ok_or(DomainError::MissingField("balance"))
    }
}

fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, DomainError> {
    match field.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DomainError::MissingField(name)),
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderFields {
    base_currency: Currency,
    counter_currency: Currency,
    base_account_id: AccountId,
    counter_account_id: AccountId,
    base_amount: Decimal,
}

impl From<ExchangeOrder> for OrderFields {
    fn from(order: ExchangeOrder) -> Self {
        Self {
            base_currency: order.pair.base().clone(),
            counter_currency: order.pair.counter().clone(),
            base_account_id: order.base_account_id,
            counter_account_id: order.counter_account_id,
            base_amount: order.base_amount,
        }
    }
}

impl TryFrom<OrderFields> for ExchangeOrder {
    type Error = DomainError;

    fn try_from(fields: OrderFields) -> Result<Self, Self::Error> {
        Ok(Self {
            pair: CurrencyPair::new(fields.base_currency, fields.counter_currency)?,
            base_account_id: fields.base_account_id,
            counter_account_id: fields.counter_account_id,
            base_amount: positive_amount(fields.base_amount)?,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
