//! Domain Entities for Arvault
//!
//! House accounts, directed rates, and the immutable transaction record
//! produced by every exchange attempt that reaches the ledger.

use crate::requests::ExchangeOrder;
use crate::value_objects::{AccountId, Currency, CurrencyPair, DomainError, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Account
// =============================================================================

/// A house account: the system's own holdings in one currency
///
/// Balances are exact decimals and are never rounded on mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account identifier
    pub id: AccountId,
    /// Currency held by this account (one house account per currency)
    pub currency: Currency,
    /// Current balance
    pub balance: Decimal,
    /// Last balance change
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a house account with an opening balance
    pub fn new(id: AccountId, currency: Currency, balance: Decimal) -> Self {
        Self {
            id,
            currency,
            balance,
            updated_at: Utc::now(),
        }
    }

    /// Check whether the account can pay out `amount`
    pub fn can_cover(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }
}

// =============================================================================
// Rate
// =============================================================================

/// Directed exchange rate: units of `counter_currency` per unit of `base_currency`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rate {
    /// Currency given
    pub base_currency: Currency,
    /// Currency received
    pub counter_currency: Currency,
    /// Units of counter per unit of base
    pub rate: Decimal,
    /// Last time this pair was set
    pub updated_at: DateTime<Utc>,
}

impl Rate {
    /// Create a rate for a pair
    ///
    /// # Errors
    /// Returns `DomainError::InvalidRate` if rate <= 0
    pub fn new(pair: &CurrencyPair, rate: Decimal) -> Result<Self, DomainError> {
        if rate <= Decimal::ZERO {
            return Err(DomainError::InvalidRate(format!(
                "Rate for {} must be positive, got {}",
                pair, rate
            )));
        }
        Ok(Self {
            base_currency: pair.base().clone(),
            counter_currency: pair.counter().clone(),
            rate,
            updated_at: Utc::now(),
        })
    }

    /// The directed pair this rate applies to
    pub fn pair(&self) -> Result<CurrencyPair, DomainError> {
        CurrencyPair::new(self.base_currency.clone(), self.counter_currency.clone())
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Outcome recorded for an exchange attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Both legs were applied
    Ok,
    /// A business rule rejected the exchange; no balance moved
    Failed,
}

impl TransactionStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Ok => "ok",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(TransactionStatus::Ok),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

/// Why an exchange completed with `ok = false`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No stored rate for the requested pair
    NoRate,
    /// No house account holds the given currency
    NoHouseAccount(Currency),
    /// The counter house account cannot pay out the computed amount
    InsufficientLiquidity,
    /// `base_amount * rate` does not fit in a decimal
    AmountOutOfRange,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoRate => write!(f, "no rate"),
            FailureReason::NoHouseAccount(currency) => {
                write!(f, "no house account for {}", currency)
            },
            FailureReason::InsufficientLiquidity => write!(f, "insufficient counter liquidity"),
            FailureReason::AmountOutOfRange => write!(f, "amount out of range"),
        }
    }
}

/// Immutable journal record of one exchange attempt
///
/// Client account ids are carried as given; house accounts are implied by
/// the currencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique, time-ordered id
    pub id: TransactionId,
    /// When the attempt was recorded
    pub timestamp: DateTime<Utc>,
    /// Currency given by the client
    pub base_currency: Currency,
    /// Currency received by the client
    pub counter_currency: Currency,
    /// Client account debited externally
    pub base_account_id: AccountId,
    /// Client account credited externally
    pub counter_account_id: AccountId,
    /// Amount of base currency
    pub base_amount: Decimal,
    /// Computed amount of counter currency (zero when no rate was found)
    pub counter_amount: Decimal,
    /// Rate applied, if one was resolved
    pub exchange_rate: Option<Decimal>,
    /// Outcome
    pub status: TransactionStatus,
    /// Failure explanation for `Failed` records
    pub observation: Option<String>,
}

impl Transaction {
    /// Record a completed exchange
    pub fn completed(order: &ExchangeOrder, rate: Decimal, counter_amount: Decimal) -> Self {
        Self::record(order, Some(rate), counter_amount, TransactionStatus::Ok, None)
    }

    /// Record an exchange rejected by a business rule
    pub fn failed(
        order: &ExchangeOrder,
        rate: Option<Decimal>,
        counter_amount: Decimal,
        reason: &FailureReason,
    ) -> Self {
        Self::record(order, rate, counter_amount, TransactionStatus::Failed, Some(reason.to_string()))
    }

    fn record(
        order: &ExchangeOrder,
        exchange_rate: Option<Decimal>,
        counter_amount: Decimal,
        status: TransactionStatus,
        observation: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            timestamp: Utc::now(),
            base_currency: order.pair.base().clone(),
            counter_currency: order.pair.counter().clone(),
            base_account_id: order.base_account_id.clone(),
            counter_account_id: order.counter_account_id.clone(),
            base_amount: order.base_amount,
            counter_amount,
            exchange_rate,
            status,
            observation,
        }
    }

    /// Whether both legs were applied
    pub fn is_ok(&self) -> bool {
        self.status == TransactionStatus::Ok
    }
}

// =============================================================================
// ExchangeResult
// =============================================================================

/// What the caller of an exchange receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeResult {
    /// Journal id of the attempt
    pub id: TransactionId,
    /// When the attempt was recorded
    pub timestamp: DateTime<Utc>,
    /// True when both legs were applied
    pub ok: bool,
    /// The request this result answers
    pub request: ExchangeOrder,
    /// Rate applied, if one was resolved
    pub exchange_rate: Option<Decimal>,
    /// Counter amount paid out (zero unless `ok`)
    pub counter_amount: Decimal,
    /// Failure explanation when `ok` is false
    pub observation: Option<String>,
}

impl ExchangeResult {
    /// Build the caller-facing result from the journaled record
    pub fn from_transaction(order: ExchangeOrder, transaction: &Transaction) -> Self {
        let ok = transaction.is_ok();
        Self {
            id: transaction.id,
            timestamp: transaction.timestamp,
            ok,
            request: order,
            exchange_rate: transaction.exchange_rate,
            counter_amount: if ok { transaction.counter_amount } else { Decimal::ZERO },
            observation: transaction.observation.clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::ExchangeRequest;
    use rust_decimal_macros::dec;

    fn order() -> ExchangeOrder {
        ExchangeRequest {
            base_currency: Some("ARS".to_string()),
            counter_currency: Some("USD".to_string()),
            base_account_id: Some("client-ars-1".to_string()),
            counter_account_id: Some("client-usd-1".to_string()),
            base_amount: Some(dec!(1000)),
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_rate_requires_positive_value() {
        let pair = order().pair;
        assert!(Rate::new(&pair, dec!(0.00068)).is_ok());
        assert!(Rate::new(&pair, dec!(0)).is_err());
    }

    #[test]
    fn test_status_round_trips_through_storage_form() {
        assert_eq!("ok".parse::<TransactionStatus>().unwrap(), TransactionStatus::Ok);
        assert_eq!(TransactionStatus::Failed.as_str(), "failed");
        assert!("pending".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn test_failed_result_reports_zero_counter_amount() {
        let order = order();
        let record = Transaction::failed(
            &order,
            Some(dec!(0.00068)),
            dec!(0.68),
            &FailureReason::InsufficientLiquidity,
        );

        assert_eq!(record.counter_amount, dec!(0.68));
        assert_eq!(record.observation.as_deref(), Some("insufficient counter liquidity"));

        let result = ExchangeResult::from_transaction(order, &record);
        assert!(!result.ok);
        assert_eq!(result.counter_amount, Decimal::ZERO);
        assert_eq!(result.id, record.id);
    }

    #[test]
    fn test_completed_result_serializes_camel_case() {
        let order = order();
        let record = Transaction::completed(&order, dec!(0.00068), dec!(0.68));
        let result = ExchangeResult::from_transaction(order, &record);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ok"], serde_json::json!(true));
        assert_eq!(json["counterAmount"], serde_json::json!("0.68"));
        assert_eq!(json["request"]["baseCurrency"], serde_json::json!("ARS"));
        assert!(json["observation"].is_null());
    }
}
