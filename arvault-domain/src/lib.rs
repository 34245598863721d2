//! Arvault Domain Layer
//!
//! Pure domain types for the currency exchange ledger: currencies, house
//! accounts, directed rates, exchange requests and journaled transactions.
//! No I/O lives here.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod requests;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    Account, ExchangeResult, FailureReason, Rate, Transaction, TransactionStatus,
};
pub use requests::{BalanceRequest, ExchangeOrder, ExchangeRequest, RateRequest};
pub use value_objects::{
    exact_product, positive_amount, reciprocal_rate, AccountId, Currency, CurrencyPair, DomainError,
    TransactionId, RECIPROCAL_RATE_SCALE,
};
