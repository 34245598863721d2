//! Execution layer port definitions.
//!
//! The ledger only moves its own house balances. Funds entering or leaving a
//! client account go through a [`TransferPort`], which adapters implement for
//! a concrete payment rail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use arvault_domain::{AccountId, Currency};

use crate::error::ExecError;

// =============================================================================
// Transfer Port
// =============================================================================

/// Port for moving funds between an external client account and a house account.
///
/// Implementations:
/// - `StubTransfer` - For testing and development (scripted outcomes, optional latency)
///
/// There is no automatic retry: a failed attempt is reported once and the
/// caller decides what to do.
#[async_trait]
pub trait TransferPort: Send + Sync {
    /// Move `leg.amount` of `leg.currency` from `leg.from` to `leg.to`.
    ///
    /// # Returns
    ///
    /// `TransferReceipt` on success, `ExecError` if the funds did not move.
    async fn attempt(&self, leg: &TransferLeg) -> Result<TransferReceipt, ExecError>;

    /// Check if the transfer service is reachable.
    async fn health_check(&self) -> Result<(), ExecError>;
}

/// One directed movement of funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    /// Account debited
    pub from: AccountId,
    /// Account credited
    pub to: AccountId,
    /// Amount moved (> 0)
    pub amount: Decimal,
    /// Currency of `amount`
    pub currency: Currency,
}

impl TransferLeg {
    /// Describe a transfer leg
    pub fn new(from: AccountId, to: AccountId, amount: Decimal, currency: Currency) -> Self {
        Self {
            from,
            to,
            amount,
            currency,
        }
    }
}

impl fmt::Display for TransferLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} -> {}", self.amount, self.currency, self.from, self.to)
    }
}

/// Proof that a leg completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Reference assigned by the transfer service
    pub reference: String,
    /// The leg that was executed
    pub leg: TransferLeg,
    /// When the funds moved
    pub completed_at: DateTime<Utc>,
}
