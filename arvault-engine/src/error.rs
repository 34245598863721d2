//! Engine error types.

use thiserror::Error;

use arvault_domain::DomainError;
use arvault_exec::ExecError;
use arvault_store::StoreError;

/// Errors surfaced by the ledger engine.
///
/// Business outcomes (no rate, no house account, insufficient liquidity) are
/// not errors: they are journaled and returned as `ok = false` results.
/// Every variant here means nothing was persisted by the failing operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was malformed; rejected before any store access
    #[error("Validation error: {0}")]
    Validation(#[from] DomainError),

    /// An account or rate named by an administrative operation does not exist
    #[error("Not found: {entity_type} {id}")]
    NotFound {
        /// Type of entity (account, rate)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// A transfer named the same account on both sides
    #[error("Same account on both sides of a transfer: {0}")]
    SameAccount(String),

    /// A multi-row balance update did not touch every row it should have
    #[error("Transfer mismatch: expected {expected} account updates, applied {applied}")]
    TransferMismatch {
        /// Rows the update should have touched
        expected: usize,
        /// Rows it actually touched
        applied: usize,
    },

    /// An external transfer leg failed; the unit of work was aborted
    #[error("External transfer failed: {0}")]
    ExternalTransfer(#[from] ExecError),

    /// Lock timeout, deadlock, store unavailable or other storage failure
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl EngineError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Whether the caller sent a bad request (maps to 4xx)
    pub fn is_validation(&self) -> bool {
        matches!(self, EngineError::Validation(_) | EngineError::SameAccount(_))
    }

    /// Whether the operation named something that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound { .. } => "not_found",
            EngineError::SameAccount(_) => "same_account",
            EngineError::TransferMismatch { .. } => "transfer_mismatch",
            EngineError::ExternalTransfer(_) => "external_transfer",
            EngineError::Store(StoreError::LockTimeout(_)) => "lock_timeout",
            EngineError::Store(StoreError::Deadlock(_)) => "deadlock",
            EngineError::Store(StoreError::Unavailable(_)) => "store_unavailable",
            EngineError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity_type, id } => EngineError::NotFound { entity_type, id },
            StoreError::SameAccount(id) => EngineError::SameAccount(id),
            StoreError::TransferMismatch { expected, applied } => {
                EngineError::TransferMismatch { expected, applied }
            },
            other => EngineError::Store(other),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_classified() {
        let mismatch: EngineError = StoreError::TransferMismatch { expected: 2, applied: 0 }.into();
        assert_eq!(mismatch.kind(), "transfer_mismatch");
        assert!(!mismatch.is_validation());

        let timeout: EngineError = StoreError::LockTimeout("account house-usd".into()).into();
        assert_eq!(timeout.kind(), "lock_timeout");

        let missing: EngineError = StoreError::not_found("account", "nope").into();
        assert!(missing.is_not_found());
    }

    #[test]
    fn test_validation_classification() {
        let err: EngineError = DomainError::MissingField("baseAmount").into();
        assert!(err.is_validation());
        assert_eq!(err.kind(), "validation");
        assert!(EngineError::SameAccount("a".into()).is_validation());
    }
}
