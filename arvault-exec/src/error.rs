//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur while moving funds outside the ledger.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The counterparty refused the transfer
    #[error("Transfer rejected: {0}")]
    Rejected(String),

    /// The transfer service could not be reached
    #[error("Transfer service unavailable: {0}")]
    Unavailable(String),

    /// Timeout waiting for the transfer service
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] arvault_domain::DomainError),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
