//! Storage layer errors

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (account, rate)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Duplicate entity (unique key violation)
    #[error("Duplicate entity: {entity_type} with id {id}")]
    Duplicate {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// A transfer named the same account on both sides
    #[error("Transfer source and destination are the same account: {0}")]
    SameAccount(String),

    /// A multi-row balance update touched fewer rows than requested
    #[error("Transfer mismatch: expected {expected} account updates, applied {applied}")]
    TransferMismatch {
        /// Rows the update should have touched
        expected: usize,
        /// Rows it actually touched
        applied: usize,
    },

    /// A balance update would leave the representable decimal range
    #[error("Balance overflow: {0}")]
    BalanceOverflow(String),

    /// A row lock could not be acquired within the lock timeout
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    /// The database aborted the unit of work to break a deadlock
    #[error("Deadlock detected: {0}")]
    Deadlock(String),

    /// The store cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Internal invariant broken (e.g. poisoned lock)
    #[error("Internal store error: {0}")]
    Internal(String),

    /// Domain error passthrough (a stored row failed validation)
    #[error("Domain error: {0}")]
    Domain(#[from] arvault_domain::DomainError),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Whether retrying the whole unit of work could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::LockTimeout(_) | StoreError::Deadlock(_) | StoreError::Unavailable(_)
        )
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::not_found("row", "unknown"),
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // lock_not_available, query_canceled (lock_timeout / statement_timeout)
                Some("55P03") | Some("57014") => StoreError::LockTimeout(db_err.to_string()),
                Some("40P01") => StoreError::Deadlock(db_err.to_string()),
                Some("23505") => StoreError::duplicate("row", db_err.to_string()),
                _ => StoreError::Database(db_err.to_string()),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            _ => StoreError::Database(err.to_string()),
        }
    }
}
