//! Append-only transaction journal.

use std::sync::Arc;

use arvault_domain::Transaction;
use arvault_store::{Store, UnitOfWork};

use crate::error::EngineResult;

/// Immutable record of every exchange attempt that reached the store.
pub struct TransactionJournal<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for TransactionJournal<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> TransactionJournal<S> {
    /// Create a journal over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a record; visible once `uow` commits.
    pub async fn append(&self, uow: &mut S::UnitOfWork, record: &Transaction) -> EngineResult<()> {
        uow.insert_transaction(record).await?;
        Ok(())
    }

    /// Every record, newest first.
    pub async fn find_all(&self) -> EngineResult<Vec<Transaction>> {
        Ok(self.store.transactions().await?)
    }
}
