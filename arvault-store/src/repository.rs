//! Store trait definitions (Ports)
//!
//! Reads that need no isolation go straight to the [`Store`]. Everything that
//! locks or mutates goes through a [`UnitOfWork`]: there is no way to write a
//! balance, a rate or a journal entry outside of one.

use crate::error::StoreError;
use arvault_domain::{Account, AccountId, Currency, CurrencyPair, Rate, Transaction};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use tracing::warn;

/// Boxed future returned by the body of [`run_in_unit_of_work`]
pub type UnitOfWorkFuture<'u, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'u>>;

/// One atomic, isolated group of reads and writes
///
/// Row locks taken through a unit of work are held until it is committed,
/// rolled back or dropped. Dropping without committing discards every write.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a rate, holding a shared lock on the row
    async fn rate_for_share(&mut self, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError>;

    /// Insert or replace the rate for `rate`'s pair
    async fn upsert_rate(&mut self, rate: &Rate) -> Result<(), StoreError>;

    /// Read the house account for a currency, holding an exclusive row lock
    async fn account_by_currency_for_update(
        &mut self,
        currency: &Currency,
    ) -> Result<Option<Account>, StoreError>;

    /// Read an account by id, holding an exclusive row lock
    async fn account_for_update(&mut self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    /// Apply signed balance deltas to several accounts in one step
    ///
    /// Either every row is updated or none is: a missing account yields
    /// `StoreError::TransferMismatch`. Deltas for the same id are summed.
    async fn adjust_balances(
        &mut self,
        deltas: &[(AccountId, Decimal)],
    ) -> Result<Vec<Account>, StoreError>;

    /// Overwrite an account balance; `None` when the account does not exist
    async fn set_balance(
        &mut self,
        id: &AccountId,
        balance: Decimal,
    ) -> Result<Option<Account>, StoreError>;

    /// Create an account unless its id or currency is already taken
    ///
    /// Returns whether a row was inserted.
    async fn insert_account(&mut self, account: &Account) -> Result<bool, StoreError>;

    /// Append a journal record
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError>;

    /// Make every write visible and release all locks
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every write and release all locks
    async fn rollback(self) -> Result<(), StoreError>;
}

/// Ledger storage: non-locking reads plus a factory for units of work
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Unit of work type produced by [`Store::begin`]
    type UnitOfWork: UnitOfWork;

    /// Open a unit of work
    async fn begin(&self) -> Result<Self::UnitOfWork, StoreError>;

    /// All accounts, ordered by currency
    async fn accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Find an account by id
    async fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    /// Find the house account for a currency
    async fn account_by_currency(&self, currency: &Currency)
        -> Result<Option<Account>, StoreError>;

    /// All rates, ordered by (base, counter)
    async fn rates(&self) -> Result<Vec<Rate>, StoreError>;

    /// Find the rate for a directed pair
    async fn rate(&self, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError>;

    /// Journal, newest first
    async fn transactions(&self) -> Result<Vec<Transaction>, StoreError>;

    /// Check the store can serve requests
    async fn health(&self) -> Result<(), StoreError>;
}

/// Run `body` inside a fresh unit of work
///
/// Commits when `body` returns `Ok`, rolls back when it returns `Err`. A failed
/// rollback is logged and the original error is returned.
///
/// ```rust
/// use arvault_store::{run_in_unit_of_work, MemoryStore, StoreError, UnitOfWork};
/// use arvault_domain::{Account, AccountId, Currency};
/// use rust_decimal::Decimal;
///
/// #[tokio::main]
/// async fn main() -> Result<(), StoreError> {
///     let store = MemoryStore::new();
///     let account = Account::new(
///         AccountId::new("house-usd")?,
///         Currency::new("USD")?,
///         Decimal::new(100, 0),
///     );
///
///     let inserted = run_in_unit_of_work(&store, move |uow| {
///         Box::pin(async move { uow.insert_account(&account).await })
///     })
///     .await?;
///
///     assert!(inserted);
///     Ok(())
/// }
/// ```
pub async fn run_in_unit_of_work<S, F, T, E>(store: &S, body: F) -> Result<T, E>
where
    S: Store,
    F: for<'u> FnOnce(&'u mut S::UnitOfWork) -> UnitOfWorkFuture<'u, T, E> + Send,
    T: Send,
    E: From<StoreError> + Send,
{
    let mut uow = store.begin().await?;

    match body(&mut uow).await {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        },
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "Rollback failed; unit of work discarded");
            }
            Err(err)
        },
    }
}

/// Sum deltas per account so each row is touched once
pub(crate) fn merge_deltas(
    deltas: &[(AccountId, Decimal)],
) -> Result<BTreeMap<AccountId, Decimal>, StoreError> {
    let mut merged = BTreeMap::new();
    for (id, delta) in deltas {
        let total = merged.entry(id.clone()).or_insert(Decimal::ZERO);
        *total = total
            .checked_add(*delta)
            .ok_or_else(|| StoreError::BalanceOverflow(format!("delta for account {}", id)))?;
    }
    Ok(merged)
}
