//! In-memory store implementation
//!
//! Used for tests and development without a database.
//!
//! Committed state lives behind `std::sync::RwLock`s that are only held for
//! the duration of a copy or a publish, never across an await. Isolation comes
//! from per-row `tokio::sync::Mutex` locks: a unit of work must own a row's
//! lock before it reads that row, and it keeps the lock until it finishes.
//! Writes are buffered in the unit of work and published in one step on commit.

use crate::error::StoreError;
use crate::repository::{merge_deltas, Store, UnitOfWork};
use arvault_domain::{Account, AccountId, Currency, CurrencyPair, Rate, Transaction};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Default time a unit of work waits for a row lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

type RateKey = (Currency, Currency);

/// Lockable row identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum RowKey {
    Account(AccountId),
    Rate(Currency, Currency),
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowKey::Account(id) => write!(f, "account {}", id),
            RowKey::Rate(base, counter) => write!(f, "rate {}/{}", base, counter),
        }
    }
}

#[derive(Default)]
struct Committed {
    accounts: RwLock<BTreeMap<AccountId, Account>>,
    rates: RwLock<BTreeMap<RateKey, Rate>>,
    transactions: RwLock<Vec<Transaction>>,
}

struct Inner {
    committed: Committed,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    lock_timeout: Duration,
}

impl Inner {
    fn row_lock(&self, key: &RowKey) -> Result<Arc<RowMutex<()>>, StoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::Internal("row lock table poisoned".to_string()))?;
        Ok(locks.entry(key.clone()).or_default().clone())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Internal("committed state poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Internal("committed state poisoned".to_string()))
}

fn rate_key(pair: &CurrencyPair) -> RateKey {
    (pair.base().clone(), pair.counter().clone())
}

/// In-memory ledger store
///
/// Cloning is cheap and every clone shares the same state.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Create an empty store with the default lock timeout
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store whose units of work give up on a row lock after `timeout`
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                committed: Committed::default(),
                row_locks: Mutex::new(HashMap::new()),
                lock_timeout: timeout,
            }),
        }
    }

    /// Configured row lock timeout
    pub fn lock_timeout(&self) -> Duration {
        self.inner.lock_timeout
    }

    /// Number of journaled transactions
    pub fn transaction_count(&self) -> Result<usize, StoreError> {
        Ok(read(&self.inner.committed.transactions)?.len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type UnitOfWork = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, StoreError> {
        Ok(MemoryUnitOfWork {
            inner: Arc::clone(&self.inner),
            guards: HashMap::new(),
            accounts: BTreeMap::new(),
            rates: BTreeMap::new(),
            transactions: Vec::new(),
        })
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> =
            read(&self.inner.committed.accounts)?.values().cloned().collect();
        accounts.sort_by(|a, b| a.currency.cmp(&b.currency));
        Ok(accounts)
    }

    async fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        Ok(read(&self.inner.committed.accounts)?.get(id).cloned())
    }

    async fn account_by_currency(
        &self,
        currency: &Currency,
    ) -> Result<Option<Account>, StoreError> {
        Ok(read(&self.inner.committed.accounts)?
            .values()
            .find(|a| &a.currency == currency)
            .cloned())
    }

    async fn rates(&self) -> Result<Vec<Rate>, StoreError> {
        Ok(read(&self.inner.committed.rates)?.values().cloned().collect())
    }

    async fn rate(&self, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError> {
        Ok(read(&self.inner.committed.rates)?.get(&rate_key(pair)).cloned())
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(read(&self.inner.committed.transactions)?.iter().rev().cloned().collect())
    }

    async fn health(&self) -> Result<(), StoreError> {
        read(&self.inner.committed.accounts).map(|_| ())
    }
}

// =============================================================================
// Unit of work
// =============================================================================

/// Unit of work over a [`MemoryStore`]
///
/// Holds the row locks it has taken and the writes it has buffered.
pub struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    accounts: BTreeMap<AccountId, Account>,
    rates: BTreeMap<RateKey, Rate>,
    transactions: Vec<Transaction>,
}

impl MemoryUnitOfWork {
    async fn lock(&mut self, key: RowKey) -> Result<(), StoreError> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }

        let mutex = self.inner.row_lock(&key)?;
        let guard = tokio::time::timeout(self.inner.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                warn!(row = %key, timeout_ms = self.inner.lock_timeout.as_millis() as u64, "Row lock timed out");
                StoreError::LockTimeout(format!(
                    "{} not acquired within {}ms",
                    key,
                    self.inner.lock_timeout.as_millis()
                ))
            })?;

        debug!(row = %key, "Row lock acquired");
        self.guards.insert(key, guard);
        Ok(())
    }

    /// Lock every key not already held, in sorted order
    async fn lock_all(&mut self, keys: BTreeSet<RowKey>) -> Result<(), StoreError> {
        for key in keys {
            self.lock(key).await?;
        }
        Ok(())
    }

    fn current_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        if let Some(pending) = self.accounts.get(id) {
            return Ok(Some(pending.clone()));
        }
        Ok(read(&self.inner.committed.accounts)?.get(id).cloned())
    }

    fn account_id_for(&self, currency: &Currency) -> Result<Option<AccountId>, StoreError> {
        // Currency ownership never changes once an account exists
        if let Some(pending) = self.accounts.values().find(|a| &a.currency == currency) {
            return Ok(Some(pending.id.clone()));
        }
        Ok(read(&self.inner.committed.accounts)?
            .values()
            .find(|a| &a.currency == currency)
            .map(|a| a.id.clone()))
    }

    fn publish(&mut self) -> Result<(), StoreError> {
        let committed = &self.inner.committed;
        let mut accounts = write(&committed.accounts)?;
        let mut rates = write(&committed.rates)?;
        let mut transactions = write(&committed.transactions)?;

        accounts.extend(std::mem::take(&mut self.accounts));
        rates.extend(std::mem::take(&mut self.rates));
        transactions.append(&mut self.transactions);
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn rate_for_share(&mut self, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError> {
        let key = rate_key(pair);
        self.lock(RowKey::Rate(key.0.clone(), key.1.clone())).await?;

        if let Some(pending) = self.rates.get(&key) {
            return Ok(Some(pending.clone()));
        }
        Ok(read(&self.inner.committed.rates)?.get(&key).cloned())
    }

    async fn upsert_rate(&mut self, rate: &Rate) -> Result<(), StoreError> {
        self.lock(RowKey::Rate(rate.base_currency.clone(), rate.counter_currency.clone()))
            .await?;
        self.rates.insert(
            (rate.base_currency.clone(), rate.counter_currency.clone()),
            rate.clone(),
        );
        Ok(())
    }

    async fn account_by_currency_for_update(
        &mut self,
        currency: &Currency,
    ) -> Result<Option<Account>, StoreError> {
        match self.account_id_for(currency)? {
            Some(id) => self.account_for_update(&id).await,
            None => Ok(None),
        }
    }

    async fn account_for_update(&mut self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        self.lock(RowKey::Account(id.clone())).await?;
        self.current_account(id)
    }

    async fn adjust_balances(
        &mut self,
        deltas: &[(AccountId, Decimal)],
    ) -> Result<Vec<Account>, StoreError> {
        let merged = merge_deltas(deltas)?;
        self.lock_all(merged.keys().cloned().map(RowKey::Account).collect()).await?;

        let now = Utc::now();
        let mut updated = Vec::with_capacity(merged.len());
        for (id, delta) in &merged {
            if let Some(mut account) = self.current_account(id)? {
                account.balance = account.balance.checked_add(*delta).ok_or_else(|| {
                    StoreError::BalanceOverflow(format!("account {} by {}", id, delta))
                })?;
                account.updated_at = now;
                updated.push(account);
            }
        }

        if updated.len() != merged.len() {
            return Err(StoreError::TransferMismatch {
                expected: merged.len(),
                applied: updated.len(),
            });
        }

        for account in &updated {
            self.accounts.insert(account.id.clone(), account.clone());
        }
        Ok(updated)
    }

    async fn set_balance(
        &mut self,
        id: &AccountId,
        balance: Decimal,
    ) -> Result<Option<Account>, StoreError> {
        let Some(mut account) = self.account_for_update(id).await? else {
            return Ok(None);
        };
        account.balance = balance;
        account.updated_at = Utc::now();
        self.accounts.insert(id.clone(), account.clone());
        Ok(Some(account))
    }

    async fn insert_account(&mut self, account: &Account) -> Result<bool, StoreError> {
        self.lock(RowKey::Account(account.id.clone())).await?;

        if self.current_account(&account.id)?.is_some()
            || self.account_id_for(&account.currency)?.is_some()
        {
            return Ok(false);
        }
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(true)
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        let duplicate = self.transactions.iter().any(|t| t.id == transaction.id)
            || read(&self.inner.committed.transactions)?
                .iter()
                .any(|t| t.id == transaction.id);
        if duplicate {
            return Err(StoreError::duplicate("transaction", transaction.id.to_string()));
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.publish()?;
        debug!(rows = self.guards.len(), "Unit of work committed");
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        debug!(rows = self.guards.len(), "Unit of work rolled back");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::run_in_unit_of_work;
    use arvault_domain::{ExchangeRequest, Transaction};
    use rust_decimal_macros::dec;

    fn currency(code: &str) -> Currency {
        Currency::new(code).unwrap()
    }

    fn account_id(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(100));
        let mut uow = store.begin().await.unwrap();
        uow.insert_account(&Account::new(account_id("house-usd"), currency("USD"), dec!(1000)))
            .await
            .unwrap();
        uow.insert_account(&Account::new(account_id("house-ars"), currency("ARS"), dec!(0)))
            .await
            .unwrap();
        uow.commit().await.unwrap();
        store
    }

    fn journal_record() -> Transaction {
        let order = ExchangeRequest {
            base_currency: Some("ARS".into()),
            counter_currency: Some("USD".into()),
            base_account_id: Some("client-ars".into()),
            counter_account_id: Some("client-usd".into()),
            base_amount: Some(dec!(100)),
        }
        .validate()
        .unwrap();
        Transaction::completed(&order, dec!(0.001), dec!(0.1))
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = seeded().await;

        let mut uow = store.begin().await.unwrap();
        uow.adjust_balances(&[(account_id("house-usd"), dec!(-250.5))]).await.unwrap();
        uow.insert_transaction(&journal_record()).await.unwrap();

        // Not visible before commit
        let before = store.account(&account_id("house-usd")).await.unwrap().unwrap();
        assert_eq!(before.balance, dec!(1000));

        uow.commit().await.unwrap();

        let after = store.account(&account_id("house-usd")).await.unwrap().unwrap();
        assert_eq!(after.balance, dec!(749.5));
        assert_eq!(store.transaction_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drop_discards_writes_and_releases_locks() {
        let store = seeded().await;

        {
            let mut uow = store.begin().await.unwrap();
            uow.set_balance(&account_id("house-usd"), dec!(1)).await.unwrap();
        }

        let mut uow = store.begin().await.unwrap();
        let account = uow.account_for_update(&account_id("house-usd")).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(1000));
        uow.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_adjust_balances_is_all_or_nothing() {
        let store = seeded().await;

        let mut uow = store.begin().await.unwrap();
        let err = uow
            .adjust_balances(&[
                (account_id("house-usd"), dec!(-10)),
                (account_id("missing"), dec!(10)),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TransferMismatch { expected: 2, applied: 1 }));

        // Nothing was buffered for the account that does exist
        let account = uow.account_for_update(&account_id("house-usd")).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_adjust_balances_rejects_overflow() {
        let store = seeded().await;

        let mut uow = store.begin().await.unwrap();
        uow.set_balance(&account_id("house-usd"), Decimal::MAX).await.unwrap();
        let err = uow
            .adjust_balances(&[
                (account_id("house-ars"), dec!(-1)),
                (account_id("house-usd"), dec!(1)),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BalanceOverflow(_)));

        // The other row in the batch was left alone
        let ars = uow.account_for_update(&account_id("house-ars")).await.unwrap().unwrap();
        assert_eq!(ars.balance, dec!(0));
        uow.commit().await.unwrap();
        let usd = store.account(&account_id("house-usd")).await.unwrap().unwrap();
        assert_eq!(usd.balance, Decimal::MAX);
    }

    #[tokio::test]
    async fn test_row_lock_times_out() {
        let store = seeded().await;

        let mut holder = store.begin().await.unwrap();
        holder.account_by_currency_for_update(&currency("USD")).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = waiter
            .account_by_currency_for_update(&currency("USD"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout(_)));

        // Disjoint rows are not blocked
        assert!(waiter
            .account_by_currency_for_update(&currency("ARS"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_lock_is_reentrant_within_unit_of_work() {
        let store = seeded().await;
        let mut uow = store.begin().await.unwrap();

        uow.account_for_update(&account_id("house-usd")).await.unwrap();
        uow.account_by_currency_for_update(&currency("USD")).await.unwrap();
        uow.adjust_balances(&[(account_id("house-usd"), dec!(1))]).await.unwrap();
        uow.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_account_rejects_taken_currency() {
        let store = seeded().await;
        let mut uow = store.begin().await.unwrap();

        let second_usd = Account::new(account_id("other-usd"), currency("USD"), dec!(5));
        assert!(!uow.insert_account(&second_usd).await.unwrap());

        let brl = Account::new(account_id("house-brl"), currency("BRL"), dec!(5));
        assert!(uow.insert_account(&brl).await.unwrap());
        uow.commit().await.unwrap();

        let accounts = store.accounts().await.unwrap();
        let codes: Vec<&str> = accounts.iter().map(|a| a.currency.code()).collect();
        assert_eq!(codes, vec!["ARS", "BRL", "USD"]);
    }

    #[tokio::test]
    async fn test_run_in_unit_of_work_rolls_back_on_error() {
        let store = seeded().await;

        let result: Result<(), StoreError> = run_in_unit_of_work(&store, |uow| {
            Box::pin(async move {
                uow.adjust_balances(&[(AccountId::new("house-usd")?, dec!(-1000))]).await?;
                Err(StoreError::Internal("abort".to_string()))
            })
        })
        .await;

        assert!(result.is_err());
        let account = store.account(&account_id("house-usd")).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(1000));
    }

    #[tokio::test]
    async fn test_journal_is_newest_first() {
        let store = seeded().await;

        let first = journal_record();
        let second = journal_record();
        for record in [&first, &second] {
            let mut uow = store.begin().await.unwrap();
            uow.insert_transaction(record).await.unwrap();
            uow.commit().await.unwrap();
        }

        let log = store.transactions().await.unwrap();
        assert_eq!(log[0].id, second.id);
        assert_eq!(log[1].id, first.id);
    }

    #[tokio::test]
    async fn test_rate_upsert_visible_after_commit() {
        let store = seeded().await;
        let pair = CurrencyPair::new(currency("ARS"), currency("USD")).unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.upsert_rate(&Rate::new(&pair, dec!(0.00068)).unwrap()).await.unwrap();
        assert_eq!(uow.rate_for_share(&pair).await.unwrap().unwrap().rate, dec!(0.00068));
        assert!(store.rate(&pair).await.unwrap().is_none());
        uow.commit().await.unwrap();

        assert_eq!(store.rate(&pair).await.unwrap().unwrap().rate, dec!(0.00068));
    }
}
