//! Ledger service: the inbound operations exposed to callers.
//!
//! Thin facade over the rate table, account registry, journal and exchange
//! engine. Each mutating call runs in its own unit of work.

use std::sync::Arc;

use arvault_domain::{
    Account, AccountId, BalanceRequest, ExchangeRequest, ExchangeResult, RateRequest, Rate,
    Transaction,
};
use arvault_exec::TransferPort;
use arvault_store::{run_in_unit_of_work, Store};
use tracing::info;

use crate::accounts::AccountRegistry;
use crate::error::{EngineError, EngineResult};
use crate::exchange::ExchangeEngine;
use crate::journal::TransactionJournal;
use crate::rate_table::RateTable;

/// Inbound ledger operations.
pub struct LedgerService<S: Store, T: TransferPort> {
    store: Arc<S>,
    transfers: Arc<T>,
    engine: ExchangeEngine<S, T>,
    rates: RateTable<S>,
    accounts: AccountRegistry<S>,
    journal: TransactionJournal<S>,
}

impl<S: Store, T: TransferPort + 'static> LedgerService<S, T> {
    /// Wire a service over a store handle and a transfer rail.
    pub fn new(store: Arc<S>, transfers: Arc<T>) -> Self {
        Self {
            engine: ExchangeEngine::new(Arc::clone(&store), Arc::clone(&transfers)),
            rates: RateTable::new(Arc::clone(&store)),
            accounts: AccountRegistry::new(Arc::clone(&store)),
            journal: TransactionJournal::new(Arc::clone(&store)),
            store,
            transfers,
        }
    }

    /// Execute an exchange.
    pub async fn exchange(&self, request: &ExchangeRequest) -> EngineResult<ExchangeResult> {
        self.engine.exchange(request).await
    }

    /// Set a rate and its reciprocal atomically.
    ///
    /// Returns `(direct, inverse)` as written.
    pub async fn set_rate(&self, request: &RateRequest) -> EngineResult<(Rate, Rate)> {
        let (pair, rate) = request.validate()?;
        let rates = self.rates.clone();
        let target = pair.clone();

        let (direct, inverse) = run_in_unit_of_work(self.store.as_ref(), move |uow| {
            Box::pin(async move { rates.set(uow, &target, rate).await })
        })
        .await?;

        info!(pair = %pair, rate = %direct.rate, inverse = %inverse.rate, "Rate set");
        Ok((direct, inverse))
    }

    /// Every stored rate.
    pub async fn get_rates(&self) -> EngineResult<Vec<Rate>> {
        self.rates.all().await
    }

    /// Every account.
    pub async fn get_accounts(&self) -> EngineResult<Vec<Account>> {
        self.accounts.all().await
    }

    /// Administrative balance overwrite.
    ///
    /// # Errors
    /// `Validation` for a blank id or missing balance, `NotFound` for an unknown id.
    pub async fn set_account_balance(
        &self,
        id: &str,
        request: &BalanceRequest,
    ) -> EngineResult<Account> {
        let id = AccountId::new(id)?;
        let balance = request.validate()?;
        let accounts = self.accounts.clone();
        let target = id.clone();

        let account = run_in_unit_of_work(self.store.as_ref(), move |uow| {
            Box::pin(async move { accounts.set_balance(uow, &target, balance).await })
        })
        .await?;

        info!(account = %id, currency = %account.currency, balance = %account.balance, "Balance set");
        Ok(account)
    }

    /// Journal, newest first.
    pub async fn get_log(&self) -> EngineResult<Vec<Transaction>> {
        self.journal.find_all().await
    }

    /// Check the store and the transfer rail.
    pub async fn health(&self) -> EngineResult<()> {
        self.store.health().await?;
        self.transfers.health_check().await.map_err(EngineError::from)
    }
}
