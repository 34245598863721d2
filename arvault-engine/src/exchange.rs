//! Exchange engine.
//!
//! Executes one exchange as a single unit of work:
//!
//! ```text
//! validate → begin → rate (shared lock) → house accounts (exclusive, canonical order)
//!          → amount → liquidity → external legs → settle → journal → commit
//! ```
//!
//! Every balance is read only after its row lock is held and written before
//! the lock is released, so concurrent exchanges touching the same house
//! account serialize and no update is lost.
//!
//! Business failures (no rate, no house account, insufficient liquidity, an
//! amount whose product or settled balance a `Decimal` cannot hold exactly)
//! are journaled and committed as `ok = false`
//! records. Infrastructure failures abort the unit of work: nothing moves and
//! nothing is journaled.

use std::sync::Arc;

use arvault_domain::{
    exact_product, Account, Currency, ExchangeOrder, ExchangeRequest, ExchangeResult,
    FailureReason, Transaction,
};
use arvault_exec::{TransferLeg, TransferPort};
use arvault_store::{run_in_unit_of_work, Store, StoreError};
use rust_decimal::Decimal;
use tracing::{debug, error, info, instrument, warn};

use crate::accounts::AccountRegistry;
use crate::error::{EngineError, EngineResult};
use crate::journal::TransactionJournal;
use crate::rate_table::RateTable;

/// Concurrency-safe currency exchange over a [`Store`].
pub struct ExchangeEngine<S: Store, T: TransferPort> {
    store: Arc<S>,
    rates: RateTable<S>,
    accounts: AccountRegistry<S>,
    journal: TransactionJournal<S>,
    transfers: Arc<T>,
}

impl<S: Store, T: TransferPort> Clone for ExchangeEngine<S, T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            rates: self.rates.clone(),
            accounts: self.accounts.clone(),
            journal: self.journal.clone(),
            transfers: Arc::clone(&self.transfers),
        }
    }
}

impl<S: Store, T: TransferPort + 'static> ExchangeEngine<S, T> {
    /// Create an engine owning a store handle and an external transfer rail.
    pub fn new(store: Arc<S>, transfers: Arc<T>) -> Self {
        Self {
            rates: RateTable::new(Arc::clone(&store)),
            accounts: AccountRegistry::new(Arc::clone(&store)),
            journal: TransactionJournal::new(Arc::clone(&store)),
            store,
            transfers,
        }
    }

    /// Validate and execute an exchange request.
    ///
    /// # Errors
    /// - `Validation` for a malformed request (no store access, no journal entry)
    /// - any other variant when the unit of work was aborted
    pub async fn exchange(&self, request: &ExchangeRequest) -> EngineResult<ExchangeResult> {
        let order = request.validate().map_err(|err| {
            debug!(error = %err, "Exchange request rejected");
            EngineError::from(err)
        })?;
        self.exchange_order(order).await
    }

    /// Execute an already validated order.
    #[instrument(
        name = "exchange",
        skip(self, order),
        fields(pair = %order.pair, base_amount = %order.base_amount)
    )]
    pub async fn exchange_order(&self, order: ExchangeOrder) -> EngineResult<ExchangeResult> {
        let engine = self.clone();
        let pending = order.clone();

        let outcome = run_in_unit_of_work(self.store.as_ref(), move |uow| {
            Box::pin(async move { engine.process(uow, &pending).await })
        })
        .await;

        let record = match outcome {
            Ok(record) => record,
            Err(err) => {
                error!(kind = err.kind(), error = %err, "Exchange aborted; unit of work rolled back");
                return Err(err);
            },
        };

        if record.is_ok() {
            info!(
                transaction_id = %record.id,
                base_account = %record.base_account_id,
                counter_account = %record.counter_account_id,
                counter_amount = %record.counter_amount,
                rate = ?record.exchange_rate,
                "Exchange completed"
            );
        } else {
            warn!(
                transaction_id = %record.id,
                observation = record.observation.as_deref().unwrap_or_default(),
                "Exchange rejected"
            );
        }

        Ok(ExchangeResult::from_transaction(order, &record))
    }

    /// Body of the unit of work. `Ok` commits, `Err` rolls back.
    async fn process(
        &self,
        uow: &mut S::UnitOfWork,
        order: &ExchangeOrder,
    ) -> EngineResult<Transaction> {
        let Some(rate) = self.rates.get_with_lock(uow, &order.pair).await? else {
            return self.reject(uow, order, None, Decimal::ZERO, FailureReason::NoRate).await;
        };
        let rate = rate.rate;
        let counter_amount = exact_product(order.base_amount, rate);

        let (first, second) = order.pair.lock_order();
        let mut locked = Vec::with_capacity(2);
        for currency in [first, second] {
            match self.lock_house(uow, currency).await? {
                Some(account) => locked.push(account),
                None => {
                    let reason = FailureReason::NoHouseAccount(currency.clone());
                    let amount = counter_amount.unwrap_or(Decimal::ZERO);
                    return self.reject(uow, order, Some(rate), amount, reason).await;
                },
            }
        }
        let (Some(base_house), Some(counter_house)) = (
            take_for(&mut locked, order.pair.base()),
            take_for(&mut locked, order.pair.counter()),
        ) else {
            return Err(EngineError::Store(StoreError::Internal(
                "locked house accounts do not match the pair".to_string(),
            )));
        };

        let Some(counter_amount) = counter_amount else {
            return self
                .reject(uow, order, Some(rate), Decimal::ZERO, FailureReason::AmountOutOfRange)
                .await;
        };

        if !counter_house.can_cover(counter_amount) {
            debug!(
                available = %counter_house.balance,
                required = %counter_amount,
                "Counter house account short"
            );
            return self
                .reject(uow, order, Some(rate), counter_amount, FailureReason::InsufficientLiquidity)
                .await;
        }

        if base_house.balance.checked_add(order.base_amount).is_none() {
            debug!(balance = %base_house.balance, "Base house account would overflow");
            return self
                .reject(uow, order, Some(rate), counter_amount, FailureReason::AmountOutOfRange)
                .await;
        }

        self.move_external_funds(order, &base_house, &counter_house, counter_amount)
            .await?;

        self.accounts
            .settle(
                uow,
                (&base_house.id, order.base_amount),
                (&counter_house.id, counter_amount),
            )
            .await?;

        let record = Transaction::completed(order, rate, counter_amount);
        self.journal.append(uow, &record).await?;
        Ok(record)
    }

    /// Client base account → base house account, then counter house account →
    /// client counter account. No retry and no compensation.
    async fn move_external_funds(
        &self,
        order: &ExchangeOrder,
        base_house: &Account,
        counter_house: &Account,
        counter_amount: Decimal,
    ) -> EngineResult<()> {
        let inbound = TransferLeg::new(
            order.base_account_id.clone(),
            base_house.id.clone(),
            order.base_amount,
            order.pair.base().clone(),
        );
        let receipt = self.transfers.attempt(&inbound).await.map_err(|err| {
            warn!(leg = %inbound, error = %err, "Inbound transfer leg failed");
            err
        })?;
        debug!(reference = %receipt.reference, "Inbound leg completed");

        let outbound = TransferLeg::new(
            counter_house.id.clone(),
            order.counter_account_id.clone(),
            counter_amount,
            order.pair.counter().clone(),
        );
        let receipt_out = self.transfers.attempt(&outbound).await.map_err(|err| {
            warn!(
                leg = %outbound,
                inbound_reference = %receipt.reference,
                error = %err,
                "Outbound transfer leg failed"
            );
            err
        })?;
        debug!(reference = %receipt_out.reference, "Outbound leg completed");

        Ok(())
    }

    async fn lock_house(
        &self,
        uow: &mut S::UnitOfWork,
        currency: &Currency,
    ) -> EngineResult<Option<Account>> {
        match self.accounts.find_by_currency_with_lock(uow, currency).await {
            Ok(account) => Ok(Some(account)),
            Err(EngineError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn reject(
        &self,
        uow: &mut S::UnitOfWork,
        order: &ExchangeOrder,
        rate: Option<Decimal>,
        counter_amount: Decimal,
        reason: FailureReason,
    ) -> EngineResult<Transaction> {
        let record = Transaction::failed(order, rate, counter_amount, &reason);
        self.journal.append(uow, &record).await?;
        Ok(record)
    }
}

fn take_for(accounts: &mut Vec<Account>, currency: &Currency) -> Option<Account> {
    let index = accounts.iter().position(|a| &a.currency == currency)?;
    Some(accounts.swap_remove(index))
}

// =============================================================================
// Tests
// =============================================================================
