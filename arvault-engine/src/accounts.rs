//! House account lookup and balance mutation.

use std::sync::Arc;

use arvault_domain::{positive_amount, Account, AccountId, Currency};
use arvault_store::{Store, UnitOfWork};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Registry of house accounts, one per currency.
pub struct AccountRegistry<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for AccountRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> AccountRegistry<S> {
    /// Create a registry over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every account, ordered by currency.
    pub async fn all(&self) -> EngineResult<Vec<Account>> {
        Ok(self.store.accounts().await?)
    }

    /// House account for a currency, without locking.
    pub async fn find_by_currency(&self, currency: &Currency) -> EngineResult<Account> {
        self.store
            .account_by_currency(currency)
            .await?
            .ok_or_else(|| EngineError::not_found("account", currency.code()))
    }

    /// House account for a currency, exclusively locked until `uow` finishes.
    pub async fn find_by_currency_with_lock(
        &self,
        uow: &mut S::UnitOfWork,
        currency: &Currency,
    ) -> EngineResult<Account> {
        uow.account_by_currency_for_update(currency)
            .await?
            .ok_or_else(|| EngineError::not_found("account", currency.code()))
    }

    /// Move `amount` from one account to another in a single update.
    ///
    /// # Errors
    /// - `SameAccount` when `from == to`
    /// - `Validation` when `amount <= 0`
    /// - `TransferMismatch` when either account does not exist; no leg is applied
    pub async fn transfer(
        &self,
        uow: &mut S::UnitOfWork,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
    ) -> EngineResult<(Account, Account)> {
        if from == to {
            return Err(EngineError::SameAccount(from.to_string()));
        }
        let amount = positive_amount(amount)?;

        let updated = uow
            .adjust_balances(&[(from.clone(), -amount), (to.clone(), amount)])
            .await?;

        let find = |id: &AccountId| updated.iter().find(|a| &a.id == id).cloned();
        match (find(from), find(to)) {
            (Some(source), Some(destination)) => {
                debug!(from = %from, to = %to, amount = %amount, "Transfer applied");
                Ok((source, destination))
            },
            (source, destination) => Err(EngineError::TransferMismatch {
                expected: 2,
                applied: usize::from(source.is_some()) + usize::from(destination.is_some()),
            }),
        }
    }

    /// Credit one house account and debit another by different amounts in a
    /// single update. Used by an exchange, where the two legs are in different
    /// currencies.
    ///
    /// Returns `(credited, debited)`.
    pub async fn settle(
        &self,
        uow: &mut S::UnitOfWork,
        credit: (&AccountId, Decimal),
        debit: (&AccountId, Decimal),
    ) -> EngineResult<(Account, Account)> {
        let (credit_id, credit_amount) = credit;
        let (debit_id, debit_amount) = debit;
        if credit_id == debit_id {
            return Err(EngineError::SameAccount(credit_id.to_string()));
        }

        let updated = uow
            .adjust_balances(&[(credit_id.clone(), credit_amount), (debit_id.clone(), -debit_amount)])
            .await?;

        let find = |id: &AccountId| updated.iter().find(|a| &a.id == id).cloned();
        match (find(credit_id), find(debit_id)) {
            (Some(credited), Some(debited)) => Ok((credited, debited)),
            (credited, debited) => Err(EngineError::TransferMismatch {
                expected: 2,
                applied: usize::from(credited.is_some()) + usize::from(debited.is_some()),
            }),
        }
    }

    /// Administrative absolute balance write.
    ///
    /// # Errors
    /// `NotFound` when no account has this id.
    pub async fn set_balance(
        &self,
        uow: &mut S::UnitOfWork,
        id: &AccountId,
        balance: Decimal,
    ) -> EngineResult<Account> {
        uow.set_balance(id, balance)
            .await?
            .ok_or_else(|| EngineError::not_found("account", id.as_str()))
    }
}
