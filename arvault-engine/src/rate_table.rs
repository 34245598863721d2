//! Directed exchange rates and the reciprocal-pair invariant.
//!
//! For every stored `(B, C)` with rate `r` there is a stored `(C, B)` with
//! `round(1/r, 5)`. Both rows are only ever written together, inside one
//! unit of work.

use std::sync::Arc;

use arvault_domain::{reciprocal_rate, CurrencyPair, Rate};
use arvault_store::{Store, StoreError, UnitOfWork};
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Lookup and update of directed currency-pair rates.
pub struct RateTable<S: Store> {
    store: Arc<S>,
}

impl<S: Store> Clone for RateTable<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> RateTable<S> {
    /// Create a rate table over a store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Point lookup without locking.
    pub async fn get(&self, pair: &CurrencyPair) -> EngineResult<Rate> {
        self.store
            .rate(pair)
            .await?
            .ok_or_else(|| EngineError::not_found("rate", pair.to_string()))
    }

    /// Every stored rate, ordered by (base, counter).
    pub async fn all(&self) -> EngineResult<Vec<Rate>> {
        Ok(self.store.rates().await?)
    }

    /// Lookup holding a shared row lock until `uow` finishes.
    ///
    /// `None` means no rate is stored for the pair.
    pub async fn get_with_lock(
        &self,
        uow: &mut S::UnitOfWork,
        pair: &CurrencyPair,
    ) -> Result<Option<Rate>, StoreError> {
        uow.rate_for_share(pair).await
    }

    /// Upsert `pair` at `rate` and its inverse at the rounded reciprocal.
    ///
    /// Rows are written in canonical pair order so two concurrent updates of
    /// the same currencies in opposite directions cannot deadlock. Returns
    /// `(direct, inverse)`.
    ///
    /// # Errors
    /// `Validation` if the rate is not positive or its reciprocal rounds to zero;
    /// nothing is written in that case.
    pub async fn set(
        &self,
        uow: &mut S::UnitOfWork,
        pair: &CurrencyPair,
        rate: Decimal,
    ) -> EngineResult<(Rate, Rate)> {
        let direct = Rate::new(pair, rate)?;
        let inverse = Rate::new(&pair.inverse(), reciprocal_rate(rate)?)?;

        let (first, second) = if pair.base() <= pair.counter() {
            (&direct, &inverse)
        } else {
            (&inverse, &direct)
        };
        uow.upsert_rate(first).await?;
        uow.upsert_rate(second).await?;

        debug!(pair = %pair, rate = %direct.rate, inverse = %inverse.rate, "Rate pair written");
        Ok((direct, inverse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arvault_domain::Currency;
    use arvault_store::MemoryStore;
    use rust_decimal_macros::dec;

    fn pair(base: &str, counter: &str) -> CurrencyPair {
        CurrencyPair::new(Currency::new(base).unwrap(), Currency::new(counter).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_set_writes_reciprocal() {
        let store = Arc::new(MemoryStore::new());
        let table = RateTable::new(Arc::clone(&store));

        let mut uow = store.begin().await.unwrap();
        let (direct, inverse) = table.set(&mut uow, &pair("ARS", "USD"), dec!(0.00068)).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(direct.rate, dec!(0.00068));
        assert_eq!(inverse.rate, dec!(1470.58824));
        assert_eq!(table.get(&pair("ARS", "USD")).await.unwrap().rate, dec!(0.00068));
        assert_eq!(table.get(&pair("USD", "ARS")).await.unwrap().rate, dec!(1470.58824));
    }

    #[tokio::test]
    async fn test_set_rejects_degenerate_rate_without_writing() {
        let store = Arc::new(MemoryStore::new());
        let table = RateTable::new(Arc::clone(&store));

        let mut uow = store.begin().await.unwrap();
        let err = table.set(&mut uow, &pair("USD", "ARS"), dec!(1000000)).await.unwrap_err();
        assert!(err.is_validation());
        uow.commit().await.unwrap();

        assert!(table.all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let table = RateTable::new(Arc::new(MemoryStore::new()));
        let err = table.get(&pair("EUR", "BRL")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_with_lock_reports_absence() {
        let store = Arc::new(MemoryStore::new());
        let table = RateTable::new(Arc::clone(&store));

        let mut uow = store.begin().await.unwrap();
        assert!(table.get_with_lock(&mut uow, &pair("EUR", "BRL")).await.unwrap().is_none());
    }
}
