//! Fixture builders.
//!
//! These helpers panic on bad input: they only ever receive literals written
//! in tests.

use std::time::Duration;

use arvault_db::{seed, SeedData};
use arvault_domain::{AccountId, Currency, ExchangeRequest};
use arvault_store::MemoryStore;
use rust_decimal::Decimal;

/// Parse a currency code.
pub fn currency(code: &str) -> Currency {
    Currency::new(code).expect("valid currency code")
}

/// Parse an account id.
pub fn account_id(id: &str) -> AccountId {
    AccountId::new(id).expect("valid account id")
}

/// The default house accounts and rates:
///
/// | account   | currency | balance    |
/// |-----------|----------|------------|
/// | house-ars | ARS      | 10,000,000 |
/// | house-usd | USD      | 60,000     |
/// | house-eur | EUR      | 50,000     |
/// | house-brl | BRL      | 300,000    |
///
/// Rates: ARS/USD 0.00068, USD/EUR 0.92, USD/BRL 5.1 (reciprocals derived).
pub fn standard_seed() -> SeedData {
    SeedData::default()
}

/// A memory store holding `data`, with the default lock timeout.
pub async fn seeded_store(data: &SeedData) -> MemoryStore {
    let store = MemoryStore::new();
    seed(&store, data).await.expect("seed memory store");
    store
}

/// A memory store holding `data`, giving up on row locks after `timeout`.
pub async fn seeded_store_with_timeout(data: &SeedData, timeout: Duration) -> MemoryStore {
    let store = MemoryStore::with_lock_timeout(timeout);
    seed(&store, data).await.expect("seed memory store");
    store
}

/// A complete exchange request between `client-<base>` and `client-<counter>`.
pub fn exchange_request(base: &str, counter: &str, base_amount: Decimal) -> ExchangeRequest {
    ExchangeRequest {
        base_currency: Some(base.to_string()),
        counter_currency: Some(counter.to_string()),
        base_account_id: Some(format!("client-{}", base.to_lowercase())),
        counter_account_id: Some(format!("client-{}", counter.to_lowercase())),
        base_amount: Some(base_amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arvault_store::Store;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_seeded_store_has_standard_accounts() {
        let store = seeded_store(&standard_seed()).await;

        let usd = store.account_by_currency(&currency("USD")).await.unwrap().unwrap();
        assert_eq!(usd.id, account_id("house-usd"));
        assert_eq!(usd.balance, dec!(60000));
        assert_eq!(store.rates().await.unwrap().len(), 6);
    }

    #[test]
    fn test_exchange_request_is_valid() {
        let order = exchange_request("ARS", "USD", dec!(1)).validate().unwrap();
        assert_eq!(order.base_account_id, account_id("client-ars"));
    }
}
