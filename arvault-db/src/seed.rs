//! Seeding of house accounts and exchange rates.
//!
//! Seeding runs once per store: if any account or rate already exists the
//! seed is skipped. Otherwise every account and rate pair is written in a
//! single unit of work, reciprocals included.

use std::path::Path;

use anyhow::Context;
use arvault_domain::{reciprocal_rate, Account, AccountId, Currency, CurrencyPair, Rate};
use arvault_store::{run_in_unit_of_work, Store, StoreError, UnitOfWork};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::Result;

/// Seed file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedData {
    /// House accounts, one per currency
    pub accounts: Vec<SeedAccount>,
    /// Directed rates; reciprocals are derived
    pub rates: Vec<SeedRate>,
}

/// One house account to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAccount {
    /// Account id
    pub id: String,
    /// Currency code
    pub currency: String,
    /// Opening balance
    pub balance: Decimal,
}

/// One directed rate to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedRate {
    /// Base currency code
    pub base_currency: String,
    /// Counter currency code
    pub counter_currency: String,
    /// Units of counter per unit of base
    pub rate: Decimal,
}

/// What a seed run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Accounts inserted
    pub accounts: usize,
    /// Rate rows written (two per seeded pair)
    pub rates: usize,
    /// The store already held data; nothing was written
    pub skipped: bool,
}

impl Default for SeedData {
    /// ARS, USD, EUR and BRL house accounts with rates against USD.
    fn default() -> Self {
        let account = |id: &str, currency: &str, balance: i64| SeedAccount {
            id: id.to_string(),
            currency: currency.to_string(),
            balance: Decimal::from(balance),
        };
        let rate = |base: &str, counter: &str, rate: Decimal| SeedRate {
            base_currency: base.to_string(),
            counter_currency: counter.to_string(),
            rate,
        };

        Self {
            accounts: vec![
                account("house-ars", "ARS", 10_000_000),
                account("house-usd", "USD", 60_000),
                account("house-eur", "EUR", 50_000),
                account("house-brl", "BRL", 300_000),
            ],
            rates: vec![
                rate("ARS", "USD", Decimal::new(68, 5)),
                rate("USD", "EUR", Decimal::new(92, 2)),
                rate("USD", "BRL", Decimal::new(51, 1)),
            ],
        }
    }
}

/// Validated seed content.
struct Prepared {
    accounts: Vec<Account>,
    rates: Vec<Rate>,
}

impl SeedData {
    fn prepare(&self) -> Result<Prepared> {
        let mut accounts = Vec::with_capacity(self.accounts.len());
        for seed in &self.accounts {
            accounts.push(Account::new(
                AccountId::new(seed.id.as_str())?,
                Currency::new(&seed.currency)?,
                seed.balance,
            ));
        }

        let mut rates = Vec::with_capacity(self.rates.len() * 2);
        for seed in &self.rates {
            let pair = CurrencyPair::new(
                Currency::new(&seed.base_currency)?,
                Currency::new(&seed.counter_currency)?,
            )?;
            rates.push(Rate::new(&pair, seed.rate)?);
            rates.push(Rate::new(&pair.inverse(), reciprocal_rate(seed.rate)?)?);
        }
        // Canonical order keeps concurrent writers from deadlocking
        rates.sort_by(|a, b| {
            (&a.base_currency, &a.counter_currency).cmp(&(&b.base_currency, &b.counter_currency))
        });

        Ok(Prepared { accounts, rates })
    }
}

/// Load seed data from a JSON file.
pub fn load_seed_file(path: impl AsRef<Path>) -> Result<SeedData> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))
}

/// Seed house accounts and rates unless the store already holds data.
pub async fn seed<S: Store>(store: &S, data: &SeedData) -> Result<SeedReport> {
    if !store.accounts().await?.is_empty() || !store.rates().await?.is_empty() {
        info!("Store already seeded, skipping");
        return Ok(SeedReport {
            skipped: true,
            ..SeedReport::default()
        });
    }

    let Prepared { accounts, rates } = data.prepare()?;

    let report = run_in_unit_of_work(store, move |uow| {
        Box::pin(async move {
            let mut report = SeedReport::default();
            for account in &accounts {
                if uow.insert_account(account).await? {
                    report.accounts += 1;
                }
            }
            for rate in &rates {
                uow.upsert_rate(rate).await?;
                report.rates += 1;
            }
            Ok::<_, StoreError>(report)
        })
    })
    .await?;

    info!(accounts = report.accounts, rates = report.rates, "Seed data written");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arvault_store::MemoryStore;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_default_seed_writes_reciprocals() {
        let store = MemoryStore::new();

        let report = seed(&store, &SeedData::default()).await.unwrap();
        assert_eq!(report, SeedReport { accounts: 4, rates: 6, skipped: false });

        let usd_ars = CurrencyPair::new(Currency::new("USD").unwrap(), Currency::new("ARS").unwrap())
            .unwrap();
        assert_eq!(store.rate(&usd_ars).await.unwrap().unwrap().rate, dec!(1470.58824));
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryStore::new();
        seed(&store, &SeedData::default()).await.unwrap();

        let second = seed(&store, &SeedData::default()).await.unwrap();
        assert!(second.skipped);
        assert_eq!(store.accounts().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_seed_writes_nothing() {
        let store = MemoryStore::new();
        let mut data = SeedData::default();
        data.rates.push(SeedRate {
            base_currency: "USD".into(),
            counter_currency: "USD".into(),
            rate: dec!(1),
        });

        assert!(seed(&store, &data).await.is_err());
        assert!(store.accounts().await.unwrap().is_empty());
    }

    #[test]
    fn test_seed_file_format() {
        let data: SeedData = serde_json::from_str(
            r#"{
                "accounts": [{"id": "house-jpy", "currency": "JPY", "balance": "1000000"}],
                "rates": [{"baseCurrency": "USD", "counterCurrency": "JPY", "rate": 150}]
            }"#,
        )
        .unwrap();

        assert_eq!(data.accounts[0].balance, dec!(1000000));
        assert_eq!(data.rates[0].rate, dec!(150));
    }
}
