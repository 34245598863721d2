//! PostgreSQL store.
//!
//! Every unit of work is a database transaction with a `lock_timeout` set
//! locally, so a blocked row lock surfaces as `StoreError::LockTimeout`
//! instead of waiting forever.
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{merge_deltas, Store, UnitOfWork};
use arvault_domain::{
    Account, AccountId, Currency, CurrencyPair, Rate, Transaction, TransactionId,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row};
use std::time::Duration;
use tracing::debug;

const ACCOUNT_COLUMNS: &str = "id, currency, balance, updated_at";
const RATE_COLUMNS: &str = "base_currency, counter_currency, rate, updated_at";
const TRANSACTION_COLUMNS: &str = "id, created_at, base_currency, counter_currency, \
    base_account_id, counter_account_id, base_amount, counter_amount, exchange_rate, \
    status, observation";

/// PostgreSQL-backed ledger store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Wrap a pool; units of work wait at most `lock_timeout` for a row lock
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type UnitOfWork = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(PgUnitOfWork { tx })
    }

    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM accounts ORDER BY currency",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_account).collect()
    }

    async fn account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(parse_account).transpose()
    }

    async fn account_by_currency(
        &self,
        currency: &Currency,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE currency = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(currency.code())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_account).transpose()
    }

    async fn rates(&self) -> Result<Vec<Rate>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM exchange_rates ORDER BY base_currency, counter_currency",
            RATE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_rate).collect()
    }

    async fn rate(&self, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM exchange_rates WHERE base_currency = $1 AND counter_currency = $2",
            RATE_COLUMNS
        ))
        .bind(pair.base().code())
        .bind(pair.counter().code())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_rate).transpose()
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transactions ORDER BY created_at DESC, id DESC",
            TRANSACTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_transaction).collect()
    }

    async fn health(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Unit of work
// =============================================================================

/// Unit of work backed by a PostgreSQL transaction
pub struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn rate_for_share(&mut self, pair: &CurrencyPair) -> Result<Option<Rate>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM exchange_rates \
             WHERE base_currency = $1 AND counter_currency = $2 FOR SHARE",
            RATE_COLUMNS
        ))
        .bind(pair.base().code())
        .bind(pair.counter().code())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_rate).transpose()
    }

    async fn upsert_rate(&mut self, rate: &Rate) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exchange_rates (base_currency, counter_currency, rate, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (base_currency, counter_currency)
            DO UPDATE SET rate = EXCLUDED.rate, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(rate.base_currency.code())
        .bind(rate.counter_currency.code())
        .bind(rate.rate)
        .bind(rate.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn account_by_currency_for_update(
        &mut self,
        currency: &Currency,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE currency = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(currency.code())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_account).transpose()
    }

    async fn account_for_update(&mut self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = $1 FOR UPDATE",
            ACCOUNT_COLUMNS
        ))
        .bind(id.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_account).transpose()
    }

    async fn adjust_balances(
        &mut self,
        deltas: &[(AccountId, Decimal)],
    ) -> Result<Vec<Account>, StoreError> {
        let merged = merge_deltas(deltas)?;
        let ids: Vec<String> = merged.keys().map(|id| id.as_str().to_string()).collect();
        let amounts: Vec<Decimal> = merged.values().copied().collect();

        // One statement: either every listed row changes or the caller rolls back
        let rows = sqlx::query(
            r#"
            UPDATE accounts AS a
            SET balance = a.balance + d.delta, updated_at = NOW()
            FROM UNNEST($1::text[], $2::numeric[]) AS d(id, delta)
            WHERE a.id = d.id
            RETURNING a.id, a.currency, a.balance, a.updated_at
            "#,
        )
        .bind(&ids)
        .bind(&amounts)
        .fetch_all(&mut *self.tx)
        .await?;

        if rows.len() != merged.len() {
            return Err(StoreError::TransferMismatch {
                expected: merged.len(),
                applied: rows.len(),
            });
        }

        debug!(accounts = rows.len(), "Balances adjusted");
        rows.iter().map(parse_account).collect()
    }

    async fn set_balance(
        &mut self,
        id: &AccountId,
        balance: Decimal,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE accounts SET balance = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            ACCOUNT_COLUMNS
        ))
        .bind(id.as_str())
        .bind(balance)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(parse_account).transpose()
    }

    async fn insert_account(&mut self, account: &Account) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, currency, balance, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(account.id.as_str())
        .bind(account.currency.code())
        .bind(account.balance)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        sqlx::query(&format!(
            "INSERT INTO transactions ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            TRANSACTION_COLUMNS
        ))
        .bind(transaction.id.as_uuid())
        .bind(transaction.timestamp)
        .bind(transaction.base_currency.code())
        .bind(transaction.counter_currency.code())
        .bind(transaction.base_account_id.as_str())
        .bind(transaction.counter_account_id.as_str())
        .bind(transaction.base_amount)
        .bind(transaction.counter_amount)
        .bind(transaction.exchange_rate)
        .bind(transaction.status.as_str())
        .bind(transaction.observation.as_deref())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// =============================================================================
// Row parsing
// =============================================================================

fn parse_account(row: &PgRow) -> Result<Account, StoreError> {
    let id: String = row.try_get("id")?;
    let currency: String = row.try_get("currency")?;
    Ok(Account {
        id: AccountId::new(id)?,
        currency: Currency::new(&currency)?,
        balance: row.try_get("balance")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_rate(row: &PgRow) -> Result<Rate, StoreError> {
    let base: String = row.try_get("base_currency")?;
    let counter: String = row.try_get("counter_currency")?;
    Ok(Rate {
        base_currency: Currency::new(&base)?,
        counter_currency: Currency::new(&counter)?,
        rate: row.try_get("rate")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn parse_transaction(row: &PgRow) -> Result<Transaction, StoreError> {
    let base_currency: String = row.try_get("base_currency")?;
    let counter_currency: String = row.try_get("counter_currency")?;
    let base_account_id: String = row.try_get("base_account_id")?;
    let counter_account_id: String = row.try_get("counter_account_id")?;
    let status: String = row.try_get("status")?;

    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id")?),
        timestamp: row.try_get("created_at")?,
        base_currency: Currency::new(&base_currency)?,
        counter_currency: Currency::new(&counter_currency)?,
        base_account_id: AccountId::new(base_account_id)?,
        counter_account_id: AccountId::new(counter_account_id)?,
        base_amount: row.try_get("base_amount")?,
        counter_amount: row.try_get("counter_amount")?,
        exchange_rate: row.try_get("exchange_rate")?,
        status: status.parse()?,
        observation: row.try_get("observation")?,
    })
}
