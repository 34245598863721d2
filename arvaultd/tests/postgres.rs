//! PostgreSQL-backed ledger tests.
//!
//! Run with `cargo test -p arvaultd --features postgres` and `DATABASE_URL`
//! pointing at a server where the test user may create databases.

#![cfg(feature = "postgres")]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;

use arvault_db::seed;
use arvault_engine::{EngineError, LedgerService};
use arvault_exec::StubTransfer;
use arvault_store::{PgStore, Store, StoreError, UnitOfWork};
use arvault_testkit::{currency, exchange_request, standard_seed};

async fn service(
    pool: PgPool,
    lock_timeout: Duration,
) -> (Arc<PgStore>, Arc<StubTransfer>, LedgerService<PgStore, StubTransfer>) {
    let store = Arc::new(PgStore::new(pool, lock_timeout));
    seed(store.as_ref(), &standard_seed()).await.unwrap();
    let transfers = Arc::new(StubTransfer::new());
    let service = LedgerService::new(Arc::clone(&store), Arc::clone(&transfers));
    (store, transfers, service)
}

async fn balance(store: &PgStore, code: &str) -> Decimal {
    store.account_by_currency(&currency(code)).await.unwrap().unwrap().balance
}

#[sqlx::test(migrations = "../migrations")]
async fn test_pg_exchange_settles_and_journals(pool: PgPool) {
    let (store, _, service) = service(pool, Duration::from_secs(2)).await;

    let result = service
        .exchange(&exchange_request("USD", "EUR", dec!(100)))
        .await
        .unwrap();

    assert!(result.ok);
    assert_eq!(result.counter_amount, dec!(92));
    assert_eq!(balance(&store, "USD").await, dec!(60100));
    assert_eq!(balance(&store, "EUR").await, dec!(49908));

    let log = service.get_log().await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].id, result.id);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_pg_set_rate_writes_reciprocal(pool: PgPool) {
    let (_, _, service) = service(pool, Duration::from_secs(2)).await;

    service
        .set_rate(&arvault_domain::RateRequest {
            base_currency: Some("EUR".into()),
            counter_currency: Some("BRL".into()),
            rate: Some(dec!(5.5)),
        })
        .await
        .unwrap();

    let rates = service.get_rates().await.unwrap();
    assert_eq!(rates.len(), 8);
    let brl_eur = rates
        .iter()
        .find(|r| r.base_currency.code() == "BRL" && r.counter_currency.code() == "EUR")
        .unwrap();
    assert_eq!(brl_eur.rate, dec!(0.18182));
}

#[sqlx::test(migrations = "../migrations")]
async fn test_pg_transfer_failure_rolls_back(pool: PgPool) {
    let (store, transfers, service) = service(pool, Duration::from_secs(2)).await;
    transfers.set_fail_next(true);

    let err = service
        .exchange(&exchange_request("USD", "EUR", dec!(100)))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::ExternalTransfer(_)));
    assert_eq!(balance(&store, "USD").await, dec!(60000));
    assert!(service.get_log().await.unwrap().is_empty());
}

#[sqlx::test(migrations = "../migrations")]
async fn test_pg_concurrent_exchanges_respect_liquidity(pool: PgPool) {
    let (store, _, service) = service(pool, Duration::from_secs(5)).await;
    let service = Arc::new(service);
    let amount = dec!(60000) / dec!(0.00068);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service.exchange(&exchange_request("ARS", "USD", amount)).await
            })
        })
        .collect();

    let mut paid = Decimal::ZERO;
    let mut ok = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.ok {
            ok += 1;
            paid += result.counter_amount;
        }
    }

    assert_eq!(ok, 1);
    let usd = balance(&store, "USD").await;
    assert!(usd >= Decimal::ZERO);
    assert_eq!(usd, dec!(60000) - paid);
    assert_eq!(service.get_log().await.unwrap().len(), 2);
}

#[sqlx::test(migrations = "../migrations")]
async fn test_pg_lock_timeout_aborts(pool: PgPool) {
    let (store, _, service) = service(pool, Duration::from_millis(200)).await;

    let mut holder = store.begin().await.unwrap();
    holder
        .account_by_currency_for_update(&currency("EUR"))
        .await
        .unwrap()
        .unwrap();

    let err = service
        .exchange(&exchange_request("USD", "EUR", dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::LockTimeout(_))));

    holder.rollback().await.unwrap();
    assert_eq!(balance(&store, "EUR").await, dec!(50000));
    assert!(service.get_log().await.unwrap().is_empty());
}
