//! Test helpers for Arvault.
//!
//! Provides fixtures for the in-memory store and schema setup for
//! database-backed tests.

mod helpers;

pub use helpers::{
    account_id, currency, exchange_request, seeded_store, seeded_store_with_timeout,
    standard_seed,
};

use anyhow::Result;
use sqlx::PgPool;

/// Setup a clean test database by running migrations.
///
/// Convenience function for tests that need a fresh schema.
/// Migrations are located at `migrations/` relative to the workspace root.
pub async fn setup_test_db(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../migrations").run(pool).await?;
    Ok(())
}
