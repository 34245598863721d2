//! Database CLI subcommands for arvaultd.
//!
//! Provides `db migrate`, `db status`, and `db seed` commands.

use anyhow::{anyhow, Result};
use std::env;
use tracing::info;

use arvault_db::{load_seed_file, migrate, seed, status, SeedData};
use arvault_store::{PgStore, DEFAULT_LOCK_TIMEOUT};

/// Run database CLI subcommands.
///
/// Supported commands:
/// - `arvaultd db migrate` - Run pending migrations
/// - `arvaultd db status` - Check migration status
/// - `arvaultd db seed [--file PATH]` - Seed house accounts and rates into an empty database
pub async fn run_db_command(args: &[String]) -> Result<()> {
    let Some(command) = args.first() else {
        return Err(anyhow!("Usage: arvaultd db <migrate|status|seed> [options]"));
    };

    let database_url = env::var("DATABASE_URL")
        .map_err(|_| anyhow!("DATABASE_URL environment variable is required for db commands"))?;

    let pool = sqlx::PgPool::connect(&database_url).await?;

    match command.as_str() {
        "migrate" => {
            migrate(&pool).await?;
        },
        "status" => {
            status(&pool).await?;
        },
        "seed" => {
            let data = match args.get(1).map(String::as_str) {
                Some("--file") => {
                    let path = args.get(2).ok_or_else(|| anyhow!("--file requires a value"))?;
                    load_seed_file(path)?
                },
                Some(other) => return Err(anyhow!("Unknown option: {}", other)),
                None => SeedData::default(),
            };

            let store = PgStore::new(pool, DEFAULT_LOCK_TIMEOUT);
            let report = seed(&store, &data).await?;
            info!(
                accounts = report.accounts,
                rates = report.rates,
                skipped = report.skipped,
                "Seed finished"
            );
        },
        other => {
            return Err(anyhow!("Unknown db command: {}", other));
        },
    }

    Ok(())
}
