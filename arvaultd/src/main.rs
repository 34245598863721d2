//! Arvault Daemon
//!
//! Multi-currency house ledger with an HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store, seeded)
//! cargo run -p arvaultd
//!
//! # Start against PostgreSQL
//! ARVAULT_STORE=postgres DATABASE_URL=postgres://localhost/arvault \
//!     cargo run -p arvaultd --features postgres
//!
//! # Database maintenance (postgres feature)
//! cargo run -p arvaultd --features postgres -- db migrate
//! cargo run -p arvaultd --features postgres -- db status
//! cargo run -p arvaultd --features postgres -- db seed --file seed.json
//! ```
//!
//! # Environment Variables
//!
//! - `ARVAULT_ENV`: Environment (test, development, production)
//! - `ARVAULT_API_HOST`: API host (default: 0.0.0.0)
//! - `ARVAULT_API_PORT`: API port (default: 3000)
//! - `ARVAULT_STORE`: memory or postgres (default: memory)
//! - `DATABASE_URL`: PostgreSQL connection string
//! - `ARVAULT_LOCK_TIMEOUT_MS`: Row lock timeout (default: 5000)
//! - `ARVAULT_TRANSFER_LATENCY_MIN_MS` / `ARVAULT_TRANSFER_LATENCY_MAX_MS`: Stub transfer latency (default: 0)
//! - `ARVAULT_SEED`: Seed an empty store on start (default: true outside production)
//! - `ARVAULT_SEED_FILE`: JSON seed file
//! - `ARVAULT_LOG_FORMAT`: text or json (default: text)

use arvaultd::{Config, LogFormat};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::from_default_env().add_directive("arvaultd=info".parse()?);
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init(),
        LogFormat::Text => tracing_subscriber::registry().with(fmt::layer()).with(filter).init(),
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("db") {
        return run_db(&args[1..]).await;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        store = %config.store,
        "Arvault Daemon"
    );

    arvaultd::run(config).await?;

    Ok(())
}

#[cfg(feature = "postgres")]
async fn run_db(args: &[String]) -> anyhow::Result<()> {
    arvaultd::db::run_db_command(args).await
}

#[cfg(not(feature = "postgres"))]
async fn run_db(_args: &[String]) -> anyhow::Result<()> {
    Err(anyhow::anyhow!("db commands require arvaultd built with the `postgres` feature"))
}
