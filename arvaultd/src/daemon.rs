//! Daemon runtime.
//!
//! Lifecycle:
//! 1. Open the store (memory, or PostgreSQL with migrations applied)
//! 2. Seed house accounts and rates if configured and the store is empty
//! 3. Start API server
//! 4. Wait for Ctrl+C or a shutdown request, then drain the server

use std::net::SocketAddr;
use std::sync::Arc;

use arvault_db::{load_seed_file, seed, SeedData, SeedReport};
use arvault_engine::LedgerService;
use arvault_exec::{StubTransfer, TransferPort};
use arvault_store::{MemoryStore, Store};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::api::{create_router, ApiState};
use crate::config::{Config, StoreConfig};
use crate::error::{DaemonError, DaemonResult};
use crate::metrics::Metrics;

// =============================================================================
// Daemon
// =============================================================================

/// Main daemon runtime.
pub struct Daemon<S: Store, T: TransferPort + 'static> {
    /// Configuration
    config: Config,
    /// Backing store, shared with the service
    store: Arc<S>,
    /// State handed to the API router
    state: Arc<ApiState<S, T>>,
    /// Cancelled to stop the daemon
    shutdown: CancellationToken,
}

impl Daemon<MemoryStore, StubTransfer> {
    /// Create a daemon over an in-memory store and the stub transfer rail.
    pub fn new_memory(config: Config) -> DaemonResult<Self> {
        let store = MemoryStore::with_lock_timeout(config.ledger.lock_timeout);
        let transfers = stub_transfers(&config);
        Self::new(config, Arc::new(store), Arc::new(transfers))
    }
}

#[cfg(feature = "postgres")]
impl Daemon<arvault_store::PgStore, StubTransfer> {
    /// Connect to PostgreSQL, apply migrations and create a daemon over it.
    pub async fn connect_postgres(config: Config, database_url: &str) -> DaemonResult<Self> {
        use anyhow::Context;

        let pool = sqlx::PgPool::connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        arvault_db::migrate(&pool).await?;

        let store = arvault_store::PgStore::new(pool, config.ledger.lock_timeout);
        let transfers = stub_transfers(&config);
        Self::new(config, Arc::new(store), Arc::new(transfers))
    }
}

impl<S: Store, T: TransferPort + 'static> Daemon<S, T> {
    /// Create a daemon over the given store and transfer rail.
    pub fn new(config: Config, store: Arc<S>, transfers: Arc<T>) -> DaemonResult<Self> {
        let service = LedgerService::new(Arc::clone(&store), transfers);
        let state = Arc::new(ApiState::new(service, Metrics::new()?));

        Ok(Self {
            config,
            store,
            state,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops [`Daemon::run`] when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the daemon until Ctrl+C or the shutdown token is cancelled.
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            environment = %self.config.environment,
            store = %self.config.store,
            lock_timeout_ms = self.config.ledger.lock_timeout.as_millis() as u64,
            "Starting daemon"
        );

        // 1. Seed
        if self.config.ledger.seed {
            self.seed().await?;
        }

        // 2. Start API server
        let (api_addr, server) = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        // 3. Wait for shutdown
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received shutdown signal");
            }
            _ = self.shutdown.cancelled() => {
                info!("Shutdown requested");
            }
        }

        self.shutdown.cancel();
        if let Err(e) = server.await {
            error!(error = %e, "API server task failed");
        }

        info!("Shutdown complete");
        Ok(())
    }

    /// Seed the store from the configured seed file or the built-in data.
    pub async fn seed(&self) -> DaemonResult<SeedReport> {
        let data = match &self.config.ledger.seed_file {
            Some(path) => {
                info!(path = %path.display(), "Loading seed file");
                load_seed_file(path)?
            },
            None => SeedData::default(),
        };

        Ok(seed(self.store.as_ref(), &data).await?)
    }

    /// Bind the listener and serve the API until the shutdown token fires.
    async fn start_api_server(&self) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        let router = create_router(Arc::clone(&self.state));

        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            DaemonError::Config(format!("Failed to bind API server to {}: {}", addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        let token = self.shutdown.clone();
        let server = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, server))
    }
}

fn stub_transfers(config: &Config) -> StubTransfer {
    StubTransfer::with_latency(
        config.ledger.transfer_latency_min,
        config.ledger.transfer_latency_max,
    )
}

/// Build the daemon for the configured store and run it.
pub async fn run(config: Config) -> DaemonResult<()> {
    match config.store.clone() {
        StoreConfig::Memory => Daemon::new_memory(config)?.run().await,
        #[cfg(feature = "postgres")]
        StoreConfig::Postgres { database_url } => {
            Daemon::connect_postgres(config, &database_url).await?.run().await
        },
        #[cfg(not(feature = "postgres"))]
        StoreConfig::Postgres { .. } => Err(DaemonError::Config(
            "ARVAULT_STORE=postgres requires arvaultd built with the `postgres` feature".into(),
        )),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    #[tokio::test]
    async fn test_daemon_memory_creation() {
        let daemon = Daemon::new_memory(Config::test()).unwrap();

        assert_eq!(daemon.store.lock_timeout(), Duration::from_millis(500));
        assert!(daemon.store.accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_daemon_seeds_once() {
        let daemon = Daemon::new_memory(Config::test()).unwrap();

        let first = daemon.seed().await.unwrap();
        assert_eq!(first.accounts, 4);
        assert_eq!(first.rates, 6);

        let second = daemon.seed().await.unwrap();
        assert!(second.skipped);
    }

    #[tokio::test]
    async fn test_daemon_missing_seed_file() {
        let mut config = Config::test();
        config.ledger.seed_file = Some(PathBuf::from("/nonexistent/arvault-seed.json"));
        let daemon = Daemon::new_memory(config).unwrap();

        assert!(matches!(daemon.seed().await, Err(DaemonError::Database(_))));
    }

    #[tokio::test]
    async fn test_daemon_api_server_start_and_stop() {
        let daemon = Daemon::new_memory(Config::test()).unwrap();

        let (addr, server) = daemon.start_api_server().await.unwrap();
        assert_ne!(addr.port(), 0);

        daemon.shutdown_token().cancel();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server stops after cancellation")
            .unwrap();
    }

    #[tokio::test]
    async fn test_daemon_run_stops_on_cancel() {
        let daemon = Daemon::new_memory(Config::test()).unwrap();
        let token = daemon.shutdown_token();
        let store = Arc::clone(&daemon.store);

        let running = tokio::spawn(daemon.run());
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.accounts().await.unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("daemon seeds the store on start");
        token.cancel();

        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("daemon stops after cancellation")
            .unwrap()
            .unwrap();
    }
}
