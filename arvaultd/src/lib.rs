//! Arvault Daemon Library
//!
//! Runtime host for the multi-currency house ledger.
//!
//! # Architecture
//!
//! ```text
//! HTTP client → API (axum) → LedgerService → ExchangeEngine → Store
//!                                                  ↓
//!                                            TransferPort (external legs)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Store setup, seeding, API server lifecycle, graceful shutdown
//! - **API**: HTTP endpoints for accounts, rates, the log and exchanges
//! - **Metrics**: Prometheus registry exposed at `/metrics`
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use arvaultd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config).expect("Failed to build daemon");
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod metrics;

#[cfg(feature = "postgres")]
pub mod db;

// Re-exports for convenience
pub use api::{create_router, ApiState, ErrorResponse, HealthResponse};
pub use config::{ApiConfig, Config, Environment, LedgerConfig, LogFormat, StoreConfig};
pub use daemon::{run, Daemon};
pub use error::{DaemonError, DaemonResult};
pub use metrics::Metrics;
