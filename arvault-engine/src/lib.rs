//! Arvault Engine Layer
//!
//! Rate table, house account registry, transaction journal and the exchange
//! engine that ties them together inside a unit of work.
//!
//! # Example
//!
//! ```rust,ignore
//! use arvault_engine::LedgerService;
//! use arvault_exec::StubTransfer;
//! use arvault_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let service = LedgerService::new(Arc::new(MemoryStore::new()), Arc::new(StubTransfer::new()));
//! let result = service.exchange(&request).await?;
//! ```

#![warn(clippy::all)]

pub mod accounts;
pub mod error;
pub mod exchange;
pub mod journal;
pub mod rate_table;
pub mod service;

// Re-exports for convenience
pub use accounts::AccountRegistry;
pub use error::{EngineError, EngineResult};
pub use exchange::ExchangeEngine;
pub use journal::TransactionJournal;
pub use rate_table::RateTable;
pub use service::LedgerService;
