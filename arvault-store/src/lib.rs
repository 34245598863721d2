//! Arvault Storage Layer
//!
//! Persistence for house accounts, exchange rates and the transaction journal.
//!
//! # Architecture
//!
//! - **Store / UnitOfWork traits**: the storage interface (ports)
//! - **In-memory store**: row-locked implementation for tests and development
//! - **PostgreSQL store**: production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use arvault_store::{MemoryStore, Store, UnitOfWork};
//! use arvault_domain::{Account, AccountId, Currency};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let mut uow = store.begin().await.unwrap();
//!     let account = Account::new(
//!         AccountId::new("house-usd").unwrap(),
//!         Currency::new("USD").unwrap(),
//!         Decimal::new(60000, 0),
//!     );
//!     uow.insert_account(&account).await.unwrap();
//!     uow.commit().await.unwrap();
//!
//!     let accounts = store.accounts().await.unwrap();
//!     println!("House accounts: {}", accounts.len());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::{MemoryStore, MemoryUnitOfWork, DEFAULT_LOCK_TIMEOUT};
#[cfg(feature = "postgres")]
pub use postgres::{PgStore, PgUnitOfWork};
pub use repository::{run_in_unit_of_work, Store, UnitOfWork, UnitOfWorkFuture};
