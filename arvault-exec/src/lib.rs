//! Arvault Execution Layer
//!
//! Moves funds between external client accounts and house accounts.
//!
//! # Architecture
//!
//! ```text
//! Exchange Engine → TransferPort → payment rail
//! ```
//!
//! # Components
//!
//! - **Ports**: `TransferPort`, the capability the engine is handed at construction
//! - **Stub**: `StubTransfer`, a scriptable implementation for tests and development
//!
//! # Example
//!
//! ```rust
//! use arvault_domain::{AccountId, Currency};
//! use arvault_exec::{StubTransfer, TransferLeg, TransferPort};
//! use rust_decimal::Decimal;
//!
//! #[tokio::main]
//! async fn main() {
//!     let rail = StubTransfer::new();
//!     let leg = TransferLeg::new(
//!         AccountId::new("client-ars").unwrap(),
//!         AccountId::new("house-ars").unwrap(),
//!         Decimal::new(1000, 0),
//!         Currency::new("ARS").unwrap(),
//!     );
//!
//!     let receipt = rail.attempt(&leg).await.unwrap();
//!     println!("Transfer reference: {}", receipt.reference);
//! }
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use ports::{TransferLeg, TransferPort, TransferReceipt};
pub use stub::{StubOutcome, StubTransfer, COMPLETED_LEG_HISTORY};
