//! Shared domain engine for the Supply Ledger platform
//!
//! This crate holds the inventory lifecycle state model and the reconciliation
//! procedures that keep unit ledgers, stock accounts, fault/repair records and
//! transfer proposals consistent. It performs no I/O: the backend loads records
//! inside a database transaction, hands them to the functions in [`engine`], and
//! writes them back. [`engine::MemoryLedger`] applies the same functions to an
//! in-memory store and is used by tests and offline tooling.

pub mod engine;
pub mod error;
pub mod models;
pub mod quantity;
pub mod types;
pub mod validation;

pub use engine::*;
pub use error::*;
pub use models::*;
pub use quantity::*;
pub use types::*;
pub use validation::*;
