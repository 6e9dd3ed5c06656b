//! Database models for the supply ledger server
//!
//! Re-exports the domain records from the shared crate and adds the row
//! types they are stored as.

pub mod rows;

pub use rows::*;
pub use shared::models::*;
