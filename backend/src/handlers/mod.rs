//! HTTP handlers

pub mod fault;
pub mod health;
pub mod repair;
pub mod reporting;
pub mod stock;
pub mod transfer;

pub use fault::*;
pub use health::*;
pub use repair::*;
pub use reporting::*;
pub use stock::*;
pub use transfer::*;
