//! Business logic services for the supply ledger server

pub mod fault;
pub mod repair;
pub mod reporting;
pub mod stock;
pub mod store;
pub mod transfer;

pub use fault::FaultService;
pub use repair::RepairService;
pub use reporting::ReportingService;
pub use stock::StockService;
pub use transfer::TransferService;
