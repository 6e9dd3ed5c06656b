//! Reconciliation engine
//!
//! Each function takes every record an operation touches and either
//! applies the whole change or returns an error with the records as they
//! were. Callers own the transaction boundary around loading and saving.

pub mod batch;
pub mod damage;
pub mod memory;
pub mod repair;
pub mod stock;
pub mod transfer;

pub use batch::{BatchError, BatchItem, BatchSummary};
pub use damage::{accept_pending_damage, reject_pending_damage};
pub use memory::{CompletedRepair, MemoryLedger, DEFAULT_MAX_BATCH_ITEMS};
pub use repair::{
    accept_repair_transfer, complete_repair, reject_repair_transfer, scrap_repaired, send_to_repair,
    RepairCompletion, RepairOutcome, RepairScope, ReturnRequest,
};
pub use stock::{consume, receive, report_damage, report_for_repair};
pub use transfer::{attach_document, propose_transfer, resolve_transfer, ProposalDraft, ResolveOutcome, Upstream};
