//! Error kinds raised by the lifecycle engine

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ProposalStatus, UnitStatus};

/// Kinds of record the engine looks up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Location,
    Product,
    StockAccount,
    Unit,
    FaultRecord,
    RepairTransfer,
    TransferProposal,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Location => write!(f, "Location"),
            RecordKind::Product => write!(f, "Product"),
            RecordKind::StockAccount => write!(f, "Stock account"),
            RecordKind::Unit => write!(f, "Unit"),
            RecordKind::FaultRecord => write!(f, "Fault record"),
            RecordKind::RepairTransfer => write!(f, "Repair transfer"),
            RecordKind::TransferProposal => write!(f, "Transfer proposal"),
        }
    }
}

/// Failure of a lifecycle operation.
///
/// Every variant aborts the operation it was raised from; no record touched
/// by that operation is modified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid transition for {unit}: {from} -> {to}")]
    InvalidTransition {
        unit: String,
        from: UnitStatus,
        to: UnitStatus,
    },

    #[error("Insufficient {bucket} quantity: {available} available, {requested} requested")]
    InsufficientAvailable {
        bucket: String,
        available: i64,
        requested: i64,
    },

    #[error("Requested {requested} exceeds the {pending} pending in {stage}")]
    ExceedsPending {
        stage: String,
        pending: i64,
        requested: i64,
    },

    #[error("Serial number {serial} is already live at location {location_id}")]
    DuplicateSerial { serial: String, location_id: Uuid },

    #[error("Transfer proposal {proposal_id} is already {status}")]
    ProposalNotPending {
        proposal_id: Uuid,
        status: ProposalStatus,
    },

    #[error("{kind} not found: {id}")]
    RecordNotFound { kind: RecordKind, id: String },

    #[error("Product {product_id} {}", tracking_label(.serialized))]
    TrackingMismatch { product_id: Uuid, serialized: bool },

    #[error("Transfer proposal {proposal_id} requires a document reference before acceptance")]
    MissingDocument { proposal_id: Uuid },

    #[error("Request {request_id} was already applied")]
    AlreadyApplied { request_id: Uuid },

    #[error("Fault record {id} is archived")]
    RecordArchived { id: Uuid },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl LedgerError {
    pub fn not_found(kind: RecordKind, id: impl ToString) -> Self {
        LedgerError::RecordNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Stable machine-readable reason code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidTransition { .. } => "INVALID_TRANSITION",
            LedgerError::InsufficientAvailable { .. } => "INSUFFICIENT_AVAILABLE",
            LedgerError::ExceedsPending { .. } => "EXCEEDS_PENDING",
            LedgerError::DuplicateSerial { .. } => "DUPLICATE_SERIAL",
            LedgerError::ProposalNotPending { .. } => "PROPOSAL_NOT_PENDING",
            LedgerError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            LedgerError::TrackingMismatch { .. } => "TRACKING_MISMATCH",
            LedgerError::MissingDocument { .. } => "MISSING_DOCUMENT",
            LedgerError::AlreadyApplied { .. } => "ALREADY_APPLIED",
            LedgerError::RecordArchived { .. } => "RECORD_ARCHIVED",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// True for the idempotency guards a retrying caller can treat as success
    pub fn is_replay(&self) -> bool {
        matches!(
            self,
            LedgerError::ProposalNotPending { .. } | LedgerError::AlreadyApplied { .. }
        )
    }
}

fn tracking_label(serialized: &bool) -> &'static str {
    if *serialized {
        "is tracked by serial number"
    } else {
        "is tracked by quantity only"
    }
}

/// Result type alias for engine operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let err = LedgerError::not_found(RecordKind::Location, "abc");
        assert_eq!(err.code(), "RECORD_NOT_FOUND");
        assert_eq!(err.to_string(), "Location not found: abc");

        let err = LedgerError::ProposalNotPending {
            proposal_id: Uuid::nil(),
            status: ProposalStatus::Accepted,
        };
        assert_eq!(err.code(), "PROPOSAL_NOT_PENDING");
        assert!(err.is_replay());
    }

    #[test]
    fn test_tracking_mismatch_message() {
        let err = LedgerError::TrackingMismatch {
            product_id: Uuid::nil(),
            serialized: true,
        };
        assert!(err.to_string().ends_with("is tracked by serial number"));
    }
}
