//! Batch resolution of transfer proposals
//!
//! Each item is resolved on its own; a failing item is reported in the
//! summary and the remaining items still run.

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::transfer::ResolveOutcome;
use crate::error::{LedgerError, LedgerResult};
use crate::types::{Decision, Selection};

/// One accept/reject instruction of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub proposal_id: Uuid,
    pub decision: Decision,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub serials: Option<Vec<String>>,
    #[serde(default)]
    pub reason: Option<String>,
    /// Expected receiving location; checked against the proposal
    #[serde(default)]
    pub destination_location_id: Option<Uuid>,
}

impl BatchItem {
    pub fn selection(&self) -> LedgerResult<Selection> {
        Selection::from_parts(self.quantity, self.serials.clone())
    }
}

/// A failed batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub index: usize,
    pub proposal_id: Uuid,
    pub code: String,
    pub message: String,
}

/// Partial-success summary of a batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub results: Vec<ResolveOutcome>,
    pub errors: Vec<BatchError>,
}

impl BatchSummary {
    /// Refuse batches above the configured size before anything runs
    pub fn check_size(len: usize, max_items: usize) -> LedgerResult<()> {
        if len == 0 {
            return Err(LedgerError::Validation("Batch is empty".to_string()));
        }
        if len > max_items {
            return Err(LedgerError::Validation(format!(
                "Batch of {} items exceeds the limit of {}",
                len, max_items
            )));
        }
        Ok(())
    }

    pub fn record(&mut self, index: usize, item: &BatchItem, result: LedgerResult<ResolveOutcome>) {
        match result {
            Ok(outcome) => self.results.push(outcome),
            Err(err) => {
                warn!(
                    index,
                    proposal_id = %item.proposal_id,
                    code = err.code(),
                    error = %err,
                    "Batch item failed"
                );
                self.errors.push(BatchError {
                    index,
                    proposal_id: item.proposal_id,
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordKind;
    use crate::models::ProposalStatus;

    #[test]
    fn test_record_keeps_both_sides() {
        let item = BatchItem {
            proposal_id: Uuid::new_v4(),
            decision: Decision::Accept,
            quantity: None,
            serials: None,
            reason: None,
            destination_location_id: None,
        };
        let mut summary = BatchSummary::default();
        summary.record(
            0,
            &item,
            Ok(ResolveOutcome {
                proposal_id: item.proposal_id,
                decision: Decision::Accept,
                quantity: 1,
                serials: vec![],
                status: ProposalStatus::Accepted,
                remaining: 0,
            }),
        );
        summary.record(1, &item, Err(LedgerError::not_found(RecordKind::Location, "x")));

        assert_eq!(summary.results.len(), 1);
        assert_eq!(summary.errors.len(), 1);
        assert_eq!(summary.errors[0].index, 1);
        assert_eq!(summary.errors[0].code, "RECORD_NOT_FOUND");
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_item_deserializes_with_defaults() {
        let json = serde_json::json!({
            "proposal_id": Uuid::nil(),
            "decision": "reject",
            "reason": "damaged in transit"
        });
        let item: BatchItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.decision, Decision::Reject);
        assert_eq!(item.selection().unwrap(), Selection::All);
    }

    #[test]
    fn test_size_limit() {
        assert!(BatchSummary::check_size(3, 10).is_ok());
        assert!(BatchSummary::check_size(0, 10).is_err());
        assert!(BatchSummary::check_size(11, 10).is_err());
    }
}
