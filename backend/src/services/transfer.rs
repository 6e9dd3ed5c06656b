//! Transfer proposals between stock accounts
//!
//! Proposing reserves units on both sides; the destination then accepts or
//! rejects them, in whole or in part. Batches resolve each item in its own
//! transaction so one failing item never undoes the others.

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    engine, AccountKey, BatchError, BatchItem, BatchSummary, Decision, FaultRecord, LedgerError, ProposalDraft, RepairTransfer,
    ResolveOutcome, Stamp, TransferKind, TransferPolicy, TransferProposal, Upstream,
};

use crate::error::{AppError, AppResult};
use crate::services::fault::SelectionInput;
use crate::services::stock::PayloadInput;
use crate::services::store::LedgerTx;

#[derive(Debug, Deserialize, Validate)]
pub struct ProposeTransferInput {
    pub kind: TransferKind,
    pub product_id: Uuid,
    pub from_location_id: Uuid,
    pub to_location_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub items: PayloadInput,
    pub repair_transfer_id: Option<Uuid>,
    #[validate(length(min = 1, max = 1024))]
    pub document_ref: Option<String>,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveTransferInput {
    pub decision: Decision,
    #[serde(flatten)]
    #[validate]
    pub selection: SelectionInput,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AttachDocumentInput {
    #[validate(length(min = 1, max = 1024))]
    pub document_ref: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchInput {
    pub items: Vec<BatchItem>,
}

/// Transfer service for proposals and their resolution
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
    policy: TransferPolicy,
    max_batch_items: usize,
}

impl TransferService {
    pub fn new(db: PgPool, policy: TransferPolicy, max_batch_items: usize) -> Self {
        Self {
            db,
            policy,
            max_batch_items,
        }
    }

    /// Fault record and repair transfer a repaired-origin transfer draws from
    async fn lock_upstream(tx: &mut LedgerTx, repair_id: Option<Uuid>) -> AppResult<Option<(FaultRecord, RepairTransfer)>> {
        match repair_id {
            Some(id) => {
                let fault_id = tx.repair_fault_id(id).await?;
                let fault = tx.lock_fault(fault_id).await?;
                let repair = tx.lock_repair(id).await?;
                Ok(Some((fault, repair)))
            }
            None => Ok(None),
        }
    }

    async fn save_upstream(tx: &mut LedgerTx, upstream: &mut Option<(FaultRecord, RepairTransfer)>) -> AppResult<()> {
        if let Some((fault, repair)) = upstream {
            tx.save_fault(fault).await?;
            tx.save_repair(repair).await?;
        }
        Ok(())
    }

    pub async fn propose(&self, user_id: Uuid, input: ProposeTransferInput) -> AppResult<TransferProposal> {
        let draft = ProposalDraft {
            kind: input.kind,
            product_id: input.product_id,
            from_location_id: input.from_location_id,
            to_location_id: input.to_location_id,
            payload: input.items.payload()?,
            repair_transfer_id: input.repair_transfer_id,
            document_ref: input.document_ref,
        };
        let stamp = Stamp::new(user_id, input.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut upstream = Self::lock_upstream(&mut tx, draft.repair_transfer_id).await?;
        let (mut source, mut destination) = tx
            .lock_transfer_accounts(
                AccountKey::new(draft.from_location_id, draft.product_id),
                AccountKey::new(draft.to_location_id, draft.product_id),
                stamp.at,
            )
            .await?;

        let proposal = engine::propose_transfer(
            &mut source,
            destination.as_mut(),
            upstream.as_mut().map(|(fault, repair)| Upstream { fault, repair }),
            &draft,
            &stamp,
        )?;

        Self::save_upstream(&mut tx, &mut upstream).await?;
        tx.save_account(&mut source).await?;
        if let Some(destination) = destination.as_mut() {
            tx.save_account(destination).await?;
        }
        tx.insert_proposal(&proposal).await?;
        tx.commit().await?;

        Ok(proposal)
    }

    pub async fn resolve(&self, user_id: Uuid, proposal_id: Uuid, input: ResolveTransferInput) -> AppResult<ResolveOutcome> {
        let selection = input.selection.selection()?;
        let stamp = Stamp::new(user_id, input.selection.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut proposal = tx.lock_proposal(proposal_id).await?;
        proposal.ensure_pending()?;
        let mut upstream = Self::lock_upstream(&mut tx, proposal.repair_transfer_id).await?;
        let (mut source, mut destination) = tx
            .lock_transfer_accounts(
                AccountKey::new(proposal.from_location_id, proposal.product_id),
                AccountKey::new(proposal.to_location_id, proposal.product_id),
                stamp.at,
            )
            .await?;

        if input.decision == Decision::Accept {
            let picked = proposal.select(&selection)?;
            let mut holders = vec![source.id];
            holders.extend(destination.as_ref().map(|account| account.id));
            tx.ensure_serials_free(proposal.product_id, picked.serials(), &holders)
                .await?;
        }

        let outcome = engine::resolve_transfer(
            &mut proposal,
            &mut source,
            destination.as_mut(),
            upstream.as_mut().map(|(fault, repair)| Upstream { fault, repair }),
            input.decision,
            &selection,
            input.reason.as_deref(),
            &self.policy,
            &stamp,
        )?;

        tx.update_proposal(&proposal).await?;
        Self::save_upstream(&mut tx, &mut upstream).await?;
        tx.save_account(&mut source).await?;
        if let Some(destination) = destination.as_mut() {
            tx.save_account(destination).await?;
        }
        tx.commit().await?;

        Ok(outcome)
    }

    pub async fn attach_document(&self, user_id: Uuid, proposal_id: Uuid, input: AttachDocumentInput) -> AppResult<TransferProposal> {
        let stamp = Stamp::new(user_id, None);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut proposal = tx.lock_proposal(proposal_id).await?;
        engine::attach_document(&mut proposal, &input.document_ref, &stamp)?;
        tx.update_proposal(&proposal).await?;
        tx.commit().await?;

        Ok(proposal)
    }

    /// Resolve every item independently and report successes and failures
    pub async fn resolve_batch(&self, user_id: Uuid, input: BatchInput) -> AppResult<BatchSummary> {
        BatchSummary::check_size(input.items.len(), self.max_batch_items)?;

        let mut summary = BatchSummary::default();
        for (index, item) in input.items.iter().enumerate() {
            match self.resolve_item(user_id, item).await {
                Ok(outcome) => summary.record(index, item, Ok(outcome)),
                Err(AppError::Ledger(err)) => summary.record(index, item, Err(err)),
                Err(err) => {
                    tracing::warn!(index, proposal_id = %item.proposal_id, error = %err, "Batch item failed");
                    summary.errors.push(BatchError {
                        index,
                        proposal_id: item.proposal_id,
                        code: err.code(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if summary.is_clean() {
            tracing::info!(succeeded = summary.results.len(), "Transfer batch resolved");
        } else {
            tracing::warn!(
                succeeded = summary.results.len(),
                failed = summary.errors.len(),
                "Transfer batch resolved with failures"
            );
        }
        Ok(summary)
    }

    async fn resolve_item(&self, user_id: Uuid, item: &BatchItem) -> AppResult<ResolveOutcome> {
        if let Some(location_id) = item.destination_location_id {
            let mut tx = LedgerTx::begin(&self.db).await?;
            tx.location(location_id).await?;
            let proposal = tx.lock_proposal(item.proposal_id).await?;
            if proposal.to_location_id != location_id {
                return Err(LedgerError::Validation(format!(
                    "Transfer proposal {} is not addressed to location {}",
                    item.proposal_id, location_id
                ))
                .into());
            }
        }

        let input = ResolveTransferInput {
            decision: item.decision,
            selection: SelectionInput {
                quantity: item.quantity,
                serials: item.serials.clone(),
                remark: None,
            },
            reason: item.reason.clone(),
        };
        input.validate()?;
        self.resolve(user_id, item.proposal_id, input).await
    }

    pub async fn pending_for_location(&self, location_id: Uuid) -> AppResult<Vec<TransferProposal>> {
        let mut tx = LedgerTx::begin(&self.db).await?;
        tx.location(location_id).await?;
        tx.pending_proposals(location_id).await
    }
}
