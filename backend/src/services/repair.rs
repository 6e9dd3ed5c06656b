//! Repair-centre handoff and repair outcomes

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use shared::{
    engine, AccountKey, FaultRecord, LedgerError, ProposalDraft, RepairCompletion, RepairOutcome, RepairScope,
    RepairTransfer, ReturnRequest, Selection, Stamp, StockAccount, StockPayload, TransferKind, TransferProposal,
    Upstream,
};

use crate::error::AppResult;
use crate::services::fault::SelectionInput;
use crate::services::stock::PayloadInput;
use crate::services::store::LedgerTx;

#[derive(Debug, Deserialize, Validate)]
pub struct SendToRepairInput {
    pub repair_center_id: Uuid,
    #[serde(flatten)]
    #[validate]
    pub selection: SelectionInput,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReturnInput {
    pub to_location_id: Uuid,
    #[validate(length(min = 1, max = 1024))]
    pub document_ref: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteRepairInput {
    #[validate]
    pub repaired: Option<PayloadInput>,
    #[validate]
    pub irreparable: Option<PayloadInput>,
    pub cost: Option<Decimal>,
    /// Propose the repaired units back to an outlet in the same operation
    #[validate]
    pub return_to: Option<ReturnInput>,
    #[validate(length(max = 500))]
    pub remark: Option<String>,
}

impl CompleteRepairInput {
    fn outcome(&self) -> AppResult<RepairOutcome> {
        Ok(RepairOutcome {
            repaired: self.repaired.as_ref().map(PayloadInput::payload).transpose()?,
            irreparable: self.irreparable.as_ref().map(PayloadInput::payload).transpose()?,
            cost: self.cost,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RepairStep {
    pub moved: StockPayload,
    pub fault: FaultRecord,
    pub repair_transfer: RepairTransfer,
}

#[derive(Debug, Serialize)]
pub struct RepairCompleted {
    pub completion: RepairCompletion,
    pub fault: FaultRecord,
    pub repair_transfer: RepairTransfer,
    pub return_proposal: Option<TransferProposal>,
}

/// Records locked for a repair-stage operation
struct Locked {
    account: StockAccount,
    fault: FaultRecord,
    repair: RepairTransfer,
}

impl Locked {
    fn scope(&mut self) -> RepairScope<'_> {
        RepairScope {
            account: &mut self.account,
            fault: &mut self.fault,
            repair: &mut self.repair,
        }
    }
}

type StepFn = fn(&mut RepairScope<'_>, &Selection, &Stamp) -> shared::LedgerResult<StockPayload>;

/// Repair service for repair transfers
#[derive(Clone)]
pub struct RepairService {
    db: PgPool,
}

impl RepairService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn lock(tx: &mut LedgerTx, repair_id: Uuid) -> AppResult<Locked> {
        let fault_id = tx.repair_fault_id(repair_id).await?;
        let fault = tx.lock_fault(fault_id).await?;
        let repair = tx.lock_repair(repair_id).await?;
        let account = tx
            .lock_account(AccountKey::new(fault.location_id, fault.product_id))
            .await?;
        Ok(Locked { account, fault, repair })
    }

    async fn save(tx: &mut LedgerTx, locked: &mut Locked) -> AppResult<()> {
        tx.save_fault(&mut locked.fault).await?;
        tx.save_repair(&mut locked.repair).await?;
        tx.save_account(&mut locked.account).await
    }

    /// Hand damaged units of a fault record to a repair centre
    pub async fn send_to_repair(&self, user_id: Uuid, fault_id: Uuid, input: SendToRepairInput) -> AppResult<RepairStep> {
        let selection = input.selection.selection()?;
        let stamp = Stamp::new(user_id, input.selection.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let fault = tx.lock_fault(fault_id).await?;
        let account = tx
            .lock_account(AccountKey::new(fault.location_id, fault.product_id))
            .await?;
        let repair = RepairTransfer::open(&fault, input.repair_center_id, user_id, stamp.at);
        let mut locked = Locked { account, fault, repair };

        let moved = engine::send_to_repair(&mut locked.scope(), &selection, &stamp)?;
        Self::save(&mut tx, &mut locked).await?;
        tx.commit().await?;

        Ok(RepairStep {
            moved,
            fault: locked.fault,
            repair_transfer: locked.repair,
        })
    }

    pub async fn accept(&self, user_id: Uuid, repair_id: Uuid, input: SelectionInput) -> AppResult<RepairStep> {
        self.step(user_id, repair_id, input, engine::accept_repair_transfer).await
    }

    pub async fn reject(&self, user_id: Uuid, repair_id: Uuid, input: SelectionInput) -> AppResult<RepairStep> {
        self.step(user_id, repair_id, input, engine::reject_repair_transfer).await
    }

    /// Write off repaired units that will not be returned
    pub async fn scrap(&self, user_id: Uuid, repair_id: Uuid, input: SelectionInput) -> AppResult<RepairStep> {
        self.step(user_id, repair_id, input, engine::scrap_repaired).await
    }

    async fn step(&self, user_id: Uuid, repair_id: Uuid, input: SelectionInput, apply: StepFn) -> AppResult<RepairStep> {
        let selection = input.selection()?;
        let stamp = Stamp::new(user_id, input.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let mut locked = Self::lock(&mut tx, repair_id).await?;
        let moved = apply(&mut locked.scope(), &selection, &stamp)?;
        Self::save(&mut tx, &mut locked).await?;
        tx.commit().await?;

        Ok(RepairStep {
            moved,
            fault: locked.fault,
            repair_transfer: locked.repair,
        })
    }

    /// Record the repair result and optionally propose the repaired units
    /// back to an outlet
    pub async fn complete(&self, user_id: Uuid, repair_id: Uuid, input: CompleteRepairInput) -> AppResult<RepairCompleted> {
        let outcome = input.outcome()?;
        let return_to = input.return_to.map(|r| ReturnRequest {
            to_location_id: r.to_location_id,
            document_ref: r.document_ref,
        });
        let stamp = Stamp::new(user_id, input.remark);

        let mut tx = LedgerTx::begin(&self.db).await?;
        let fault_id = tx.repair_fault_id(repair_id).await?;
        let fault = tx.lock_fault(fault_id).await?;
        let repair = tx.lock_repair(repair_id).await?;
        let source_key = AccountKey::new(fault.location_id, fault.product_id);
        let (account, mut destination) = match &return_to {
            Some(request) => {
                let destination_key = AccountKey::new(request.to_location_id, fault.product_id);
                tx.lock_transfer_accounts(source_key, destination_key, stamp.at).await?
            }
            None => (tx.lock_account(source_key).await?, None),
        };
        let mut locked = Locked { account, fault, repair };

        let completion = engine::complete_repair(&mut locked.scope(), &outcome, &stamp)?;

        let return_proposal = match (&return_to, &completion.repaired) {
            (Some(request), Some(repaired)) => {
                let draft = ProposalDraft {
                    kind: TransferKind::RepairReturn,
                    product_id: source_key.product_id,
                    from_location_id: source_key.location_id,
                    to_location_id: request.to_location_id,
                    payload: repaired.clone(),
                    repair_transfer_id: Some(repair_id),
                    document_ref: request.document_ref.clone(),
                };
                let proposal = engine::propose_transfer(
                    &mut locked.account,
                    destination.as_mut(),
                    Some(Upstream {
                        fault: &mut locked.fault,
                        repair: &mut locked.repair,
                    }),
                    &draft,
                    &stamp,
                )?;
                Some(proposal)
            }
            (Some(_), None) => {
                return Err(LedgerError::Validation("A return needs repaired units".to_string()).into());
            }
            (None, _) => None,
        };

        Self::save(&mut tx, &mut locked).await?;
        if let Some(destination) = destination.as_mut() {
            tx.save_account(destination).await?;
        }
        if let Some(proposal) = &return_proposal {
            tx.insert_proposal(proposal).await?;
        }
        tx.commit().await?;

        Ok(RepairCompleted {
            completion,
            fault: locked.fault,
            repair_transfer: locked.repair,
            return_proposal,
        })
    }
}
