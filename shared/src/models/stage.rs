//! Per-stage quantity book shared by fault records and repair transfers

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::UnitStatus;
use crate::error::{LedgerError, LedgerResult, RecordKind};
use crate::quantity::{clamp_counter, QuantityAnomaly};
use crate::types::{Selection, StockPayload};

/// Quantities held per lifecycle stage, with the stage of every serial
/// when the record tracks serial numbers.
///
/// For serialized records `counts[stage]` always equals the number of
/// serials mapped to `stage`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageBook {
    pub counts: BTreeMap<UnitStatus, i64>,
    pub serials: BTreeMap<String, UnitStatus>,
}

impl StageBook {
    pub fn count(&self, stage: UnitStatus) -> i64 {
        self.counts.get(&stage).copied().unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0 && self.serials.is_empty()
    }

    pub fn stage_of(&self, serial: &str) -> Option<UnitStatus> {
        self.serials.get(serial).copied()
    }

    pub fn serials_in(&self, stage: UnitStatus) -> Vec<String> {
        self.serials
            .iter()
            .filter(|(_, s)| **s == stage)
            .map(|(serial, _)| serial.clone())
            .collect()
    }

    /// Put new units into `stage`
    pub fn add(&mut self, stage: UnitStatus, payload: &StockPayload) -> LedgerResult<()> {
        for serial in payload.serials() {
            if let Some(existing) = self.serials.get(serial) {
                return Err(LedgerError::Validation(format!(
                    "Serial number {} is already on this record ({})",
                    serial, existing
                )));
            }
        }
        for serial in payload.serials() {
            self.serials.insert(serial.clone(), stage);
        }
        *self.counts.entry(stage).or_insert(0) += payload.count();
        Ok(())
    }

    /// Resolve a selection against the units currently in `stage`.
    ///
    /// `target` is only used to describe a serial found in the wrong stage.
    pub fn select(
        &self,
        stage: UnitStatus,
        selection: &Selection,
        serialized: bool,
        target: UnitStatus,
    ) -> LedgerResult<StockPayload> {
        let pending = self.count(stage);
        match selection {
            Selection::All => {
                if pending == 0 {
                    return Err(LedgerError::Validation(format!(
                        "Nothing is in {} on this record",
                        stage
                    )));
                }
                if serialized {
                    Ok(StockPayload::Serials(self.serials_in(stage)))
                } else {
                    Ok(StockPayload::Quantity(pending))
                }
            }
            Selection::Quantity(quantity) => {
                if serialized {
                    return Err(LedgerError::Validation(
                        "Serialized records are selected by serial number".to_string(),
                    ));
                }
                if *quantity <= 0 {
                    return Err(LedgerError::Validation(
                        "Quantity must be positive".to_string(),
                    ));
                }
                if *quantity > pending {
                    return Err(LedgerError::ExceedsPending {
                        stage: stage.as_str().to_string(),
                        pending,
                        requested: *quantity,
                    });
                }
                Ok(StockPayload::Quantity(*quantity))
            }
            Selection::Serials(serials) => {
                if !serialized {
                    return Err(LedgerError::Validation(
                        "Bulk records are selected by quantity".to_string(),
                    ));
                }
                if serials.len() as i64 > pending {
                    return Err(LedgerError::ExceedsPending {
                        stage: stage.as_str().to_string(),
                        pending,
                        requested: serials.len() as i64,
                    });
                }
                let mut seen = std::collections::BTreeSet::new();
                for serial in serials {
                    if !seen.insert(serial.as_str()) {
                        return Err(LedgerError::Validation(format!(
                            "Serial number {} is listed twice",
                            serial
                        )));
                    }
                    match self.stage_of(serial) {
                        None => return Err(LedgerError::not_found(RecordKind::Unit, serial)),
                        Some(found) if found != stage => {
                            return Err(LedgerError::InvalidTransition {
                                unit: serial.clone(),
                                from: found,
                                to: target,
                            })
                        }
                        Some(_) => {}
                    }
                }
                Ok(StockPayload::Serials(serials.clone()))
            }
        }
    }

    /// Move units from one stage to another
    pub fn shift(&mut self, from: UnitStatus, to: UnitStatus, payload: &StockPayload) -> LedgerResult<()> {
        self.remove(from, payload)?;
        for serial in payload.serials() {
            self.serials.insert(serial.clone(), to);
        }
        *self.counts.entry(to).or_insert(0) += payload.count();
        Ok(())
    }

    /// Drop units from `stage` entirely
    pub fn remove(&mut self, stage: UnitStatus, payload: &StockPayload) -> LedgerResult<()> {
        let held = self.count(stage);
        if payload.count() > held {
            return Err(LedgerError::ExceedsPending {
                stage: stage.as_str().to_string(),
                pending: held,
                requested: payload.count(),
            });
        }
        for serial in payload.serials() {
            match self.serials.get(serial) {
                Some(found) if *found == stage => {
                    self.serials.remove(serial);
                }
                Some(found) => {
                    return Err(LedgerError::InvalidTransition {
                        unit: serial.clone(),
                        from: *found,
                        to: stage,
                    })
                }
                None => return Err(LedgerError::not_found(RecordKind::Unit, serial)),
            }
        }
        self.counts.insert(stage, held - payload.count());
        self.counts.retain(|_, count| *count != 0);
        Ok(())
    }

    /// Clamp negative stage counts, reporting each one
    pub fn clamp(
        &mut self,
        record_id: uuid::Uuid,
        anomalies: &mut Vec<QuantityAnomaly>,
    ) {
        for (stage, count) in self.counts.iter_mut() {
            clamp_counter(record_id, stage.as_str(), count, anomalies);
        }
    }
}
