//! Input validation for ledger operations
//!
//! Checks here are shape checks on caller input. State checks (does the
//! serial belong to the account, is enough stock available) live in the
//! engine.

use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};
use crate::types::StockPayload;

/// Longest accepted serial number
pub const MAX_SERIAL_LEN: usize = 64;

/// Longest accepted remark or rejection reason
pub const MAX_REMARK_LEN: usize = 500;

/// Longest accepted document reference (path or URL)
pub const MAX_DOCUMENT_REF_LEN: usize = 1024;

// ============================================================================
// Unit Identity Validations
// ============================================================================

/// Validate serial number format (printable ASCII, no whitespace)
pub fn validate_serial_number(serial: &str) -> Result<(), &'static str> {
    if serial.is_empty() {
        return Err("Serial number must not be empty");
    }
    if serial.len() > MAX_SERIAL_LEN {
        return Err("Serial number must be at most 64 characters");
    }
    if !serial.chars().all(|c| c.is_ascii_graphic()) {
        return Err("Serial number must be printable ASCII without spaces");
    }
    Ok(())
}

/// Validate a list of serial numbers: non-empty, well-formed, no repeats
pub fn validate_serial_list(serials: &[String]) -> Result<(), &'static str> {
    if serials.is_empty() {
        return Err("At least one serial number is required");
    }
    let mut seen = std::collections::HashSet::with_capacity(serials.len());
    for serial in serials {
        validate_serial_number(serial)?;
        if !seen.insert(serial.as_str()) {
            return Err("Serial numbers must be unique within a request");
        }
    }
    Ok(())
}

/// Validate a movement payload before it reaches the engine
pub fn validate_payload(payload: &StockPayload) -> LedgerResult<()> {
    match payload {
        StockPayload::Quantity(quantity) if *quantity <= 0 => {
            Err(LedgerError::Validation("Quantity must be positive".to_string()))
        }
        StockPayload::Quantity(_) => Ok(()),
        StockPayload::Serials(serials) => {
            validate_serial_list(serials).map_err(|e| LedgerError::Validation(e.to_string()))
        }
    }
}

// ============================================================================
// Free Text and References
// ============================================================================

/// Validate remark length
pub fn validate_remark(remark: &str) -> Result<(), &'static str> {
    if remark.chars().count() > MAX_REMARK_LEN {
        return Err("Remark must be at most 500 characters");
    }
    Ok(())
}

/// Validate a challan/document reference. Only presence and length are
/// checked; the file itself is handled elsewhere.
pub fn validate_document_ref(reference: &str) -> Result<(), &'static str> {
    if reference.trim().is_empty() {
        return Err("Document reference must not be empty");
    }
    if reference.len() > MAX_DOCUMENT_REF_LEN {
        return Err("Document reference must be at most 1024 characters");
    }
    Ok(())
}

/// Validate repair cost (non-negative)
pub fn validate_repair_cost(cost: Decimal) -> Result<(), &'static str> {
    if cost < Decimal::ZERO {
        return Err("Repair cost cannot be negative");
    }
    Ok(())
}

/// Map a shape check into a ledger error
pub fn check(result: Result<(), &'static str>) -> LedgerResult<()> {
    result.map_err(|e| LedgerError::Validation(e.to_string()))
}
