//! # Policy Engines
//!
//! Admission control in front of the vault. Both engines read their
//! policy, decide, and write the decision to the audit ledger inside the
//! same write transaction.
//!
//! - `tool`: per-tool modes, constraints and the reviewer approval flow
//! - `model`: per-model rate, cost and failure-cooldown ceilings

pub mod model;
pub mod tool;

pub use model::{ModelEngine, ModelPolicy, ModelTicket, UsageSnapshot};
pub use tool::{
    ToolAdmission, ToolApproval, ToolConstraints, ToolEngine, ToolExecution, ToolOutcome,
    ToolPolicy, ToolRequest, ToolTicket,
};

use crate::TesseraError;
use crate::primitives::MAX_NAME_LENGTH;

/// Reject empty or oversized identifiers used as policy keys.
pub(crate) fn validate_name(field: &str, value: &str) -> Result<(), TesseraError> {
    if value.is_empty() {
        return Err(TesseraError::Schema(format!("{} must not be empty", field)));
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(TesseraError::Schema(format!(
            "{} is {} bytes, maximum is {}",
            field,
            value.len(),
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}
