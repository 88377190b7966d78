//! # tessera-core
//!
//! The tamper-evident record store behind Tessera - THE VAULT.
//!
//! This crate implements a canonical frame codec, an immutable
//! content-addressed object store, an append-only hash-chained audit
//! ledger, and the tool and model policy engines that gate what may be
//! written to it.
//!
//! ## Components (leaves first)
//!
//! - `codec`: frames, canonical forms, typed records
//! - `objects`: SHA-256 addressed blobs with tombstones
//! - `ledger`: per-org audit chains from `GENESIS_HASH`
//! - `policy::tool`: tool modes, constraints, reviewer approvals
//! - `policy::model`: rate, cost and failure-cooldown ceilings
//!
//! ## Architectural Constraints
//!
//! - One explicit `Vault` handle; no globals
//! - Every refusal is written to the ledger before it is returned
//! - Integer arithmetic only; costs are micro-units
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod clock;
pub mod codec;
pub mod ledger;
pub mod objects;
pub mod policy;
pub mod primitives;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Actor, ApprovalId, ApprovalStatus, Ceiling, EventId, EventType, ObjectId, ReviewDecision,
    Role, TesseraError, TicketId, Timestamp, ToolMode, Violation,
};

// =============================================================================
// RE-EXPORTS: Vault
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{
    CanonicalForm, FactRecord, Frame, FrameType, Record, SummaryRecord, Token, TrainPairRecord,
    canonical_json, canonicalize, decode, encode, export_record, import_frame,
};
pub use ledger::{AuditEvent, ChainHead, ChainReport, Ledger};
pub use objects::{ObjectMeta, ObjectRecord, ObjectStore};
pub use storage::{Vault, VaultStats};

// =============================================================================
// RE-EXPORTS: Policy Engines
// =============================================================================

pub use policy::{
    ModelEngine, ModelPolicy, ModelTicket, ToolAdmission, ToolApproval, ToolConstraints,
    ToolEngine, ToolExecution, ToolOutcome, ToolPolicy, ToolRequest, ToolTicket, UsageSnapshot,
};
