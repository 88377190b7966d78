//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the Tessera vault:
//! - Identifiers (`ObjectId`, `EventId`, `ApprovalId`, `TicketId`)
//! - Time (`Timestamp`)
//! - Actors and roles (`Actor`, `Role`)
//! - Closed tags (`EventType`, `ToolMode`, `ApprovalStatus`, `ReviewDecision`)
//! - Structured rejection reasons (`Violation`, `Ceiling`)
//! - Error types (`TesseraError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they are used as ordered keys
//! - Parse from and render to a single canonical string form

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Content address of an object: lowercase hex SHA-256 of its bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Length of a hex-encoded SHA-256 digest.
    pub const HEX_LEN: usize = 64;

    /// Compute the content address of `bytes`.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Parse a hex id, rejecting anything that is not 64 lowercase hex digits.
    pub fn parse(s: &str) -> Result<Self, TesseraError> {
        let well_formed = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(TesseraError::Schema(format!("invalid object id '{}'", s)));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = TesseraError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Identifier of an audit event. Allocated from a vault-wide counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt-{}", self.0)
    }
}

/// Identifier of a tool approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub u64);

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "apr-{}", self.0)
    }
}

/// Identifier of an admission ticket (tool execution or model reservation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(pub u64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tkt-{}", self.0)
    }
}

// =============================================================================
// TIME
// =============================================================================

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Milliseconds in one second.
    pub const MILLIS_PER_SECOND: u64 = 1_000;

    /// Milliseconds in one UTC day.
    pub const MILLIS_PER_DAY: u64 = 86_400_000;

    /// Create a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Get the raw millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Shift forward by whole seconds, saturating at `u64::MAX`.
    #[must_use]
    pub const fn plus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs.saturating_mul(Self::MILLIS_PER_SECOND)))
    }

    /// Shift backward by whole seconds, saturating at zero.
    #[must_use]
    pub const fn minus_secs(self, secs: u64) -> Self {
        Self(self.0.saturating_sub(secs.saturating_mul(Self::MILLIS_PER_SECOND)))
    }

    /// Index of the UTC day containing this instant.
    #[must_use]
    pub const fn day(self) -> u64 {
        self.0 / Self::MILLIS_PER_DAY
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// =============================================================================
// ACTORS & ROLES
// =============================================================================

/// Who performed an action (user, agent, service account).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Actor(pub String);

impl Actor {
    /// Create a new actor from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the actor as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// An organization-defined role tag (e.g. `admin`, `security`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Role(pub String);

impl Role {
    /// Create a new role from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the role as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// CLOSED TAGS
// =============================================================================

/// Category of an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Request,
    Evidence,
    Tool,
    Model,
    Phi,
    Response,
    Error,
    Auth,
    Config,
    Policy,
}

impl EventType {
    /// Every event type, in declaration order.
    pub const ALL: [EventType; 10] = [
        EventType::Request,
        EventType::Evidence,
        EventType::Tool,
        EventType::Model,
        EventType::Phi,
        EventType::Response,
        EventType::Error,
        EventType::Auth,
        EventType::Config,
        EventType::Policy,
    ];

    /// The persisted tag for this event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::Request => "request",
            EventType::Evidence => "evidence",
            EventType::Tool => "tool",
            EventType::Model => "model",
            EventType::Phi => "phi",
            EventType::Response => "response",
            EventType::Error => "error",
            EventType::Auth => "auth",
            EventType::Config => "config",
            EventType::Policy => "policy",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TesseraError::Schema(format!("unknown event type '{}'", s)))
    }
}

/// Per-tool execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Execute immediately when constraints hold.
    Auto,
    /// Require a reviewer's sign-off before execution.
    Approve,
    /// Always reject.
    Deny,
}

impl ToolMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ToolMode::Auto => "auto",
            ToolMode::Approve => "approve",
            ToolMode::Deny => "deny",
        }
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lifecycle of a tool approval. `Approved` and `Denied` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = TesseraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "denied" => Ok(ApprovalStatus::Denied),
            other => Err(TesseraError::Schema(format!(
                "unknown approval status '{}'",
                other
            ))),
        }
    }
}

/// A reviewer's verdict on a pending approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Deny,
}

impl ReviewDecision {
    /// The terminal status this decision moves an approval into.
    #[must_use]
    pub const fn target_status(self) -> ApprovalStatus {
        match self {
            ReviewDecision::Approve => ApprovalStatus::Approved,
            ReviewDecision::Deny => ApprovalStatus::Denied,
        }
    }
}

// =============================================================================
// REJECTION REASONS
// =============================================================================

/// Why a tool request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    /// The organization has no policy for this tool.
    NoPolicy { tool: String },
    /// The tool's policy mode is `deny`.
    ToolDenied { tool: String },
    /// Canonical argument size is above `max_args_bytes`.
    ArgsTooLarge { limit: u64, actual: u64 },
    /// Requested timeout is above `max_timeout_secs`.
    TimeoutTooLong { limit: u64, requested: u64 },
    /// The request needs network access and the policy forbids it.
    NetworkNotAllowed { tool: String },
    /// The reviewer holds none of the policy's allowed roles.
    ReviewerNotAllowed { reviewer: String },
    /// The approval was already consumed by an execution.
    AlreadyExecuted { approval: ApprovalId },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::NoPolicy { tool } => write!(f, "no policy for tool '{}'", tool),
            Violation::ToolDenied { tool } => write!(f, "tool '{}' is denied by policy", tool),
            Violation::ArgsTooLarge { limit, actual } => {
                write!(f, "arguments are {} bytes, limit is {}", actual, limit)
            }
            Violation::TimeoutTooLong { limit, requested } => {
                write!(f, "timeout {}s exceeds limit {}s", requested, limit)
            }
            Violation::NetworkNotAllowed { tool } => {
                write!(f, "tool '{}' may not use the network", tool)
            }
            Violation::ReviewerNotAllowed { reviewer } => {
                write!(f, "reviewer '{}' holds no allowed role", reviewer)
            }
            Violation::AlreadyExecuted { approval } => {
                write!(f, "approval {} was already executed", approval)
            }
        }
    }
}

/// A model ceiling that refused admission, with the limit and the value
/// the request would have reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ceiling", rename_all = "snake_case")]
pub enum Ceiling {
    RequestsPerMinute { limit: u64, attempted: u64 },
    TokensPerMinute { limit: u64, attempted: u64 },
    CostPerRequest { limit: u64, attempted: u64 },
    DailyCost { limit: u64, attempted: u64 },
}

impl Ceiling {
    /// Short machine-readable name of the ceiling.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Ceiling::RequestsPerMinute { .. } => "max_rpm",
            Ceiling::TokensPerMinute { .. } => "max_tpm",
            Ceiling::CostPerRequest { .. } => "max_cost_per_request",
            Ceiling::DailyCost { .. } => "max_daily_cost",
        }
    }

    const fn values(&self) -> (u64, u64) {
        match *self {
            Ceiling::RequestsPerMinute { limit, attempted }
            | Ceiling::TokensPerMinute { limit, attempted }
            | Ceiling::CostPerRequest { limit, attempted }
            | Ceiling::DailyCost { limit, attempted } => (limit, attempted),
        }
    }
}

impl fmt::Display for Ceiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (limit, attempted) = self.values();
        write!(f, "{} would reach {} (limit {})", self.name(), attempted, limit)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Tessera vault.
///
/// - No silent failures
/// - Every rejection carries a structured reason
/// - The core never panics; all errors are recoverable
#[derive(Debug, Error)]
pub enum TesseraError {
    /// Malformed frame text (delimiters, escapes, truncated tokens).
    #[error("Parse error at offset {position}: {reason}")]
    Parse { position: usize, reason: String },

    /// Well-formed input that violates the record schema.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Stored bytes no longer hash to their id.
    #[error("Corruption detected: object {id} now hashes to {actual}")]
    Corruption { id: ObjectId, actual: String },

    /// The audit chain for an org does not recompute from genesis.
    #[error("Audit chain broken for org '{org_id}' at {event_id}")]
    ChainBroken { org_id: String, event_id: EventId },

    /// The requested item does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A tool request failed its policy.
    #[error("Policy violation: {0}")]
    PolicyViolation(Violation),

    /// A per-minute model ceiling would be exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(Ceiling),

    /// A model cost ceiling would be exceeded.
    #[error("Budget exceeded: {0}")]
    BudgetExceeded(Ceiling),

    /// The model triple is locked out after repeated failures.
    #[error("Cooldown active until {until}")]
    CooldownActive { until: Timestamp },

    /// An approval transition was attempted from the wrong state.
    #[error("Approval {id} is {status}")]
    ApprovalState { id: ApprovalId, status: ApprovalStatus },

    /// The underlying database failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A row could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A file outside the vault could not be read or written.
    #[error("IO error: {0}")]
    Io(String),
}

impl TesseraError {
    pub(crate) fn parse(position: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            position,
            reason: reason.into(),
        }
    }
}

impl From<redb::DatabaseError> for TesseraError {
    fn from(e: redb::DatabaseError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TransactionError> for TesseraError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::TableError> for TesseraError {
    fn from(e: redb::TableError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::StorageError> for TesseraError {
    fn from(e: redb::StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<redb::CommitError> for TesseraError {
    fn from(e: redb::CommitError) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<postcard::Error> for TesseraError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for TesseraError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
