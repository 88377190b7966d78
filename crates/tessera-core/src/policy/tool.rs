//! # Tool Policy & Approval Engine
//!
//! Gates tool execution requests per `(org_id, tool_name)` policy.
//!
//! | Mode      | Admission                                                  |
//! |-----------|------------------------------------------------------------|
//! | `deny`    | refused, audited as `tool`; never creates an approval      |
//! | `auto`    | constraints checked; a ticket to execute on success        |
//! | `approve` | constraints checked, then a pending approval for review    |
//!
//! A request with no policy is refused like `deny`. Constraint failures
//! are audited as `policy` events. Every refusal is committed to the
//! ledger before the error is returned.
//!
//! Review is a compare-and-swap inside one write transaction: exactly one
//! reviewer moves a pending approval to a terminal status. An approved
//! request can be admitted for execution once.

use super::validate_name;
use crate::codec::canonical_json;
use crate::ledger::{AuditEvent, Draft, append_in};
use crate::storage::{NEXT_APPROVAL_ID, TOOL_APPROVALS, TOOL_POLICIES, Vault, next_id};
use crate::{
    Actor, ApprovalId, ApprovalStatus, EventType, ReviewDecision, Role, TesseraError, Timestamp,
    ToolMode, Violation,
};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// POLICY
// =============================================================================

/// Limits a request must satisfy before it may run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolConstraints {
    /// Upper bound on the canonical JSON size of the arguments.
    #[serde(default)]
    pub max_args_bytes: Option<u64>,
    /// Upper bound on the requested timeout.
    #[serde(default)]
    pub max_timeout_secs: Option<u64>,
    /// Whether requests that need the network may run.
    #[serde(default)]
    pub allow_network: bool,
}

impl ToolConstraints {
    /// Check a request's shape against these limits.
    pub fn check(
        &self,
        tool_name: &str,
        args: &Value,
        timeout_secs: Option<u64>,
        needs_network: bool,
    ) -> Result<(), Violation> {
        if let Some(limit) = self.max_args_bytes {
            let actual = canonical_json(args).as_bytes().len() as u64;
            if actual > limit {
                return Err(Violation::ArgsTooLarge { limit, actual });
            }
        }
        if let (Some(limit), Some(requested)) = (self.max_timeout_secs, timeout_secs) {
            if requested > limit {
                return Err(Violation::TimeoutTooLong { limit, requested });
            }
        }
        if needs_network && !self.allow_network {
            return Err(Violation::NetworkNotAllowed {
                tool: tool_name.to_string(),
            });
        }
        Ok(())
    }
}

/// How one org treats one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPolicy {
    pub org_id: String,
    pub tool_name: String,
    pub mode: ToolMode,
    #[serde(default)]
    pub constraints: ToolConstraints,
    /// Roles whose holders may review. Empty means any reviewer.
    #[serde(default)]
    pub allowed_roles: Vec<Role>,
}

impl ToolPolicy {
    /// A policy with no constraints and no role restriction.
    #[must_use]
    pub fn new(org_id: impl Into<String>, tool_name: impl Into<String>, mode: ToolMode) -> Self {
        Self {
            org_id: org_id.into(),
            tool_name: tool_name.into(),
            mode,
            constraints: ToolConstraints::default(),
            allowed_roles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: ToolConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = roles.into_iter().collect();
        self
    }

    /// Whether a reviewer holding `roles` may review under this policy.
    #[must_use]
    pub fn permits_reviewer(&self, roles: &[Role]) -> bool {
        self.allowed_roles.is_empty() || roles.iter().any(|r| self.allowed_roles.contains(r))
    }
}

// =============================================================================
// REQUESTS, APPROVALS, TICKETS
// =============================================================================

/// A request to run a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub org_id: String,
    pub tool_name: String,
    pub args: Value,
    pub requested_by: Actor,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub needs_network: bool,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl ToolRequest {
    #[must_use]
    pub fn new(
        org_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
        requested_by: Actor,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            tool_name: tool_name.into(),
            args,
            requested_by,
            timeout_secs: None,
            needs_network: false,
            run_id: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn with_network(mut self) -> Self {
        self.needs_network = true;
        self
    }

    #[must_use]
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// A request waiting for, or past, reviewer sign-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolApproval {
    pub id: ApprovalId,
    pub org_id: String,
    pub tool_name: String,
    pub tool_args: Value,
    pub timeout_secs: Option<u64>,
    pub needs_network: bool,
    pub run_id: Option<String>,
    pub requested_by: Actor,
    pub requested_at: Timestamp,
    pub status: ApprovalStatus,
    pub reviewed_by: Option<Actor>,
    pub reviewed_at: Option<Timestamp>,
    /// Set when the approved request is admitted for execution.
    pub executed_at: Option<Timestamp>,
}

/// Permission to run one tool call. Consumed by `record_outcome`.
#[derive(Debug)]
pub struct ToolTicket {
    org_id: String,
    tool_name: String,
    args: Value,
    requested_by: Actor,
    run_id: Option<String>,
    approval: Option<ApprovalId>,
    admitted_at: Timestamp,
}

impl ToolTicket {
    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn requested_by(&self) -> &Actor {
        &self.requested_by
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// The approval this ticket was issued from, for `approve`-mode tools.
    pub fn approval(&self) -> Option<ApprovalId> {
        self.approval
    }

    pub fn admitted_at(&self) -> Timestamp {
        self.admitted_at
    }
}

/// What happened when a ticket was executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolOutcome {
    Succeeded { result: Value },
    Failed { error: String },
    Cancelled { reason: String },
}

/// Result of `admit_tool`.
#[derive(Debug)]
pub enum ToolAdmission {
    /// Run now.
    Execute(ToolTicket),
    /// Wait for a reviewer.
    PendingApproval(ToolApproval),
}

/// Result of `execute_tool`.
#[derive(Debug)]
pub enum ToolExecution {
    /// The executor ran and its outcome was recorded.
    Completed {
        outcome: ToolOutcome,
        event: AuditEvent,
    },
    /// Nothing ran; the request awaits review.
    PendingApproval(ToolApproval),
}

// =============================================================================
// ENGINE
// =============================================================================

/// Tool policy and approval engine bound to a vault.
#[derive(Debug, Clone, Copy)]
pub struct ToolEngine<'v> {
    vault: &'v Vault,
}

impl<'v> ToolEngine<'v> {
    #[must_use]
    pub fn new(vault: &'v Vault) -> Self {
        Self { vault }
    }

    // -------------------------------------------------------------------------
    // Policy CRUD
    // -------------------------------------------------------------------------

    /// Create or replace a policy. The change is audited as a `config` event.
    pub fn set_policy(&self, policy: &ToolPolicy, actor: &Actor) -> Result<(), TesseraError> {
        validate_name("org_id", &policy.org_id)?;
        validate_name("tool_name", &policy.tool_name)?;

        let bytes = postcard::to_allocvec(policy)?;
        let write_txn = self.vault.begin_write()?;
        write_txn.open_table(TOOL_POLICIES)?.insert(
            (policy.org_id.as_str(), policy.tool_name.as_str()),
            bytes.as_slice(),
        )?;
        append_in(
            &write_txn,
            self.vault.now(),
            Draft {
                org_id: &policy.org_id,
                event_type: EventType::Config,
                actor,
                payload: json!({ "action": "set_tool_policy", "policy": policy }),
                run_id: None,
            },
        )?;
        write_txn.commit()?;

        tracing::info!(
            org = %policy.org_id,
            tool = %policy.tool_name,
            mode = %policy.mode,
            "tool policy set"
        );
        Ok(())
    }

    /// The policy for `(org_id, tool_name)`, if any.
    pub fn policy(
        &self,
        org_id: &str,
        tool_name: &str,
    ) -> Result<Option<ToolPolicy>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(TOOL_POLICIES)?;
        let raw = table
            .get((org_id, tool_name))?
            .map(|g| g.value().to_vec());
        raw.map(|b| postcard::from_bytes::<ToolPolicy>(&b).map_err(TesseraError::from))
            .transpose()
    }

    /// Remove a policy. Returns `false` if there was none.
    pub fn remove_policy(
        &self,
        org_id: &str,
        tool_name: &str,
        actor: &Actor,
    ) -> Result<bool, TesseraError> {
        let write_txn = self.vault.begin_write()?;
        let removed = write_txn
            .open_table(TOOL_POLICIES)?
            .remove((org_id, tool_name))?
            .is_some();
        if removed {
            append_in(
                &write_txn,
                self.vault.now(),
                Draft {
                    org_id,
                    event_type: EventType::Config,
                    actor,
                    payload: json!({ "action": "remove_tool_policy", "tool": tool_name }),
                    run_id: None,
                },
            )?;
        }
        write_txn.commit()?;
        Ok(removed)
    }

    /// Every tool policy of `org_id`, ordered by tool name.
    pub fn policies(&self, org_id: &str) -> Result<Vec<ToolPolicy>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(TOOL_POLICIES)?;
        let mut out = Vec::new();
        for entry in table.range((org_id, "")..)? {
            let (key, value) = entry?;
            if key.value().0 != org_id {
                break;
            }
            out.push(postcard::from_bytes(value.value())?);
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Admission
    // -------------------------------------------------------------------------

    /// Decide whether `request` may run.
    ///
    /// # Errors
    ///
    /// `PolicyViolation` with `NoPolicy`, `ToolDenied` or the failing
    /// constraint. The refusal is in the ledger when this returns.
    pub fn admit_tool(&self, request: &ToolRequest) -> Result<ToolAdmission, TesseraError> {
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;
        let audit = Audit::of_request(request);

        let policy = match read_policy(&write_txn, &request.org_id, &request.tool_name)? {
            Some(p) => p,
            None => {
                let violation = Violation::NoPolicy {
                    tool: request.tool_name.clone(),
                };
                return audit.refuse(write_txn, now, EventType::Tool, "denied", violation);
            }
        };

        let needs_review = match policy.mode {
            ToolMode::Deny => {
                let violation = Violation::ToolDenied {
                    tool: request.tool_name.clone(),
                };
                return audit.refuse(write_txn, now, EventType::Tool, "denied", violation);
            }
            ToolMode::Approve => true,
            ToolMode::Auto => false,
        };

        if let Err(violation) = policy.constraints.check(
            &request.tool_name,
            &request.args,
            request.timeout_secs,
            request.needs_network,
        ) {
            return audit.refuse(write_txn, now, EventType::Policy, "rejected", violation);
        }

        if !needs_review {
            // Nothing is written until the outcome is recorded.
            write_txn.abort()?;
            return Ok(ToolAdmission::Execute(ToolTicket {
                org_id: request.org_id.clone(),
                tool_name: request.tool_name.clone(),
                args: request.args.clone(),
                requested_by: request.requested_by.clone(),
                run_id: request.run_id.clone(),
                approval: None,
                admitted_at: now,
            }));
        }

        let approval = ToolApproval {
            id: ApprovalId(next_id(&write_txn, NEXT_APPROVAL_ID)?),
            org_id: request.org_id.clone(),
            tool_name: request.tool_name.clone(),
            tool_args: request.args.clone(),
            timeout_secs: request.timeout_secs,
            needs_network: request.needs_network,
            run_id: request.run_id.clone(),
            requested_by: request.requested_by.clone(),
            requested_at: now,
            status: ApprovalStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            executed_at: None,
        };
        write_approval(&write_txn, &approval)?;
        audit.record(
            &write_txn,
            now,
            EventType::Tool,
            json!({
                "tool": request.tool_name,
                "decision": "pending_approval",
                "approval": approval.id.0,
            }),
        )?;
        write_txn.commit()?;

        tracing::info!(
            org = %request.org_id,
            tool = %request.tool_name,
            approval = %approval.id,
            "tool request awaiting approval"
        );
        Ok(ToolAdmission::PendingApproval(approval))
    }

    /// Move a pending approval to approved or denied.
    ///
    /// # Errors
    ///
    /// - `ApprovalState` if the approval is no longer pending (audited)
    /// - `PolicyViolation(ReviewerNotAllowed)` if `roles` share nothing
    ///   with the policy's allowed roles (audited)
    /// - `PolicyViolation(NoPolicy)` if the tool's policy was removed
    pub fn review(
        &self,
        approval_id: ApprovalId,
        reviewer: &Actor,
        roles: &[Role],
        decision: ReviewDecision,
    ) -> Result<ToolApproval, TesseraError> {
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;
        let mut approval = read_approval(&write_txn, approval_id)?;

        let audit = Audit {
            org_id: approval.org_id.clone(),
            tool_name: approval.tool_name.clone(),
            actor: reviewer.clone(),
            run_id: approval.run_id.clone(),
        };

        if approval.status != ApprovalStatus::Pending {
            let error = TesseraError::ApprovalState {
                id: approval.id,
                status: approval.status,
            };
            return audit.refuse_state(
                write_txn,
                now,
                "review_rejected",
                approval.id,
                Some(approval.status),
                error,
            );
        }

        let policy = match read_policy(&write_txn, &approval.org_id, &approval.tool_name)? {
            Some(p) => p,
            None => {
                let violation = Violation::NoPolicy {
                    tool: approval.tool_name.clone(),
                };
                return audit.refuse(
                    write_txn,
                    now,
                    EventType::Policy,
                    "review_rejected",
                    violation,
                );
            }
        };

        if !policy.permits_reviewer(roles) {
            let violation = Violation::ReviewerNotAllowed {
                reviewer: reviewer.to_string(),
            };
            return audit.refuse(
                write_txn,
                now,
                EventType::Policy,
                "review_rejected",
                violation,
            );
        }

        approval.status = decision.target_status();
        approval.reviewed_by = Some(reviewer.clone());
        approval.reviewed_at = Some(now);
        write_approval(&write_txn, &approval)?;
        audit.record(
            &write_txn,
            now,
            EventType::Tool,
            json!({
                "tool": approval.tool_name,
                "decision": approval.status.as_str(),
                "approval": approval.id.0,
            }),
        )?;
        write_txn.commit()?;

        tracing::info!(
            approval = %approval.id,
            reviewer = %reviewer,
            status = %approval.status,
            "approval reviewed"
        );
        Ok(approval)
    }

    /// Turn an approved request into a ticket. Succeeds once per approval.
    ///
    /// The current policy's mode and constraints are checked again.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the approval does not exist in `org_id` (audited in
    ///   `org_id`)
    /// - `ApprovalState` unless the approval is `Approved` (audited)
    /// - `PolicyViolation` with `AlreadyExecuted`, or with whatever the
    ///   current policy now refuses (audited)
    pub fn admit_approved(
        &self,
        org_id: &str,
        approval_id: ApprovalId,
    ) -> Result<ToolTicket, TesseraError> {
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;
        let mut approval = read_approval(&write_txn, approval_id)?;

        if approval.org_id != org_id {
            // Audited in the caller's org; nothing of the other org leaks.
            let audit = Audit {
                org_id: org_id.to_string(),
                tool_name: String::new(),
                actor: approval.requested_by.clone(),
                run_id: None,
            };
            let error = TesseraError::NotFound(format!("approval {}", approval_id));
            return audit.refuse_state(write_txn, now, "rejected", approval_id, None, error);
        }

        let audit = Audit {
            org_id: approval.org_id.clone(),
            tool_name: approval.tool_name.clone(),
            actor: approval.requested_by.clone(),
            run_id: approval.run_id.clone(),
        };

        if approval.status != ApprovalStatus::Approved {
            let error = TesseraError::ApprovalState {
                id: approval.id,
                status: approval.status,
            };
            return audit.refuse_state(
                write_txn,
                now,
                "rejected",
                approval.id,
                Some(approval.status),
                error,
            );
        }

        if approval.executed_at.is_some() {
            let violation = Violation::AlreadyExecuted {
                approval: approval.id,
            };
            return audit.refuse(write_txn, now, EventType::Policy, "rejected", violation);
        }

        let recheck = match read_policy(&write_txn, &approval.org_id, &approval.tool_name)? {
            None => Err(Violation::NoPolicy {
                tool: approval.tool_name.clone(),
            }),
            Some(p) if p.mode == ToolMode::Deny => Err(Violation::ToolDenied {
                tool: approval.tool_name.clone(),
            }),
            Some(p) => p.constraints.check(
                &approval.tool_name,
                &approval.tool_args,
                approval.timeout_secs,
                approval.needs_network,
            ),
        };
        if let Err(violation) = recheck {
            return audit.refuse(write_txn, now, EventType::Policy, "rejected", violation);
        }

        approval.executed_at = Some(now);
        write_approval(&write_txn, &approval)?;
        write_txn.commit()?;

        Ok(ToolTicket {
            org_id: approval.org_id,
            tool_name: approval.tool_name,
            args: approval.tool_args,
            requested_by: approval.requested_by,
            run_id: approval.run_id,
            approval: Some(approval.id),
            admitted_at: now,
        })
    }

    /// Record what happened when `ticket` ran, as a `tool` event.
    pub fn record_outcome(
        &self,
        ticket: ToolTicket,
        outcome: &ToolOutcome,
    ) -> Result<AuditEvent, TesseraError> {
        let payload = json!({
            "tool": ticket.tool_name,
            "decision": "executed",
            "approval": ticket.approval.map(|a| a.0),
            "admitted_at": ticket.admitted_at.as_millis(),
            "result": outcome,
        });
        let event = self.vault.ledger().append(
            &ticket.org_id,
            EventType::Tool,
            &ticket.requested_by,
            payload,
            ticket.run_id.as_deref(),
        )?;
        tracing::debug!(tool = %ticket.tool_name, event = %event.id, "tool outcome recorded");
        Ok(event)
    }

    /// Admit `request`, run `executor` on the ticket and record the outcome.
    ///
    /// An executor error is recorded as `ToolOutcome::Failed` and returned
    /// inside `ToolExecution::Completed`.
    pub fn execute_tool<F>(
        &self,
        request: &ToolRequest,
        executor: F,
    ) -> Result<ToolExecution, TesseraError>
    where
        F: FnOnce(&ToolTicket) -> Result<Value, String>,
    {
        let ticket = match self.admit_tool(request)? {
            ToolAdmission::Execute(ticket) => ticket,
            ToolAdmission::PendingApproval(approval) => {
                return Ok(ToolExecution::PendingApproval(approval));
            }
        };
        let outcome = match executor(&ticket) {
            Ok(result) => ToolOutcome::Succeeded { result },
            Err(error) => ToolOutcome::Failed { error },
        };
        let event = self.record_outcome(ticket, &outcome)?;
        Ok(ToolExecution::Completed { outcome, event })
    }

    // -------------------------------------------------------------------------
    // Approval queries
    // -------------------------------------------------------------------------

    /// Look up one approval.
    pub fn approval(&self, id: ApprovalId) -> Result<ToolApproval, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(TOOL_APPROVALS)?;
        let raw = table
            .get(id.0)?
            .map(|g| g.value().to_vec())
            .ok_or_else(|| TesseraError::NotFound(format!("approval {}", id)))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Approvals of `org_id`, oldest first, optionally filtered by status.
    pub fn approvals(
        &self,
        org_id: &str,
        status: Option<ApprovalStatus>,
    ) -> Result<Vec<ToolApproval>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(TOOL_APPROVALS)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let approval: ToolApproval = serde_json::from_slice(value.value())?;
            if approval.org_id == org_id && status.is_none_or(|s| s == approval.status) {
                out.push(approval);
            }
        }
        Ok(out)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Who and what a decision is about, for the audit trail.
struct Audit {
    org_id: String,
    tool_name: String,
    actor: Actor,
    run_id: Option<String>,
}

impl Audit {
    fn of_request(request: &ToolRequest) -> Self {
        Self {
            org_id: request.org_id.clone(),
            tool_name: request.tool_name.clone(),
            actor: request.requested_by.clone(),
            run_id: request.run_id.clone(),
        }
    }

    fn record(
        &self,
        txn: &WriteTransaction,
        now: Timestamp,
        event_type: EventType,
        payload: Value,
    ) -> Result<AuditEvent, TesseraError> {
        append_in(
            txn,
            now,
            Draft {
                org_id: &self.org_id,
                event_type,
                actor: &self.actor,
                payload,
                run_id: self.run_id.as_deref(),
            },
        )
    }

    /// Audit a refusal, commit it, and return it as an error.
    fn refuse<T>(
        &self,
        txn: WriteTransaction,
        now: Timestamp,
        event_type: EventType,
        decision: &str,
        violation: Violation,
    ) -> Result<T, TesseraError> {
        self.record(
            &txn,
            now,
            event_type,
            json!({
                "tool": self.tool_name,
                "decision": decision,
                "violation": violation,
            }),
        )?;
        txn.commit()?;
        tracing::warn!(
            org = %self.org_id,
            tool = %self.tool_name,
            actor = %self.actor,
            %violation,
            "tool request refused"
        );
        Err(TesseraError::PolicyViolation(violation))
    }

    /// Audit an approval transition attempted from the wrong state, commit
    /// it, and return `error`.
    fn refuse_state<T>(
        &self,
        txn: WriteTransaction,
        now: Timestamp,
        decision: &str,
        approval: ApprovalId,
        status: Option<ApprovalStatus>,
        error: TesseraError,
    ) -> Result<T, TesseraError> {
        self.record(
            &txn,
            now,
            EventType::Policy,
            json!({
                "tool": self.tool_name,
                "decision": decision,
                "approval": approval.0,
                "status": status.map(ApprovalStatus::as_str),
            }),
        )?;
        txn.commit()?;
        tracing::warn!(
            org = %self.org_id,
            approval = %approval,
            actor = %self.actor,
            %error,
            "approval transition refused"
        );
        Err(error)
    }
}

fn read_policy(
    txn: &WriteTransaction,
    org_id: &str,
    tool_name: &str,
) -> Result<Option<ToolPolicy>, TesseraError> {
    let table = txn.open_table(TOOL_POLICIES)?;
    let raw = table
        .get((org_id, tool_name))?
        .map(|g| g.value().to_vec());
    raw.map(|b| postcard::from_bytes::<ToolPolicy>(&b).map_err(TesseraError::from))
        .transpose()
}

fn read_approval(txn: &WriteTransaction, id: ApprovalId) -> Result<ToolApproval, TesseraError> {
    let table = txn.open_table(TOOL_APPROVALS)?;
    let raw = table
        .get(id.0)?
        .map(|g| g.value().to_vec())
        .ok_or_else(|| TesseraError::NotFound(format!("approval {}", id)))?;
    Ok(serde_json::from_slice(&raw)?)
}

fn write_approval(txn: &WriteTransaction, approval: &ToolApproval) -> Result<(), TesseraError> {
    let row = serde_json::to_vec(approval)?;
    txn.open_table(TOOL_APPROVALS)?
        .insert(approval.id.0, row.as_slice())?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
