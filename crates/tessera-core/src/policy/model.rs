//! # Model Cost/Rate Policy Engine
//!
//! Gates model invocations per `(org_id, provider, model_name)`.
//!
//! ## Windows
//!
//! - Requests and tokens: sliding window of `RATE_WINDOW_SECS`
//! - Cost: the current UTC day (`Timestamp::day`)
//!
//! ## Reservations
//!
//! `admit` compares and reserves the estimate in one write transaction,
//! so concurrent callers never overshoot a ceiling. The reservation is
//! then resolved exactly once:
//!
//! | Call             | Requests | Tokens/cost     | Failures        |
//! |------------------|----------|-----------------|-----------------|
//! | `record_success` | kept     | actual usage    | reset           |
//! | `record_failure` | kept     | dropped         | +1, may cool    |
//! | `cancel`         | dropped  | dropped         | unchanged       |
//!
//! Costs are integer micro-units. Only refusals are audited at admission;
//! outcomes are audited when recorded; a cancel leaves no trace.

use super::validate_name;
use crate::ledger::{AuditEvent, Draft, append_in};
use crate::primitives::RATE_WINDOW_SECS;
use crate::storage::{MODEL_POLICIES, MODEL_USAGE, NEXT_TICKET_ID, Vault, next_id};
use crate::{Actor, Ceiling, EventType, TesseraError, TicketId, Timestamp};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// POLICY
// =============================================================================

/// Ceilings for one model of one provider in one org. `None` is unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPolicy {
    pub org_id: String,
    pub provider: String,
    pub model_name: String,
    #[serde(default)]
    pub max_rpm: Option<u64>,
    #[serde(default)]
    pub max_tpm: Option<u64>,
    /// Micro-units.
    #[serde(default)]
    pub max_cost_per_request: Option<u64>,
    /// Micro-units per UTC day.
    #[serde(default)]
    pub max_daily_cost: Option<u64>,
    /// Consecutive failures that start a cooldown.
    #[serde(default)]
    pub max_failures: Option<u32>,
    #[serde(default)]
    pub cooldown_seconds: u64,
}

impl ModelPolicy {
    /// A policy with no ceilings.
    #[must_use]
    pub fn new(
        org_id: impl Into<String>,
        provider: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            provider: provider.into(),
            model_name: model_name.into(),
            max_rpm: None,
            max_tpm: None,
            max_cost_per_request: None,
            max_daily_cost: None,
            max_failures: None,
            cooldown_seconds: 0,
        }
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.org_id, &self.provider, &self.model_name)
    }
}

// =============================================================================
// USAGE STATE
// =============================================================================

/// One admitted request inside the rate window.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    at: u64,
    tokens: u64,
    ticket: u64,
}

/// Estimated cost held by an unresolved ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Reservation {
    ticket: u64,
    day: u64,
    cost: u64,
}

/// Row layout of `MODEL_USAGE`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct UsageState {
    window: Vec<Sample>,
    day: u64,
    day_cost: u64,
    reservations: Vec<Reservation>,
    failures: u32,
    cooldown_until: Option<u64>,
}

impl UsageState {
    /// Drop samples older than the window, roll the cost day and expire
    /// reservations left over from earlier days.
    fn advance(&mut self, now: Timestamp) {
        let horizon = now.minus_secs(RATE_WINDOW_SECS).as_millis();
        self.window.retain(|s| s.at > horizon);
        if now.day() != self.day {
            self.day = now.day();
            self.day_cost = 0;
        }
        // Tickets never resolved before the day rolled are forgotten.
        let day = self.day;
        self.reservations.retain(|r| r.day >= day);
    }

    fn window_tokens(&self) -> u64 {
        self.window
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.tokens))
    }

    /// Remove the reservation for `ticket`, returning its cost to the day.
    fn release(&mut self, ticket: u64) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.ticket == ticket)?;
        let reservation = self.reservations.remove(pos);
        if reservation.day == self.day {
            self.day_cost = self.day_cost.saturating_sub(reservation.cost);
        }
        Some(reservation)
    }

    fn sample_mut(&mut self, ticket: u64) -> Option<&mut Sample> {
        self.window.iter_mut().find(|s| s.ticket == ticket)
    }

    fn is_idle(&self) -> bool {
        self.window.is_empty()
            && self.reservations.is_empty()
            && self.day_cost == 0
            && self.failures == 0
            && self.cooldown_until.is_none()
    }
}

/// Point-in-time view of a model's usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub requests_in_window: u64,
    pub tokens_in_window: u64,
    /// Micro-units spent or reserved today.
    pub cost_today: u64,
    pub pending: u64,
    pub failures: u32,
    pub cooldown_until: Option<Timestamp>,
}

// =============================================================================
// TICKETS
// =============================================================================

/// A reserved model call. Resolve it with `record_success`,
/// `record_failure` or `cancel`.
#[derive(Debug)]
#[must_use = "an unresolved ticket holds its reservation until the day rolls over"]
pub struct ModelTicket {
    id: TicketId,
    org_id: String,
    provider: String,
    model_name: String,
    actor: Actor,
    estimated_tokens: u64,
    estimated_cost: u64,
    admitted_at: Timestamp,
}

impl ModelTicket {
    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.estimated_tokens
    }

    pub fn estimated_cost(&self) -> u64 {
        self.estimated_cost
    }

    pub fn admitted_at(&self) -> Timestamp {
        self.admitted_at
    }

    fn key(&self) -> (&str, &str, &str) {
        (&self.org_id, &self.provider, &self.model_name)
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Model admission engine bound to a vault.
#[derive(Debug, Clone, Copy)]
pub struct ModelEngine<'v> {
    vault: &'v Vault,
}

impl<'v> ModelEngine<'v> {
    #[must_use]
    pub fn new(vault: &'v Vault) -> Self {
        Self { vault }
    }

    /// Create or replace a policy. Audited as a `config` event.
    pub fn set_policy(&self, policy: &ModelPolicy, actor: &Actor) -> Result<(), TesseraError> {
        validate_name("org_id", &policy.org_id)?;
        validate_name("provider", &policy.provider)?;
        validate_name("model_name", &policy.model_name)?;

        let bytes = postcard::to_allocvec(policy)?;
        let write_txn = self.vault.begin_write()?;
        write_txn
            .open_table(MODEL_POLICIES)?
            .insert(policy.key(), bytes.as_slice())?;
        append_in(
            &write_txn,
            self.vault.now(),
            Draft {
                org_id: &policy.org_id,
                event_type: EventType::Config,
                actor,
                payload: json!({ "action": "set_model_policy", "policy": policy }),
                run_id: None,
            },
        )?;
        write_txn.commit()?;

        tracing::info!(
            org = %policy.org_id,
            provider = %policy.provider,
            model = %policy.model_name,
            "model policy set"
        );
        Ok(())
    }

    /// The policy for a model, if any.
    pub fn policy(
        &self,
        org_id: &str,
        provider: &str,
        model_name: &str,
    ) -> Result<Option<ModelPolicy>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(MODEL_POLICIES)?;
        let raw = table
            .get((org_id, provider, model_name))?
            .map(|g| g.value().to_vec());
        raw.map(|b| postcard::from_bytes::<ModelPolicy>(&b).map_err(TesseraError::from))
            .transpose()
    }

    /// Remove a policy. Returns `false` if there was none.
    pub fn remove_policy(
        &self,
        org_id: &str,
        provider: &str,
        model_name: &str,
        actor: &Actor,
    ) -> Result<bool, TesseraError> {
        let write_txn = self.vault.begin_write()?;
        let removed = write_txn
            .open_table(MODEL_POLICIES)?
            .remove((org_id, provider, model_name))?
            .is_some();
        if removed {
            append_in(
                &write_txn,
                self.vault.now(),
                Draft {
                    org_id,
                    event_type: EventType::Config,
                    actor,
                    payload: json!({
                        "action": "remove_model_policy",
                        "provider": provider,
                        "model": model_name,
                    }),
                    run_id: None,
                },
            )?;
        }
        write_txn.commit()?;
        Ok(removed)
    }

    /// Every model policy of `org_id`, ordered by provider then model.
    pub fn policies(&self, org_id: &str) -> Result<Vec<ModelPolicy>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(MODEL_POLICIES)?;
        let mut out = Vec::new();
        for entry in table.range((org_id, "", "")..)? {
            let (key, value) = entry?;
            if key.value().0 != org_id {
                break;
            }
            out.push(postcard::from_bytes(value.value())?);
        }
        Ok(out)
    }

    /// Admit a model call and reserve its estimate.
    ///
    /// # Errors
    ///
    /// In order of precedence:
    /// - `CooldownActive` while the model is cooling down
    /// - `RateLimitExceeded` for `max_rpm`, then `max_tpm`
    /// - `BudgetExceeded` for `max_cost_per_request`, then `max_daily_cost`
    ///
    /// Each refusal is audited as a `model` event before it is returned.
    pub fn admit(
        &self,
        org_id: &str,
        provider: &str,
        model_name: &str,
        estimated_tokens: u64,
        estimated_cost: u64,
        actor: &Actor,
    ) -> Result<ModelTicket, TesseraError> {
        validate_name("org_id", org_id)?;
        let key = (org_id, provider, model_name);
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;

        let policy = read_policy(&write_txn, key)?;
        let mut state = read_usage(&write_txn, key)?;
        state.advance(now);

        if let Some(until) = state.cooldown_until {
            if now.as_millis() < until {
                let until = Timestamp::from_millis(until);
                let payload = json!({
                    "provider": provider,
                    "model": model_name,
                    "decision": "cooldown",
                    "cooldown_until": until.as_millis(),
                });
                append_in(&write_txn, now, draft(org_id, actor, payload))?;
                write_txn.commit()?;
                tracing::warn!(
                    org = org_id,
                    provider,
                    model = model_name,
                    %until,
                    "model in cooldown"
                );
                return Err(TesseraError::CooldownActive { until });
            }
            state.cooldown_until = None;
            state.failures = 0;
        }

        let verdict = policy
            .as_ref()
            .map_or(Ok(()), |p| check_ceilings(p, &state, estimated_tokens, estimated_cost));
        if let Err(ceiling) = verdict {
            let payload = json!({
                "provider": provider,
                "model": model_name,
                "decision": "rejected",
                "ceiling": ceiling,
                "estimated_tokens": estimated_tokens,
                "estimated_cost": estimated_cost,
            });
            append_in(&write_txn, now, draft(org_id, actor, payload))?;
            write_txn.commit()?;
            tracing::warn!(
                org = org_id,
                provider,
                model = model_name,
                %ceiling,
                "model call refused"
            );
            return Err(refusal(ceiling));
        }

        let ticket = next_id(&write_txn, NEXT_TICKET_ID)?;
        state.window.push(Sample {
            at: now.as_millis(),
            tokens: estimated_tokens,
            ticket,
        });
        state.reservations.push(Reservation {
            ticket,
            day: state.day,
            cost: estimated_cost,
        });
        state.day_cost = state.day_cost.saturating_add(estimated_cost);
        write_usage(&write_txn, key, &state)?;
        write_txn.commit()?;

        tracing::debug!(
            org = org_id,
            provider,
            model = model_name,
            ticket,
            "model call admitted"
        );
        Ok(ModelTicket {
            id: TicketId(ticket),
            org_id: org_id.to_string(),
            provider: provider.to_string(),
            model_name: model_name.to_string(),
            actor: actor.clone(),
            estimated_tokens,
            estimated_cost,
            admitted_at: now,
        })
    }

    /// Replace the reservation with actual usage and reset the failure count.
    pub fn record_success(
        &self,
        ticket: ModelTicket,
        tokens: u64,
        cost: u64,
    ) -> Result<AuditEvent, TesseraError> {
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;
        let mut state = read_usage(&write_txn, ticket.key())?;
        state.advance(now);
        resolve(&mut state, &ticket)?;

        if let Some(sample) = state.sample_mut(ticket.id.0) {
            sample.tokens = tokens;
        }
        state.day_cost = state.day_cost.saturating_add(cost);
        state.failures = 0;
        write_usage(&write_txn, ticket.key(), &state)?;

        let payload = json!({
            "provider": ticket.provider,
            "model": ticket.model_name,
            "decision": "succeeded",
            "ticket": ticket.id.0,
            "tokens": tokens,
            "cost": cost,
        });
        let event = append_in(&write_txn, now, draft(&ticket.org_id, &ticket.actor, payload))?;
        write_txn.commit()?;
        Ok(event)
    }

    /// Keep the request count, drop the reserved tokens and cost, and count
    /// a failure. Reaching `max_failures` starts a cooldown.
    pub fn record_failure(
        &self,
        ticket: ModelTicket,
        reason: &str,
    ) -> Result<AuditEvent, TesseraError> {
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;
        let policy = read_policy(&write_txn, ticket.key())?;
        let mut state = read_usage(&write_txn, ticket.key())?;
        state.advance(now);
        resolve(&mut state, &ticket)?;

        if let Some(sample) = state.sample_mut(ticket.id.0) {
            sample.tokens = 0;
        }
        state.failures = state.failures.saturating_add(1);

        let cooldown = policy.and_then(|p| {
            p.max_failures
                .filter(|max| state.failures >= *max)
                .map(|_| now.plus_secs(p.cooldown_seconds))
        });
        if let Some(until) = cooldown {
            state.cooldown_until = Some(until.as_millis());
            tracing::warn!(
                org = %ticket.org_id,
                provider = %ticket.provider,
                model = %ticket.model_name,
                failures = state.failures,
                %until,
                "model cooldown started"
            );
        }
        write_usage(&write_txn, ticket.key(), &state)?;

        let payload = json!({
            "provider": ticket.provider,
            "model": ticket.model_name,
            "decision": "failed",
            "ticket": ticket.id.0,
            "reason": reason,
            "failures": state.failures,
            "cooldown_until": cooldown.map(Timestamp::as_millis),
        });
        let event = append_in(&write_txn, now, draft(&ticket.org_id, &ticket.actor, payload))?;
        write_txn.commit()?;
        Ok(event)
    }

    /// Release a reservation that was never executed. Leaves no audit event
    /// and no counter change.
    pub fn cancel(&self, ticket: ModelTicket) -> Result<(), TesseraError> {
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;
        let mut state = read_usage(&write_txn, ticket.key())?;
        state.advance(now);
        resolve(&mut state, &ticket)?;
        state.window.retain(|s| s.ticket != ticket.id.0);

        if state.is_idle() {
            write_txn.open_table(MODEL_USAGE)?.remove(ticket.key())?;
        } else {
            write_usage(&write_txn, ticket.key(), &state)?;
        }
        write_txn.commit()?;
        tracing::debug!(ticket = %ticket.id, "model reservation cancelled");
        Ok(())
    }

    /// Current usage of a model as seen by `admit`.
    pub fn usage(
        &self,
        org_id: &str,
        provider: &str,
        model_name: &str,
    ) -> Result<UsageSnapshot, TesseraError> {
        let now = self.vault.now();
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(MODEL_USAGE)?;
        let raw = table
            .get((org_id, provider, model_name))?
            .map(|g| g.value().to_vec());
        let mut state = match raw {
            Some(bytes) => postcard::from_bytes::<UsageState>(&bytes)?,
            None => return Ok(UsageSnapshot::default()),
        };
        state.advance(now);

        let cooldown_until = state
            .cooldown_until
            .filter(|until| now.as_millis() < *until)
            .map(Timestamp::from_millis);
        Ok(UsageSnapshot {
            requests_in_window: state.window.len() as u64,
            tokens_in_window: state.window_tokens(),
            cost_today: state.day_cost,
            pending: state.reservations.len() as u64,
            // An expired cooldown resets the count on the next admit.
            failures: if state.cooldown_until.is_some() && cooldown_until.is_none() {
                0
            } else {
                state.failures
            },
            cooldown_until,
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

type ModelKey<'a> = (&'a str, &'a str, &'a str);

fn draft<'a>(org_id: &'a str, actor: &'a Actor, payload: Value) -> Draft<'a> {
    Draft {
        org_id,
        event_type: EventType::Model,
        actor,
        payload,
        run_id: None,
    }
}

/// The first ceiling the request would break, in precedence order.
fn check_ceilings(
    policy: &ModelPolicy,
    state: &UsageState,
    estimated_tokens: u64,
    estimated_cost: u64,
) -> Result<(), Ceiling> {
    if let Some(limit) = policy.max_rpm {
        let attempted = (state.window.len() as u64).saturating_add(1);
        if attempted > limit {
            return Err(Ceiling::RequestsPerMinute { limit, attempted });
        }
    }
    if let Some(limit) = policy.max_tpm {
        let attempted = state.window_tokens().saturating_add(estimated_tokens);
        if attempted > limit {
            return Err(Ceiling::TokensPerMinute { limit, attempted });
        }
    }
    if let Some(limit) = policy.max_cost_per_request {
        if estimated_cost > limit {
            return Err(Ceiling::CostPerRequest {
                limit,
                attempted: estimated_cost,
            });
        }
    }
    if let Some(limit) = policy.max_daily_cost {
        let attempted = state.day_cost.saturating_add(estimated_cost);
        if attempted > limit {
            return Err(Ceiling::DailyCost { limit, attempted });
        }
    }
    Ok(())
}

/// Per-minute ceilings are rate limits; cost ceilings are budgets.
fn refusal(ceiling: Ceiling) -> TesseraError {
    match ceiling {
        Ceiling::RequestsPerMinute { .. } | Ceiling::TokensPerMinute { .. } => {
            TesseraError::RateLimitExceeded(ceiling)
        }
        Ceiling::CostPerRequest { .. } | Ceiling::DailyCost { .. } => {
            TesseraError::BudgetExceeded(ceiling)
        }
    }
}

/// Drop `ticket`'s reservation, failing if it was already resolved.
fn resolve(state: &mut UsageState, ticket: &ModelTicket) -> Result<(), TesseraError> {
    state
        .release(ticket.id.0)
        .map(|_| ())
        .ok_or_else(|| TesseraError::NotFound(format!("reservation {}", ticket.id)))
}

fn read_policy(
    txn: &WriteTransaction,
    key: ModelKey<'_>,
) -> Result<Option<ModelPolicy>, TesseraError> {
    let table = txn.open_table(MODEL_POLICIES)?;
    let raw = table.get(key)?.map(|g| g.value().to_vec());
    raw.map(|b| postcard::from_bytes::<ModelPolicy>(&b).map_err(TesseraError::from))
        .transpose()
}

fn read_usage(txn: &WriteTransaction, key: ModelKey<'_>) -> Result<UsageState, TesseraError> {
    let table = txn.open_table(MODEL_USAGE)?;
    let raw = table.get(key)?.map(|g| g.value().to_vec());
    match raw {
        Some(bytes) => Ok(postcard::from_bytes(&bytes)?),
        None => Ok(UsageState::default()),
    }
}

fn write_usage(
    txn: &WriteTransaction,
    key: ModelKey<'_>,
    state: &UsageState,
) -> Result<(), TesseraError> {
    let bytes = postcard::to_allocvec(state)?;
    txn.open_table(MODEL_USAGE)?.insert(key, bytes.as_slice())?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    const ORG: &str = "org-1";
    const PROVIDER: &str = "acme";
    const MODEL: &str = "large-1";
    const START: Timestamp = Timestamp(1_700_000_000_000);

    fn caller() -> Actor {
        Actor::new("agent:alpha")
    }

    fn setup(policy: ModelPolicy) -> (Vault, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let vault = Vault::in_memory_with_clock(clock.clone()).expect("vault");
        vault
            .models()
            .set_policy(&policy, &Actor::new("admin"))
            .expect("policy");
        (vault, clock)
    }

    fn admit(vault: &Vault, tokens: u64, cost: u64) -> Result<ModelTicket, TesseraError> {
        vault
            .models()
            .admit(ORG, PROVIDER, MODEL, tokens, cost, &caller())
    }

    fn usage(vault: &Vault) -> UsageSnapshot {
        vault.models().usage(ORG, PROVIDER, MODEL).expect("usage")
    }

    #[test]
    fn missing_policy_admits_without_ceilings() {
        let vault = Vault::in_memory().expect("vault");
        for _ in 0..100 {
            let ticket = admit(&vault, 1_000_000, 1_000_000).expect("admit");
            vault.models().record_failure(ticket, "boom").expect("fail");
        }
        // No policy means no cooldown either.
        let _ticket = admit(&vault, 1, 1).expect("admit");
    }

    #[test]
    fn cooldown_after_max_failures() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_failures = Some(5);
        policy.cooldown_seconds = 300;
        let (vault, clock) = setup(policy);

        for _ in 0..5 {
            let ticket = admit(&vault, 10, 10).expect("admit");
            vault.models().record_failure(ticket, "upstream 500").expect("fail");
        }

        let until = START.plus_secs(300);
        match admit(&vault, 10, 10) {
            Err(TesseraError::CooldownActive { until: got }) => assert_eq!(got, until),
            other => panic!("expected CooldownActive, got {:?}", other),
        }
        assert_eq!(usage(&vault).cooldown_until, Some(until));

        clock.advance_secs(299);
        assert!(matches!(
            admit(&vault, 10, 10),
            Err(TesseraError::CooldownActive { .. })
        ));

        clock.advance_secs(1);
        let ticket = admit(&vault, 10, 10).expect("admit after cooldown");
        assert_eq!(usage(&vault).failures, 0);
        vault.models().record_success(ticket, 5, 5).expect("success");
        vault.ledger().verify_chain(ORG).expect("chain");
    }

    #[test]
    fn success_resets_failures() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_failures = Some(2);
        policy.cooldown_seconds = 60;
        let (vault, _clock) = setup(policy);

        let t = admit(&vault, 1, 1).expect("admit");
        vault.models().record_failure(t, "x").expect("fail");
        let t = admit(&vault, 1, 1).expect("admit");
        vault.models().record_success(t, 1, 1).expect("ok");
        let t = admit(&vault, 1, 1).expect("admit");
        vault.models().record_failure(t, "x").expect("fail");

        assert_eq!(usage(&vault).failures, 1);
        let _ticket = admit(&vault, 1, 1).expect("no cooldown yet");
    }

    #[test]
    fn requests_per_minute_slides() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_rpm = Some(2);
        let (vault, clock) = setup(policy);

        let a = admit(&vault, 1, 0).expect("first");
        clock.advance_secs(30);
        let b = admit(&vault, 1, 0).expect("second");
        match admit(&vault, 1, 0) {
            Err(TesseraError::RateLimitExceeded(Ceiling::RequestsPerMinute {
                limit: 2,
                attempted: 3,
            })) => {}
            other => panic!("expected rpm refusal, got {:?}", other),
        }

        // The first request leaves the window 60s after it was admitted.
        clock.advance_secs(31);
        let c = admit(&vault, 1, 0).expect("third after slide");
        for t in [a, b, c] {
            vault.models().record_success(t, 1, 0).expect("ok");
        }
    }

    #[test]
    fn tokens_per_minute_counts_reservations() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_tpm = Some(1_000);
        let (vault, _clock) = setup(policy);

        let big = admit(&vault, 800, 0).expect("admit");
        assert!(matches!(
            admit(&vault, 300, 0),
            Err(TesseraError::RateLimitExceeded(Ceiling::TokensPerMinute {
                attempted: 1_100,
                ..
            }))
        ));

        // Actual usage replaces the estimate.
        vault.models().record_success(big, 500, 0).expect("ok");
        assert_eq!(usage(&vault).tokens_in_window, 500);
        let _ticket = admit(&vault, 300, 0).expect("fits now");
    }

    #[test]
    fn cost_ceilings() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_cost_per_request = Some(700);
        policy.max_daily_cost = Some(1_000);
        let (vault, clock) = setup(policy);

        assert!(matches!(
            admit(&vault, 1, 701),
            Err(TesseraError::BudgetExceeded(Ceiling::CostPerRequest { .. }))
        ));

        let t = admit(&vault, 1, 600).expect("admit");
        match admit(&vault, 1, 600) {
            Err(TesseraError::BudgetExceeded(c)) => {
                assert_eq!(
                    c,
                    Ceiling::DailyCost {
                        limit: 1_000,
                        attempted: 1_200
                    }
                );
            }
            other => panic!("expected daily budget refusal, got {:?}", other),
        }
        vault.models().record_success(t, 1, 600).expect("ok");

        clock.set(Timestamp((START.day() + 1) * Timestamp::MILLIS_PER_DAY));
        assert_eq!(usage(&vault).cost_today, 0);
        let _ticket = admit(&vault, 1, 600).expect("new day");
    }

    #[test]
    fn failure_keeps_request_and_drops_cost() {
        let (vault, _clock) = setup(ModelPolicy::new(ORG, PROVIDER, MODEL));
        let t = admit(&vault, 400, 250).expect("admit");
        assert_eq!(usage(&vault).cost_today, 250);

        vault.models().record_failure(t, "timeout").expect("fail");
        let u = usage(&vault);
        assert_eq!(u.requests_in_window, 1);
        assert_eq!(u.tokens_in_window, 0);
        assert_eq!(u.cost_today, 0);
        assert_eq!(u.failures, 1);
        assert_eq!(u.pending, 0);
    }

    #[test]
    fn cancel_leaves_no_trace() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_rpm = Some(1);
        let (vault, _clock) = setup(policy);
        let events_before = vault.ledger().events(ORG).expect("events").len();

        let t = admit(&vault, 100, 100).expect("admit");
        assert_eq!(usage(&vault).pending, 1);
        vault.models().cancel(t).expect("cancel");

        assert_eq!(usage(&vault), UsageSnapshot::default());
        assert_eq!(vault.ledger().events(ORG).expect("events").len(), events_before);
        let _ticket = admit(&vault, 100, 100).expect("slot is free again");
    }

    #[test]
    fn refusals_are_audited_admissions_are_not() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_rpm = Some(1);
        let (vault, _clock) = setup(policy);

        let _held = admit(&vault, 1, 1).expect("admit");
        assert!(admit(&vault, 1, 1).is_err());

        let events = vault.ledger().events(ORG).expect("events");
        let types: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Config, EventType::Model]);
        assert_eq!(events[1].payload["ceiling"]["ceiling"], "requests_per_minute");
    }

    #[test]
    fn leaked_tickets_expire_with_the_day() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_daily_cost = Some(1_000);
        let (vault, clock) = setup(policy);

        drop(admit(&vault, 10, 400).expect("admit"));
        assert_eq!(usage(&vault).pending, 1);
        assert_eq!(usage(&vault).cost_today, 400);

        clock.set(Timestamp((START.day() + 1) * Timestamp::MILLIS_PER_DAY));
        let u = usage(&vault);
        assert_eq!(u.pending, 0);
        assert_eq!(u.cost_today, 0);

        // The rolled state is persisted by the next write.
        let t = admit(&vault, 10, 1_000).expect("full budget on the new day");
        assert_eq!(usage(&vault).pending, 1);
        vault.models().cancel(t).expect("cancel");
        assert_eq!(usage(&vault).pending, 0);
    }

    #[test]
    fn resolving_twice_is_not_found() {
        let vault = Vault::in_memory().expect("vault");
        let t = admit(&vault, 1, 1).expect("admit");
        let id = t.id();
        vault.models().record_success(t, 1, 1).expect("ok");

        // Forge a second ticket with the same id.
        let forged = ModelTicket {
            id,
            org_id: ORG.to_string(),
            provider: PROVIDER.to_string(),
            model_name: MODEL.to_string(),
            actor: caller(),
            estimated_tokens: 1,
            estimated_cost: 1,
            admitted_at: START,
        };
        assert!(matches!(
            vault.models().cancel(forged),
            Err(TesseraError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_admits_respect_rpm() {
        let mut policy = ModelPolicy::new(ORG, PROVIDER, MODEL);
        policy.max_rpm = Some(5);
        let (vault, _clock) = setup(policy);
        let vault = Arc::new(vault);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let vault = Arc::clone(&vault);
                    scope.spawn(move || admit(&vault, 1, 1).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| usize::from(h.join().expect("join")))
                .sum()
        });
        assert_eq!(admitted, 5);
        assert_eq!(usage(&vault).pending, 5);
    }

    #[test]
    fn policy_crud() {
        let (vault, _clock) = setup(ModelPolicy::new(ORG, PROVIDER, MODEL));
        let models = vault.models();
        models
            .set_policy(&ModelPolicy::new(ORG, "acme", "small-1"), &caller())
            .expect("set");
        let names: Vec<String> = models
            .policies(ORG)
            .expect("list")
            .into_iter()
            .map(|p| p.model_name)
            .collect();
        assert_eq!(names, vec!["large-1", "small-1"]);
        assert!(models
            .remove_policy(ORG, PROVIDER, MODEL, &caller())
            .expect("remove"));
        assert!(models.policy(ORG, PROVIDER, MODEL).expect("get").is_none());
    }
}
