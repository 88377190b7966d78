//! # Audit Ledger
//!
//! Append-only, per-org hash chain of audit events.
//!
//! ```text
//! event_hash = hex(SHA-256(canonical_body || prev_hash))
//! ```
//!
//! The first event of every org links to `GENESIS_HASH`. The canonical
//! body covers every field except the two hashes, with the payload in
//! canonical JSON, so reordering payload keys never changes a hash.
//!
//! Appends are serialized by redb's single writer: the head read, the
//! event write and the head move share one `WriteTransaction`. Policy
//! engines use `append_in` to audit inside their own transaction.

use crate::codec::canonical_json;
use crate::primitives::GENESIS_HASH;
use crate::storage::{
    AUDIT_BY_HASH, AUDIT_BY_ID, AUDIT_EVENTS, AUDIT_HEADS, NEXT_EVENT_ID, Vault, next_id,
};
use crate::{Actor, EventId, EventType, TesseraError, Timestamp};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

// =============================================================================
// TYPES
// =============================================================================

/// One immutable entry of an org's audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: EventId,
    pub org_id: String,
    /// Position in the org's chain, starting at 0.
    pub seq: u64,
    pub event_type: EventType,
    pub timestamp: Timestamp,
    pub run_id: Option<String>,
    pub actor: Actor,
    pub payload: Value,
    pub prev_hash: String,
    pub event_hash: String,
}

impl AuditEvent {
    /// Canonical text of everything the hash commits to, except `prev_hash`.
    #[must_use]
    pub fn canonical_body(&self) -> String {
        let body = json!({
            "actor": self.actor.as_str(),
            "event_type": self.event_type.as_str(),
            "id": self.id.0,
            "org_id": self.org_id,
            "payload": self.payload,
            "run_id": self.run_id,
            "seq": self.seq,
            "timestamp": self.timestamp.as_millis(),
        });
        canonical_json(&body).into_string()
    }

    /// Recompute the hash this event should carry given `prev_hash`.
    #[must_use]
    pub fn compute_hash(&self, prev_hash: &str) -> String {
        chain_hash(self.canonical_body().as_bytes(), prev_hash)
    }
}

/// The latest event of an org's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub seq: u64,
    pub event_id: EventId,
    pub event_hash: String,
}

/// Result of a successful `verify_chain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub org_id: String,
    /// Number of events checked.
    pub events: u64,
    /// Hash of the last event, or `GENESIS_HASH` for an empty chain.
    pub head: String,
}

/// Where an event id lives in `AUDIT_EVENTS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventLocator {
    org_id: String,
    seq: u64,
}

/// An event before it is linked into the chain.
#[derive(Debug, Clone)]
pub(crate) struct Draft<'a> {
    pub org_id: &'a str,
    pub event_type: EventType,
    pub actor: &'a Actor,
    pub payload: Value,
    pub run_id: Option<&'a str>,
}

fn chain_hash(body: &[u8], prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// LEDGER
// =============================================================================

/// Audit ledger bound to a vault.
#[derive(Debug, Clone, Copy)]
pub struct Ledger<'v> {
    vault: &'v Vault,
}

impl<'v> Ledger<'v> {
    #[must_use]
    pub fn new(vault: &'v Vault) -> Self {
        Self { vault }
    }

    /// Append an event to `org_id`'s chain and return it with its hashes.
    ///
    /// # Errors
    ///
    /// `TesseraError::Schema` if `org_id` is empty; storage errors otherwise.
    pub fn append(
        &self,
        org_id: &str,
        event_type: EventType,
        actor: &Actor,
        payload: Value,
        run_id: Option<&str>,
    ) -> Result<AuditEvent, TesseraError> {
        let write_txn = self.vault.begin_write()?;
        let event = append_in(
            &write_txn,
            self.vault.now(),
            Draft {
                org_id,
                event_type,
                actor,
                payload,
                run_id,
            },
        )?;
        write_txn.commit()?;
        Ok(event)
    }

    /// Recompute `org_id`'s chain from genesis.
    ///
    /// An org with no events verifies trivially.
    ///
    /// # Errors
    ///
    /// `TesseraError::ChainBroken` naming the first event whose stored
    /// linkage or hash disagrees with the recomputed chain.
    pub fn verify_chain(&self, org_id: &str) -> Result<ChainReport, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let events = read_txn.open_table(AUDIT_EVENTS)?;

        let mut expected_prev = GENESIS_HASH.to_string();
        let mut expected_seq = 0u64;
        let mut last_id = None;

        for entry in events.range((org_id, 0u64)..=(org_id, u64::MAX))? {
            let (key, value) = entry?;
            let (_, seq) = key.value();
            let event: AuditEvent = serde_json::from_slice(value.value())?;

            let linked = seq == expected_seq
                && event.seq == seq
                && event.org_id == org_id
                && event.prev_hash == expected_prev;
            if !linked || event.compute_hash(&expected_prev) != event.event_hash {
                return Err(broken(org_id, event.id));
            }

            expected_prev = event.event_hash;
            expected_seq = expected_seq.saturating_add(1);
            last_id = Some(event.id);
        }

        // A head that points past the last stored event means the tail was cut.
        let heads = read_txn.open_table(AUDIT_HEADS)?;
        if let Some(raw) = heads.get(org_id)?.map(|g| g.value().to_vec()) {
            let head: ChainHead = postcard::from_bytes(&raw)?;
            if head.event_hash != expected_prev || Some(head.event_id) != last_id {
                return Err(broken(org_id, head.event_id));
            }
        }

        tracing::debug!(org = org_id, events = expected_seq, "audit chain verified");
        Ok(ChainReport {
            org_id: org_id.to_string(),
            events: expected_seq,
            head: expected_prev,
        })
    }

    /// Every event of `org_id`, in append order.
    pub fn events(&self, org_id: &str) -> Result<Vec<AuditEvent>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(AUDIT_EVENTS)?;
        let mut out = Vec::new();
        for entry in table.range((org_id, 0u64)..=(org_id, u64::MAX))? {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(value.value())?);
        }
        Ok(out)
    }

    /// Look up an event by id.
    pub fn event(&self, id: EventId) -> Result<AuditEvent, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let index = read_txn.open_table(AUDIT_BY_ID)?;
        let raw = index
            .get(id.0)?
            .map(|g| g.value().to_vec())
            .ok_or_else(|| TesseraError::NotFound(format!("event {}", id)))?;
        let locator: EventLocator = postcard::from_bytes(&raw)?;

        let events = read_txn.open_table(AUDIT_EVENTS)?;
        let row = events
            .get((locator.org_id.as_str(), locator.seq))?
            .map(|g| g.value().to_vec())
            .ok_or_else(|| TesseraError::NotFound(format!("event {}", id)))?;
        Ok(serde_json::from_slice(&row)?)
    }

    /// Look up an event by its `event_hash`.
    pub fn find_by_hash(&self, event_hash: &str) -> Result<AuditEvent, TesseraError> {
        let id = {
            let read_txn = self.vault.begin_read()?;
            let index = read_txn.open_table(AUDIT_BY_HASH)?;
            index.get(event_hash)?.map(|g| g.value())
        };
        match id {
            Some(id) => self.event(EventId(id)),
            None => Err(TesseraError::NotFound(format!("event hash {}", event_hash))),
        }
    }

    /// The latest event of `org_id`'s chain, if any.
    pub fn head(&self, org_id: &str) -> Result<Option<ChainHead>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let heads = read_txn.open_table(AUDIT_HEADS)?;
        let raw = heads.get(org_id)?.map(|g| g.value().to_vec());
        raw.map(|bytes| postcard::from_bytes::<ChainHead>(&bytes).map_err(TesseraError::from))
            .transpose()
    }

    /// Every org that has at least one event.
    pub fn orgs(&self) -> Result<Vec<String>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let heads = read_txn.open_table(AUDIT_HEADS)?;
        let mut out = Vec::new();
        for entry in heads.iter()? {
            let (key, _) = entry?;
            out.push(key.value().to_string());
        }
        Ok(out)
    }

    /// Rewrite a stored event in place, bypassing the chain.
    #[cfg(test)]
    pub(crate) fn overwrite_raw(&self, event: &AuditEvent) -> Result<(), TesseraError> {
        let bytes = serde_json::to_vec(event)?;
        let write_txn = self.vault.begin_write()?;
        write_txn
            .open_table(AUDIT_EVENTS)?
            .insert((event.org_id.as_str(), event.seq), bytes.as_slice())?;
        write_txn.commit()?;
        Ok(())
    }
}

fn broken(org_id: &str, event_id: EventId) -> TesseraError {
    tracing::warn!(org = org_id, event = %event_id, "audit chain broken");
    TesseraError::ChainBroken {
        org_id: org_id.to_string(),
        event_id,
    }
}

/// Link `draft` into its org's chain inside an open write transaction.
///
/// The caller commits. Nothing is visible until it does.
pub(crate) fn append_in(
    txn: &WriteTransaction,
    now: Timestamp,
    draft: Draft<'_>,
) -> Result<AuditEvent, TesseraError> {
    if draft.org_id.is_empty() {
        return Err(TesseraError::Schema("org_id must not be empty".to_string()));
    }

    let mut heads = txn.open_table(AUDIT_HEADS)?;
    let head = heads
        .get(draft.org_id)?
        .map(|g| g.value().to_vec())
        .map(|raw| postcard::from_bytes::<ChainHead>(&raw))
        .transpose()?;
    let (seq, prev_hash) = match head {
        Some(h) => (h.seq.saturating_add(1), h.event_hash),
        None => (0, GENESIS_HASH.to_string()),
    };

    // Hash the payload as it will read back from the row, not as given.
    let payload: Value = serde_json::from_slice(&serde_json::to_vec(&draft.payload)?)?;

    let id = EventId(next_id(txn, NEXT_EVENT_ID)?);
    let mut event = AuditEvent {
        id,
        org_id: draft.org_id.to_string(),
        seq,
        event_type: draft.event_type,
        timestamp: now,
        run_id: draft.run_id.map(str::to_string),
        actor: draft.actor.clone(),
        payload,
        prev_hash,
        event_hash: String::new(),
    };
    event.event_hash = event.compute_hash(&event.prev_hash);

    let row = serde_json::to_vec(&event)?;
    txn.open_table(AUDIT_EVENTS)?
        .insert((draft.org_id, seq), row.as_slice())?;

    let locator = postcard::to_allocvec(&EventLocator {
        org_id: event.org_id.clone(),
        seq,
    })?;
    txn.open_table(AUDIT_BY_ID)?
        .insert(id.0, locator.as_slice())?;
    txn.open_table(AUDIT_BY_HASH)?
        .insert(event.event_hash.as_str(), id.0)?;

    let new_head = postcard::to_allocvec(&ChainHead {
        seq,
        event_id: id,
        event_hash: event.event_hash.clone(),
    })?;
    heads.insert(draft.org_id, new_head.as_slice())?;

    tracing::debug!(
        org = draft.org_id,
        event = %id,
        event_type = %event.event_type,
        "audit event appended"
    );
    Ok(event)
}

// =============================================================================
// TESTS
// =============================================================================
