//! # redb-backed Vault
//!
//! The single durable handle behind every Tessera component. One redb
//! database holds objects, the audit chain, and policy state, so a write
//! that touches several of them commits atomically.
//!
//! redb gives us:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! The single-writer rule is what serializes ledger appends, approval
//! transitions and rate-counter updates: each of those reads and writes
//! its state inside one `WriteTransaction`.

use crate::TesseraError;
use crate::clock::{Clock, SystemClock};
use crate::ledger::Ledger;
use crate::objects::ObjectStore;
use crate::policy::{ModelEngine, ToolEngine};
use crate::types::Timestamp;
use redb::backends::InMemoryBackend;
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// TABLES
// =============================================================================

/// Object bytes: id -> bytes
pub(crate) const OBJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("objects");

/// Object metadata: id -> postcard `ObjectMeta`
pub(crate) const OBJECT_META: TableDefinition<&str, &[u8]> = TableDefinition::new("object_meta");

/// Tombstones: id -> deleted_at (ms)
pub(crate) const TOMBSTONES: TableDefinition<&str, u64> = TableDefinition::new("tombstones");

/// Audit events: (org_id, seq) -> JSON `AuditEvent`
pub(crate) const AUDIT_EVENTS: TableDefinition<(&str, u64), &[u8]> =
    TableDefinition::new("audit_events");

/// Chain heads: org_id -> postcard `ChainHead`
pub(crate) const AUDIT_HEADS: TableDefinition<&str, &[u8]> = TableDefinition::new("audit_heads");

/// Event id index: event id -> postcard `EventLocator`
pub(crate) const AUDIT_BY_ID: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_by_id");

/// Event hash index: event_hash -> event id
pub(crate) const AUDIT_BY_HASH: TableDefinition<&str, u64> = TableDefinition::new("audit_by_hash");

/// Tool policies: (org_id, tool_name) -> postcard `ToolPolicy`
pub(crate) const TOOL_POLICIES: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("tool_policies");

/// Tool approvals: approval id -> JSON `ToolApproval`
pub(crate) const TOOL_APPROVALS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("tool_approvals");

/// Model policies: (org_id, provider, model_name) -> postcard `ModelPolicy`
pub(crate) const MODEL_POLICIES: TableDefinition<(&str, &str, &str), &[u8]> =
    TableDefinition::new("model_policies");

/// Model usage: (org_id, provider, model_name) -> postcard `UsageState`
pub(crate) const MODEL_USAGE: TableDefinition<(&str, &str, &str), &[u8]> =
    TableDefinition::new("model_usage");

/// Counters: key -> next value
pub(crate) const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Counter keys in `METADATA`.
pub(crate) const NEXT_EVENT_ID: &str = "next_event_id";
pub(crate) const NEXT_APPROVAL_ID: &str = "next_approval_id";
pub(crate) const NEXT_TICKET_ID: &str = "next_ticket_id";

// =============================================================================
// VAULT
// =============================================================================

/// Row counts across the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaultStats {
    pub objects: u64,
    pub tombstones: u64,
    pub audit_events: u64,
    pub audit_chains: u64,
    pub tool_policies: u64,
    pub tool_approvals: u64,
    pub model_policies: u64,
}

/// The durable store handle. Pass it explicitly to every component.
pub struct Vault {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open or create a vault file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TesseraError> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    /// Open or create a vault file with an explicit clock.
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TesseraError> {
        let db = Database::create(path.as_ref())?;
        Self::init(db, clock)
    }

    /// A vault that lives only in memory.
    pub fn in_memory() -> Result<Self, TesseraError> {
        Self::in_memory_with_clock(Arc::new(SystemClock))
    }

    /// An in-memory vault with an explicit clock.
    pub fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, TesseraError> {
        let db = Database::builder().create_with_backend(InMemoryBackend::new())?;
        Self::init(db, clock)
    }

    fn init(db: Database, clock: Arc<dyn Clock>) -> Result<Self, TesseraError> {
        // Create every table up front so readers never see a missing table.
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(OBJECTS)?;
            let _ = write_txn.open_table(OBJECT_META)?;
            let _ = write_txn.open_table(TOMBSTONES)?;
            let _ = write_txn.open_table(AUDIT_EVENTS)?;
            let _ = write_txn.open_table(AUDIT_HEADS)?;
            let _ = write_txn.open_table(AUDIT_BY_ID)?;
            let _ = write_txn.open_table(AUDIT_BY_HASH)?;
            let _ = write_txn.open_table(TOOL_POLICIES)?;
            let _ = write_txn.open_table(TOOL_APPROVALS)?;
            let _ = write_txn.open_table(MODEL_POLICIES)?;
            let _ = write_txn.open_table(MODEL_USAGE)?;
            let _ = write_txn.open_table(METADATA)?;
        }
        write_txn.commit()?;
        tracing::debug!("vault tables ready");
        Ok(Self { db, clock })
    }

    /// The vault's notion of now.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, TesseraError> {
        self.db
            .compact()
            .map_err(|e| TesseraError::Storage(e.to_string()))
    }

    /// Content-addressed object store over this vault.
    #[must_use]
    pub fn objects(&self) -> ObjectStore<'_> {
        ObjectStore::new(self)
    }

    /// Audit ledger over this vault.
    #[must_use]
    pub fn ledger(&self) -> Ledger<'_> {
        Ledger::new(self)
    }

    /// Tool policy and approval engine over this vault.
    #[must_use]
    pub fn tools(&self) -> ToolEngine<'_> {
        ToolEngine::new(self)
    }

    /// Model cost/rate engine over this vault.
    #[must_use]
    pub fn models(&self) -> ModelEngine<'_> {
        ModelEngine::new(self)
    }

    /// Count rows across the main tables.
    pub fn stats(&self) -> Result<VaultStats, TesseraError> {
        let txn = self.begin_read()?;
        Ok(VaultStats {
            objects: txn.open_table(OBJECTS)?.len()?,
            tombstones: txn.open_table(TOMBSTONES)?.len()?,
            audit_events: txn.open_table(AUDIT_EVENTS)?.len()?,
            audit_chains: txn.open_table(AUDIT_HEADS)?.len()?,
            tool_policies: txn.open_table(TOOL_POLICIES)?.len()?,
            tool_approvals: txn.open_table(TOOL_APPROVALS)?.len()?,
            model_policies: txn.open_table(MODEL_POLICIES)?.len()?,
        })
    }

    pub(crate) fn begin_write(&self) -> Result<WriteTransaction, TesseraError> {
        Ok(self.db.begin_write()?)
    }

    pub(crate) fn begin_read(&self) -> Result<ReadTransaction, TesseraError> {
        Ok(self.db.begin_read()?)
    }
}

/// Allocate the next value of a counter inside `txn`.
pub(crate) fn next_id(txn: &WriteTransaction, key: &str) -> Result<u64, TesseraError> {
    let mut table = txn.open_table(METADATA)?;
    let current = table.get(key)?.map(|v| v.value()).unwrap_or(0);
    table.insert(key, current.saturating_add(1))?;
    Ok(current)
}
