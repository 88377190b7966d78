//! # Object Store
//!
//! Immutable, content-addressed blob storage.
//!
//! - `id = hex(SHA-256(bytes))`
//! - `put` is idempotent: identical bytes map to one row
//! - There is no update. `delete` drops the mapping and leaves a
//!   tombstone; the bytes under a hash are never rewritten
//! - `get` does not re-hash. Callers that need integrity assurance call
//!   `verify`, `check` or `get_verified`

use crate::primitives::MAX_OBJECT_SIZE;
use crate::storage::{OBJECT_META, OBJECTS, TOMBSTONES, Vault};
use crate::{ObjectId, TesseraError, Timestamp};
use redb::{ReadableTable, ReadableTableMetadata};
use serde::{Deserialize, Serialize};

/// A stored object with its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub bytes: Vec<u8>,
    pub created_at: Timestamp,
}

/// Object metadata without the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub id: ObjectId,
    pub size: u64,
    pub created_at: Timestamp,
}

/// Row layout of `OBJECT_META`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredMeta {
    size: u64,
    created_at: u64,
}

/// Content-addressed store bound to a vault.
#[derive(Debug, Clone, Copy)]
pub struct ObjectStore<'v> {
    vault: &'v Vault,
}

impl<'v> ObjectStore<'v> {
    /// Bind to a vault.
    #[must_use]
    pub fn new(vault: &'v Vault) -> Self {
        Self { vault }
    }

    /// Store `bytes` and return their content address.
    ///
    /// Writing bytes that are already present is a no-op. Writing bytes
    /// whose id was deleted restores the mapping.
    ///
    /// # Errors
    ///
    /// `TesseraError::Schema` if `bytes` is larger than `MAX_OBJECT_SIZE`.
    pub fn put(&self, bytes: &[u8]) -> Result<ObjectId, TesseraError> {
        if bytes.len() > MAX_OBJECT_SIZE {
            return Err(TesseraError::Schema(format!(
                "object is {} bytes, maximum is {}",
                bytes.len(),
                MAX_OBJECT_SIZE
            )));
        }

        let id = ObjectId::of(bytes);
        let now = self.vault.now();

        let write_txn = self.vault.begin_write()?;
        let inserted = {
            let mut objects = write_txn.open_table(OBJECTS)?;
            if objects.get(id.as_str())?.is_some() {
                false
            } else {
                objects.insert(id.as_str(), bytes)?;

                let meta = StoredMeta {
                    size: bytes.len() as u64,
                    created_at: now.as_millis(),
                };
                let meta_bytes = postcard::to_allocvec(&meta)?;
                write_txn
                    .open_table(OBJECT_META)?
                    .insert(id.as_str(), meta_bytes.as_slice())?;
                write_txn.open_table(TOMBSTONES)?.remove(id.as_str())?;
                true
            }
        };
        write_txn.commit()?;

        if inserted {
            tracing::debug!(object = %id, size = bytes.len(), "object stored");
        } else {
            tracing::trace!(object = %id, "object already present");
        }
        Ok(id)
    }

    /// Fetch the bytes stored under `id`, without verifying them.
    pub fn get(&self, id: &ObjectId) -> Result<Vec<u8>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let objects = read_txn.open_table(OBJECTS)?;
        let bytes = objects
            .get(id.as_str())?
            .map(|guard| guard.value().to_vec());
        bytes.ok_or_else(|| TesseraError::NotFound(format!("object {}", id)))
    }

    /// Fetch the bytes and their metadata.
    pub fn record(&self, id: &ObjectId) -> Result<ObjectRecord, TesseraError> {
        let bytes = self.get(id)?;
        let meta = self.stat(id)?;
        Ok(ObjectRecord {
            id: meta.id,
            bytes,
            created_at: meta.created_at,
        })
    }

    /// Re-hash the stored bytes and compare with `id`.
    ///
    /// Returns `Ok(false)` on mismatch; `NotFound` if nothing is stored.
    pub fn verify(&self, id: &ObjectId) -> Result<bool, TesseraError> {
        let bytes = self.get(id)?;
        Ok(ObjectId::of(&bytes) == *id)
    }

    /// Like `verify`, but a mismatch is an error.
    ///
    /// # Errors
    ///
    /// `TesseraError::Corruption` carrying the hash the bytes now have.
    pub fn check(&self, id: &ObjectId) -> Result<(), TesseraError> {
        let bytes = self.get(id)?;
        Self::ensure_intact(id, &bytes)
    }

    /// Fetch bytes that are guaranteed to hash to `id`.
    pub fn get_verified(&self, id: &ObjectId) -> Result<Vec<u8>, TesseraError> {
        let bytes = self.get(id)?;
        Self::ensure_intact(id, &bytes)?;
        Ok(bytes)
    }

    fn ensure_intact(id: &ObjectId, bytes: &[u8]) -> Result<(), TesseraError> {
        let actual = ObjectId::of(bytes);
        if actual == *id {
            return Ok(());
        }
        tracing::warn!(object = %id, actual = %actual, "object failed verification");
        Err(TesseraError::Corruption {
            id: id.clone(),
            actual: actual.to_string(),
        })
    }

    /// Whether `id` is currently mapped.
    pub fn contains(&self, id: &ObjectId) -> Result<bool, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let objects = read_txn.open_table(OBJECTS)?;
        Ok(objects.get(id.as_str())?.is_some())
    }

    /// Size and creation time of an object.
    pub fn stat(&self, id: &ObjectId) -> Result<ObjectMeta, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(OBJECT_META)?;
        let raw = table
            .get(id.as_str())?
            .map(|guard| guard.value().to_vec())
            .ok_or_else(|| TesseraError::NotFound(format!("object {}", id)))?;
        let stored: StoredMeta = postcard::from_bytes(&raw)?;
        Ok(ObjectMeta {
            id: id.clone(),
            size: stored.size,
            created_at: Timestamp::from_millis(stored.created_at),
        })
    }

    /// Remove the mapping for `id` and leave a tombstone.
    ///
    /// Returns `false` if `id` was not mapped.
    pub fn delete(&self, id: &ObjectId) -> Result<bool, TesseraError> {
        let now = self.vault.now();
        let write_txn = self.vault.begin_write()?;
        let removed = {
            let mut objects = write_txn.open_table(OBJECTS)?;
            let removed = objects.remove(id.as_str())?.is_some();
            if removed {
                write_txn.open_table(OBJECT_META)?.remove(id.as_str())?;
                write_txn
                    .open_table(TOMBSTONES)?
                    .insert(id.as_str(), now.as_millis())?;
            }
            removed
        };
        write_txn.commit()?;

        if removed {
            tracing::info!(object = %id, "object tombstoned");
        }
        Ok(removed)
    }

    /// When `id` was deleted, if it is currently tombstoned.
    pub fn tombstone(&self, id: &ObjectId) -> Result<Option<Timestamp>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(TOMBSTONES)?;
        Ok(table
            .get(id.as_str())?
            .map(|guard| Timestamp::from_millis(guard.value())))
    }

    /// Number of mapped objects.
    pub fn len(&self) -> Result<u64, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        Ok(read_txn.open_table(OBJECTS)?.len()?)
    }

    /// Whether the store holds no objects.
    pub fn is_empty(&self) -> Result<bool, TesseraError> {
        Ok(self.len()? == 0)
    }

    /// Metadata of every mapped object, in id order.
    pub fn list(&self) -> Result<Vec<ObjectMeta>, TesseraError> {
        let read_txn = self.vault.begin_read()?;
        let table = read_txn.open_table(OBJECT_META)?;
        let mut out = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let stored: StoredMeta = postcard::from_bytes(value.value())?;
            out.push(ObjectMeta {
                id: ObjectId::parse(key.value())?,
                size: stored.size,
                created_at: Timestamp::from_millis(stored.created_at),
            });
        }
        Ok(out)
    }

    /// Overwrite stored bytes behind the store's back, simulating bit rot.
    #[cfg(test)]
    pub(crate) fn overwrite_raw(&self, id: &ObjectId, bytes: &[u8]) -> Result<(), TesseraError> {
        let write_txn = self.vault.begin_write()?;
        write_txn.open_table(OBJECTS)?.insert(id.as_str(), bytes)?;
        write_txn.commit()?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
