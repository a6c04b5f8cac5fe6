//! The normalized cache store.
//!
//! [`CacheStore`] is the single source of truth for fetched data within
//! one request: a flat mapping from [`EntityKey`] to [`NormalizedRecord`],
//! backed by [`DashMap`] so merges of distinct entities proceed
//! concurrently while each entity's merge is atomic under its map-entry
//! lock.
//!
//! Stores are request-scoped by design: construct one per top-level pass
//! and pass it through the call chain. A process-wide store would leak one
//! request's data into another's response.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::NormalizationError;
use crate::key::{EntityKey, KeyConfig};
use crate::normalize::normalize;
use crate::read::{read, ReadResult};
use crate::record::NormalizedRecord;
use crate::selection::Operation;
use crate::snapshot::CacheSnapshot;
use crate::types::Value;

/// Summary of one committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Entities the write touched, in merge order.
    pub entities: Vec<EntityKey>,
    /// Number of fields whose stored state actually changed.
    pub fields_written: usize,
    /// The sequence number the write committed at.
    pub committed_seq: u64,
}

/// Request-scoped normalized cache store.
pub struct CacheStore {
    records: DashMap<EntityKey, NormalizedRecord>,
    seq: AtomicU64,
    config: KeyConfig,
}

impl CacheStore {
    /// Creates an empty store with the default [`KeyConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(KeyConfig::default())
    }

    /// Creates an empty store with an explicit identity configuration.
    #[must_use]
    pub fn with_config(config: KeyConfig) -> Self {
        Self {
            records: DashMap::new(),
            seq: AtomicU64::new(0),
            config,
        }
    }

    /// The identity configuration this store normalizes with.
    #[must_use]
    pub fn key_config(&self) -> &KeyConfig {
        &self.config
    }

    // --- Write path ---

    /// Normalizes a raw result against the operation's selection and
    /// merges it under the operation's root record.
    ///
    /// New fields overwrite prior values under the same field key; fields
    /// absent from this write are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError`] when a sub-object cannot be assigned
    /// a stable identity but is referenced with conflicting shapes, and
    /// for id/argument/variable defects. Normalization runs before any
    /// merge, so a rejected write commits nothing.
    pub fn write(
        &self,
        data: &Value,
        operation: &Operation,
    ) -> Result<WriteReport, NormalizationError> {
        self.write_at(&EntityKey::root(operation.kind), data, operation)
    }

    /// Merges a result under an explicit entity instead of the operation
    /// root -- the building block for fragment-style partial writes.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`write`](Self::write).
    pub fn write_at_root(
        &self,
        data: &Value,
        operation: &Operation,
        root: &EntityKey,
    ) -> Result<WriteReport, NormalizationError> {
        self.write_at(root, data, operation)
    }

    fn write_at(
        &self,
        root: &EntityKey,
        data: &Value,
        operation: &Operation,
    ) -> Result<WriteReport, NormalizationError> {
        let batch = normalize(&self.config, operation, data, root)?;
        let committed_seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut entities = Vec::with_capacity(batch.deltas.len());
        let mut fields_written = 0usize;

        for delta in batch.deltas {
            // The entry guard is the per-entity atomicity boundary: no
            // other merge of this entity interleaves while it is held.
            let mut record = self.records.entry(delta.key.clone()).or_default();
            if record.typename.is_none() {
                record.typename = delta.typename;
            }
            for (field, value) in delta.fields {
                if record.merge_field(field, value, committed_seq) {
                    fields_written += 1;
                }
            }
            drop(record);
            entities.push(delta.key);
        }

        debug!(
            operation = %operation.name,
            seq = committed_seq,
            entities = entities.len(),
            fields = fields_written,
            "merged write batch"
        );

        Ok(WriteReport {
            entities,
            fields_written,
            committed_seq,
        })
    }

    // --- Read path ---

    /// Reads the operation's selection from its root record.
    #[must_use]
    pub fn read(&self, operation: &Operation) -> ReadResult {
        read(self, operation, &EntityKey::root(operation.kind))
    }

    /// Reads the operation's selection from an explicit entity.
    #[must_use]
    pub fn read_from(&self, operation: &Operation, root: &EntityKey) -> ReadResult {
        read(self, operation, root)
    }

    /// Returns a clone of one record, if present.
    #[must_use]
    pub fn record(&self, key: &EntityKey) -> Option<NormalizedRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    /// Returns `true` if an entity is present.
    #[must_use]
    pub fn contains_entity(&self, key: &EntityKey) -> bool {
        self.records.contains_key(key)
    }

    /// Number of records, root records included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Removes all records and resets the sequence counter.
    pub fn clear(&self) {
        self.records.clear();
        self.seq.store(0, Ordering::SeqCst);
    }

    // --- Snapshots ---

    /// Produces an immutable point-in-time snapshot of the full mapping.
    #[must_use]
    pub fn extract(&self) -> CacheSnapshot {
        let mut records = BTreeMap::new();
        for entry in self.records.iter() {
            records.insert(entry.key().to_string(), entry.value().clone());
        }
        CacheSnapshot {
            seq: self.seq.load(Ordering::SeqCst),
            records,
        }
    }

    /// Replaces the store's entire mapping with the snapshot's contents.
    ///
    /// Subsequent reads reflect the restored data exactly; the sequence
    /// counter resumes above the snapshot's high-water mark so later
    /// writes keep winning per-field tie-breaks.
    pub fn restore(&self, snapshot: CacheSnapshot) {
        self.records.clear();
        let mut restored = 0usize;
        for (key, record) in snapshot.records {
            match EntityKey::parse(&key) {
                Some(parsed) => {
                    self.records.insert(parsed, record);
                    restored += 1;
                }
                None => warn!(key = %key, "dropping malformed entity key during restore"),
            }
        }
        self.seq.store(snapshot.seq, Ordering::SeqCst);
        debug!(records = restored, seq = snapshot.seq, "restored snapshot");
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
