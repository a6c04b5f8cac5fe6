//! Point-in-time cache snapshots and their transmissible encodings.
//!
//! A snapshot is the entire identity-to-record mapping at a moment,
//! restorable into a fresh [`CacheStore`](crate::store::CacheStore) with
//! observably identical read results. Two encodings are provided:
//!
//! - an embeddable JSON form for shipping the snapshot inside script-like
//!   markup blocks (server-rendered pages); every `<` is escaped so the
//!   payload cannot terminate its embedding context, and U+2028/U+2029
//!   are escaped so the output is also a valid JS string literal;
//! - a compact binary MsgPack form (via `rmp-serde`) for non-markup
//!   transports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::record::NormalizedRecord;

/// An immutable copy of a store's full identity-to-record mapping.
///
/// Keys are the `Type:id` string form of [`EntityKey`](crate::key::EntityKey);
/// `BTreeMap` keeps the encoding deterministic. The `seq` high-water mark
/// lets a restored store keep assigning winning sequence numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    /// Sequence-counter high-water mark at snapshot time.
    pub seq: u64,
    /// All records, by entity-key string.
    pub records: BTreeMap<String, NormalizedRecord>,
}

impl CacheSnapshot {
    /// Number of records in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Encodes the snapshot as JSON safe to embed in a script-like markup
    /// block.
    ///
    /// `<` can only occur inside JSON string literals, where the
    /// `\u003c` escape is equivalent, so the output parses as ordinary
    /// JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if encoding fails.
    pub fn to_embeddable_json(&self) -> Result<String, SnapshotError> {
        let json = serde_json::to_string(self)?;
        Ok(escape_for_markup(&json))
    }

    /// Decodes a snapshot from its embeddable JSON form.
    ///
    /// The markup escapes are plain JSON escapes, so no custom decoding
    /// is involved.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] on malformed input.
    pub fn from_embeddable_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encodes the snapshot as compact binary MsgPack.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::MsgPackEncode`] if encoding fails.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Decodes a snapshot from its binary MsgPack form.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::MsgPackDecode`] on malformed input.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Escapes characters that could terminate a script-like embedding
/// context or break a JS string literal.
fn escape_for_markup(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(ch),
        }
    }
    out
}
