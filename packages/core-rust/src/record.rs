//! Normalized record types.
//!
//! A [`NormalizedRecord`] is the flat, per-entity unit of storage: a map
//! from field storage key to [`FieldEntry`]. Field values never embed an
//! object that qualifies for its own entity key -- such objects are stored
//! as [`FieldValue::Ref`] links instead. Objects that cannot be assigned a
//! stable identity are embedded as [`FieldValue::Inline`] maps.
//!
//! # Conflict resolution
//!
//! Each entry carries the write sequence number that last set it. When two
//! entries compete for the same field key, the one with the greater
//! sequence number wins; the store hands out strictly increasing sequence
//! numbers at merge commit, so "last writer" is defined by merge order
//! rather than by task completion order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::key::EntityKey;
use crate::types::Value;

/// The value stored under one field key of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    /// A leaf value (including custom-scalar objects fetched without a
    /// sub-selection).
    Scalar(Value),
    /// A link to another normalized record.
    Ref(EntityKey),
    /// An ordered collection. Elements may themselves be refs, scalars,
    /// inline objects, or nested lists.
    List(Vec<FieldValue>),
    /// A keyless sub-object embedded in its parent, keyed by field
    /// storage key. Replaced wholesale on overwrite.
    Inline(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Coarse structural kind, used for conflict detection within a write.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Ref(_) => "ref",
            Self::List(_) => "list",
            Self::Inline(_) => "inline",
        }
    }

    /// Returns `true` for refs and inline objects -- the kinds whose
    /// cross-path disagreement signals an identity ambiguity.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Ref(_) | Self::Inline(_))
    }
}

/// One stored field: its value plus the sequence number of the write that
/// last set it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldEntry {
    /// The stored field value.
    pub value: FieldValue,
    /// Sequence number of the committing write.
    pub seq: u64,
}

/// A normalized entity record: typename plus flat field map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    /// The entity's type name, when known. Root records have none.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub typename: Option<String>,
    /// Stored fields by field storage key.
    pub fields: BTreeMap<String, FieldEntry>,
}

impl NormalizedRecord {
    /// Merges one field, keeping the entry with the greater sequence
    /// number. Returns `true` if the stored state changed.
    ///
    /// Fields absent from an incoming write are never touched; deletion
    /// does not exist at this layer.
    pub fn merge_field(&mut self, key: impl Into<String>, value: FieldValue, seq: u64) -> bool {
        let key = key.into();
        let (stale, identical) = match self.fields.get(&key) {
            Some(existing) => (existing.seq > seq, existing.value == value),
            None => (false, false),
        };
        if stale {
            return false;
        }
        // Identical values still refresh the sequence so later tie-breaks
        // stay ordered.
        self.fields.insert(key, FieldEntry { value, seq });
        !identical
    }

    /// Returns the stored value under a field key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key).map(|entry| &entry.value)
    }

    /// Number of stored fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    // ---- merge_field ----

    #[test]
    fn higher_seq_wins() {
        let mut record = NormalizedRecord::default();
        record.merge_field("name", FieldValue::Scalar("old".into()), 1);
        record.merge_field("name", FieldValue::Scalar("new".into()), 2);
        assert_eq!(record.field("name"), Some(&FieldValue::Scalar("new".into())));

        // A stale write must not revert the field.
        let changed = record.merge_field("name", FieldValue::Scalar("stale".into()), 1);
        assert!(!changed);
        assert_eq!(record.field("name"), Some(&FieldValue::Scalar("new".into())));
    }

    #[test]
    fn merge_never_deletes_other_fields() {
        let mut record = NormalizedRecord::default();
        record.merge_field("name", FieldValue::Scalar("Ada".into()), 1);
        record.merge_field("age", FieldValue::Scalar(Value::Int(36)), 2);
        assert_eq!(record.len(), 2);
        assert_eq!(record.field("name"), Some(&FieldValue::Scalar("Ada".into())));
    }

    #[test]
    fn merge_reports_change() {
        let mut record = NormalizedRecord::default();
        assert!(record.merge_field("a", FieldValue::Scalar(Value::Int(1)), 1));
        assert!(!record.merge_field("a", FieldValue::Scalar(Value::Int(1)), 2));
        assert!(record.merge_field("a", FieldValue::Scalar(Value::Int(2)), 3));
    }

    #[test]
    fn field_value_kinds() {
        assert_eq!(FieldValue::Scalar(Value::Null).kind(), "scalar");
        assert_eq!(FieldValue::Ref(EntityKey::new("U", "1")).kind(), "ref");
        assert!(FieldValue::Ref(EntityKey::new("U", "1")).is_structural());
        assert!(!FieldValue::List(vec![]).is_structural());
    }

    // ---- Serialization ----

    #[test]
    fn record_round_trips_through_json() {
        let mut record = NormalizedRecord {
            typename: Some("User".to_string()),
            fields: BTreeMap::new(),
        };
        record.merge_field("id", FieldValue::Scalar("1".into()), 1);
        record.merge_field("pet", FieldValue::Ref(EntityKey::new("Pet", "9")), 1);
        record.merge_field(
            "address",
            FieldValue::Inline(BTreeMap::from([(
                "city".to_string(),
                FieldValue::Scalar("Oslo".into()),
            )])),
            1,
        );

        let json = serde_json::to_string(&record).expect("serialize");
        let back: NormalizedRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }

    // ---- Properties ----

    proptest! {
        /// Applying two entries with distinct sequence numbers converges on
        /// the higher one regardless of merge order.
        #[test]
        fn last_writer_is_order_independent(a in 0u64..1000, b in 0u64..1000) {
            prop_assume!(a != b);

            let va = FieldValue::Scalar(Value::Int(i64::try_from(a).unwrap_or(0)));
            let vb = FieldValue::Scalar(Value::Int(i64::try_from(b).unwrap_or(0)));

            let mut forward = NormalizedRecord::default();
            forward.merge_field("f", va.clone(), a);
            forward.merge_field("f", vb.clone(), b);

            let mut reverse = NormalizedRecord::default();
            reverse.merge_field("f", vb, b);
            reverse.merge_field("f", va, a);

            prop_assert_eq!(forward.field("f"), reverse.field("f"));
        }

        /// Merging any number of distinct fields loses none of them.
        #[test]
        fn merge_preserves_field_union(count in 1usize..24) {
            let mut record = NormalizedRecord::default();
            for i in 0..count {
                let seq = u64::try_from(i).unwrap_or(0);
                record.merge_field(
                    format!("field{i}"),
                    FieldValue::Scalar(Value::Int(i64::try_from(i).unwrap_or(0))),
                    seq,
                );
            }
            prop_assert_eq!(record.len(), count);
        }
    }
}
