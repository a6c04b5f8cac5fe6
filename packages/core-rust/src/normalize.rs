//! Result normalization: decomposing hierarchical results into flat
//! record deltas linked by entity references.
//!
//! Normalization is pure -- it produces a [`WriteBatch`] of per-entity
//! deltas without touching the store. The store then commits the batch
//! under one sequence number, taking each entity's map-entry lock in turn,
//! so a batch is atomic per entity relative to concurrent merges.

use std::collections::{BTreeMap, HashMap};

use crate::error::NormalizationError;
use crate::key::{EntityKey, KeyConfig};
use crate::record::FieldValue;
use crate::selection::{Operation, Selection, SelectionField};
use crate::types::Value;

/// Pending changes to one record, produced by normalization.
#[derive(Debug, Clone)]
pub(crate) struct RecordDelta {
    /// The record this delta applies to.
    pub key: EntityKey,
    /// Typename to set on the record, when known.
    pub typename: Option<String>,
    /// New field values by field storage key.
    pub fields: BTreeMap<String, FieldValue>,
}

/// All record deltas produced by normalizing one result, in first-touch
/// order. Applying deltas in this order is deterministic for a given
/// result and selection.
#[derive(Debug)]
pub(crate) struct WriteBatch {
    pub deltas: Vec<RecordDelta>,
}

/// Normalizes a hierarchical result against an operation's selection.
///
/// The result is anchored at `root` -- the operation root record for
/// ordinary writes, or an explicit entity for fragment-style writes.
pub(crate) fn normalize(
    config: &KeyConfig,
    operation: &Operation,
    data: &Value,
    root: &EntityKey,
) -> Result<WriteBatch, NormalizationError> {
    let Some(obj) = data.as_object() else {
        return Err(NormalizationError::NotAnObject {
            path: "(root)".to_string(),
        });
    };

    let mut normalizer = Normalizer {
        config,
        variables: &operation.variables,
        deltas: Vec::new(),
        index: HashMap::new(),
    };

    let root_typename = if root.is_root() {
        None
    } else {
        Some(root.typename.clone())
    };
    let root_idx = normalizer.delta_index(root.clone(), root_typename);
    normalizer.normalize_selection(root_idx, obj, &operation.selection, "")?;

    Ok(WriteBatch {
        deltas: normalizer.deltas,
    })
}

struct Normalizer<'a> {
    config: &'a KeyConfig,
    variables: &'a BTreeMap<String, Value>,
    deltas: Vec<RecordDelta>,
    index: HashMap<EntityKey, usize>,
}

impl Normalizer<'_> {
    /// Returns the delta slot for an entity, creating it on first touch.
    fn delta_index(&mut self, key: EntityKey, typename: Option<String>) -> usize {
        if let Some(&idx) = self.index.get(&key) {
            if self.deltas[idx].typename.is_none() {
                self.deltas[idx].typename = typename;
            }
            return idx;
        }
        let idx = self.deltas.len();
        self.index.insert(key.clone(), idx);
        self.deltas.push(RecordDelta {
            key,
            typename,
            fields: BTreeMap::new(),
        });
        idx
    }

    /// Stores a field value into a delta, detecting cross-path conflicts.
    ///
    /// The same field key may legitimately be produced from several places
    /// in one result (the same entity selected twice). Identical values
    /// are fine; differing values of the same structural kind are resolved
    /// by letting the later occurrence win (traversal order is
    /// deterministic). A kind mismatch involving a ref or an inline object
    /// means the two paths disagree about the sub-object's identity, which
    /// is the ambiguity normalization must refuse.
    fn put_field(
        &mut self,
        idx: usize,
        field: String,
        value: FieldValue,
    ) -> Result<(), NormalizationError> {
        enum Put {
            Insert,
            Keep,
            Conflict,
        }

        let delta = &mut self.deltas[idx];
        let decision = match delta.fields.get(&field) {
            None => Put::Insert,
            Some(existing) if *existing == value => Put::Keep,
            Some(existing)
                if existing.kind() != value.kind()
                    && (existing.is_structural() || value.is_structural()) =>
            {
                Put::Conflict
            }
            Some(_) => Put::Insert,
        };

        match decision {
            Put::Conflict => Err(NormalizationError::ShapeConflict {
                entity: delta.key.to_string(),
                field,
            }),
            Put::Keep => Ok(()),
            Put::Insert => {
                delta.fields.insert(field, value);
                Ok(())
            }
        }
    }

    fn normalize_selection(
        &mut self,
        idx: usize,
        obj: &BTreeMap<String, Value>,
        selection: &Selection,
        path: &str,
    ) -> Result<(), NormalizationError> {
        for field in &selection.fields {
            let response_key = field.response_key();
            // Fields the selection asks for but the result omits are simply
            // not written; absent fields never clear stored data.
            let Some(value) = obj.get(response_key) else {
                continue;
            };
            let storage_key = field.storage_key(self.variables)?;
            let field_path = join_path(path, response_key);
            let normalized = self.normalize_value(value, field, &field_path)?;
            self.put_field(idx, storage_key, normalized)?;
        }
        Ok(())
    }

    fn normalize_value(
        &mut self,
        value: &Value,
        field: &SelectionField,
        path: &str,
    ) -> Result<FieldValue, NormalizationError> {
        match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.normalize_value(item, field, &format!("{path}[{i}]"))?);
                }
                Ok(FieldValue::List(out))
            }
            Value::Object(obj) => match &field.selection {
                // No sub-selection: the object is an opaque custom scalar.
                None => Ok(FieldValue::Scalar(value.clone())),
                Some(sub_selection) => {
                    if let Some(identified) = self.config.identify(obj, path)? {
                        let idx = self
                            .delta_index(identified.key.clone(), Some(identified.key.typename.clone()));
                        // Always store the identifying field so reads can
                        // satisfy id selections even when a later write
                        // omits it.
                        self.put_field(
                            idx,
                            identified.id_field,
                            FieldValue::Scalar(identified.id_value),
                        )?;
                        self.normalize_selection(idx, obj, sub_selection, path)?;
                        Ok(FieldValue::Ref(identified.key))
                    } else {
                        self.normalize_inline(obj, sub_selection, path)
                    }
                }
            },
            _ => Ok(FieldValue::Scalar(value.clone())),
        }
    }

    /// Embeds a keyless object in its parent field. Nested qualifying
    /// objects still normalize into their own records and are linked by
    /// ref from inside the inline map.
    fn normalize_inline(
        &mut self,
        obj: &BTreeMap<String, Value>,
        selection: &Selection,
        path: &str,
    ) -> Result<FieldValue, NormalizationError> {
        let mut inline = BTreeMap::new();
        for field in &selection.fields {
            let response_key = field.response_key();
            let Some(value) = obj.get(response_key) else {
                continue;
            };
            let storage_key = field.storage_key(self.variables)?;
            let field_path = join_path(path, response_key);
            let normalized = self.normalize_value(value, field, &field_path)?;
            inline.insert(storage_key, normalized);
        }
        Ok(FieldValue::Inline(inline))
    }
}

fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}
