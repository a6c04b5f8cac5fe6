//! Cache reads: rebuilding hierarchical results from normalized records.
//!
//! A read resolves references from a root record outward, expanding each
//! nested reference per the requested selection. The outcome is binary:
//! [`ReadResult::Complete`] when every selected field resolved, otherwise
//! [`ReadResult::Partial`] with the missing paths enumerated. A partial
//! read is a defined outcome, not an error -- it is the signal fetch
//! policies branch on.
//!
//! Recursion follows the selection, not the data, so cyclic entity graphs
//! terminate: depth is bounded by selection depth.

use std::collections::BTreeMap;

use crate::key::EntityKey;
use crate::record::FieldValue;
use crate::selection::{Operation, Selection, SelectionField};
use crate::store::CacheStore;
use crate::types::Value;

/// Outcome of a cache read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    /// Every field in the selection resolved without gaps.
    Complete {
        /// The reconstructed result.
        data: Value,
    },
    /// At least one selected field could not be resolved. The data is
    /// still returned best-effort with `null` at the gaps.
    Partial {
        /// The reconstructed result, with `null` where data was missing.
        data: Value,
        /// Result paths that failed to resolve, e.g. `user.friends[2].name`.
        missing: Vec<String>,
    },
}

impl ReadResult {
    /// Returns `true` when the read resolved without gaps.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// The reconstructed result, complete or best-effort.
    #[must_use]
    pub fn data(&self) -> &Value {
        match self {
            Self::Complete { data } | Self::Partial { data, .. } => data,
        }
    }

    /// Consumes the result, returning the data.
    #[must_use]
    pub fn into_data(self) -> Value {
        match self {
            Self::Complete { data } | Self::Partial { data, .. } => data,
        }
    }

    /// Paths that failed to resolve. Empty for complete reads.
    #[must_use]
    pub fn missing(&self) -> &[String] {
        match self {
            Self::Complete { .. } => &[],
            Self::Partial { missing, .. } => missing,
        }
    }
}

/// Reads an operation's selection starting at `root`.
pub(crate) fn read(store: &CacheStore, operation: &Operation, root: &EntityKey) -> ReadResult {
    let mut reader = Reader {
        store,
        variables: &operation.variables,
        missing: Vec::new(),
    };
    let data = reader.read_record(root, &operation.selection, "");
    if reader.missing.is_empty() {
        ReadResult::Complete { data }
    } else {
        ReadResult::Partial {
            data,
            missing: reader.missing,
        }
    }
}

struct Reader<'a> {
    store: &'a CacheStore,
    variables: &'a BTreeMap<String, Value>,
    missing: Vec<String>,
}

impl Reader<'_> {
    fn read_record(&mut self, key: &EntityKey, selection: &Selection, path: &str) -> Value {
        // Clone the record out of the map so no shard lock is held while
        // recursing into other entities.
        let record = self.store.record(key);
        let mut out = BTreeMap::new();

        for field in &selection.fields {
            let response_key = field.response_key().to_string();
            let field_path = join_path(path, &response_key);

            let Ok(storage_key) = field.storage_key(self.variables) else {
                self.missing.push(field_path);
                out.insert(response_key, Value::Null);
                continue;
            };

            let stored = record
                .as_ref()
                .and_then(|r| r.field(&storage_key).cloned());

            match stored {
                Some(value) => {
                    let resolved = self.resolve(value, field, &field_path);
                    out.insert(response_key, resolved);
                }
                None => {
                    // The typename is tracked on the record itself, so a
                    // typename selection resolves even when no write ever
                    // stored it as a field.
                    let typename_field = &self.store.key_config().typename_field;
                    let fallback = (field.name == *typename_field)
                        .then(|| record.as_ref().and_then(|r| r.typename.clone()))
                        .flatten();
                    match fallback {
                        Some(typename) => {
                            out.insert(response_key, Value::String(typename));
                        }
                        None => {
                            self.missing.push(field_path);
                            out.insert(response_key, Value::Null);
                        }
                    }
                }
            }
        }

        Value::Object(out)
    }

    fn read_inline(
        &mut self,
        inline: &BTreeMap<String, FieldValue>,
        selection: &Selection,
        path: &str,
    ) -> Value {
        let mut out = BTreeMap::new();
        for field in &selection.fields {
            let response_key = field.response_key().to_string();
            let field_path = join_path(path, &response_key);

            let Ok(storage_key) = field.storage_key(self.variables) else {
                self.missing.push(field_path);
                out.insert(response_key, Value::Null);
                continue;
            };

            match inline.get(&storage_key) {
                Some(value) => {
                    let resolved = self.resolve(value.clone(), field, &field_path);
                    out.insert(response_key, resolved);
                }
                None => {
                    self.missing.push(field_path);
                    out.insert(response_key, Value::Null);
                }
            }
        }
        Value::Object(out)
    }

    fn resolve(&mut self, value: FieldValue, field: &SelectionField, path: &str) -> Value {
        match value {
            FieldValue::Scalar(v) => v,
            FieldValue::Ref(key) => match &field.selection {
                Some(sub_selection) => self.read_record(&key, sub_selection, path),
                // A ref read without a sub-selection degrades to its key
                // string; there is no shape to expand it into.
                None => Value::String(key.to_string()),
            },
            FieldValue::List(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.resolve(item, field, &format!("{path}[{i}]")))
                    .collect(),
            ),
            FieldValue::Inline(map) => match &field.selection {
                Some(sub_selection) => self.read_inline(&map, sub_selection, path),
                None => {
                    self.missing.push(path.to_string());
                    Value::Null
                }
            },
        }
    }
}

fn join_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}
