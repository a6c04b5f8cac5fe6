//! Entity identity and field-key derivation.
//!
//! Every object in a query result that carries a type name and an
//! identifying field is assigned an [`EntityKey`]; objects appearing in
//! multiple results under the same key are merged into one stored record.
//! Identity derivation is a pure function of the object's shape, so it is
//! deterministic, and the `(typename, id)` pair is injective by
//! construction -- two logically distinct entities can never collide.
//!
//! Field storage keys ([`field_key`]) fold a field's arguments into the key
//! so that `user(id: 1)` and `user(id: 2)` occupy distinct slots in a
//! record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::NormalizationError;
use crate::types::Value;

/// Typename reserved for operation root records. `@` cannot start a
/// GraphQL type name, so root keys can never collide with entity keys.
const ROOT_TYPENAME: &str = "@root";

/// Stable identity for a normalized entity: type name plus identifying id.
///
/// The string form is `Type:id`, split at the *first* `:` when parsing, so
/// ids containing `:` round-trip. Serialized as the string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct EntityKey {
    /// The object's type name (from the typename field).
    pub typename: String,
    /// The identifying field value, stringified.
    pub id: String,
}

impl EntityKey {
    /// Creates an entity key from a typename and id.
    #[must_use]
    pub fn new(typename: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            typename: typename.into(),
            id: id.into(),
        }
    }

    /// The designated root record key for an operation kind.
    #[must_use]
    pub fn root(kind: crate::selection::OperationKind) -> Self {
        Self {
            typename: ROOT_TYPENAME.to_string(),
            id: kind.root_id().to_string(),
        }
    }

    /// Returns `true` if this key designates an operation root record.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.typename == ROOT_TYPENAME
    }

    /// Parses the `Type:id` string form, splitting at the first `:`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (typename, id) = s.split_once(':')?;
        if typename.is_empty() {
            return None;
        }
        Some(Self::new(typename, id))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

impl From<EntityKey> for String {
    fn from(key: EntityKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for EntityKey {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("malformed entity key: {s}"))
    }
}

/// Configuration for entity identity derivation.
///
/// Controls which result fields carry the type name and the identifying
/// id. Construct once per store; the defaults match common GraphQL server
/// conventions.
#[derive(Debug, Clone)]
pub struct KeyConfig {
    /// Field holding the object's type name.
    pub typename_field: String,
    /// Ordered candidate list of identifying fields. The first candidate
    /// present on an object is used.
    pub id_fields: Vec<String>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            typename_field: "__typename".to_string(),
            id_fields: vec!["id".to_string(), "_id".to_string()],
        }
    }
}

/// A successfully derived identity, with the id field that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Identified {
    /// The derived entity key.
    pub key: EntityKey,
    /// Which id candidate field matched.
    pub id_field: String,
    /// The id value as it appeared in the result.
    pub id_value: Value,
}

impl KeyConfig {
    /// Derives an identity for a result object, if it qualifies.
    ///
    /// An object qualifies when it carries a string typename and one of the
    /// id candidate fields with a string or integer value. Objects without
    /// a typename or id are stored inline in their parent record instead.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError::NonScalarId`] when the object carries
    /// a typename and an id candidate field whose value is not a string or
    /// integer -- such an object claims an identity it cannot be given.
    pub fn identify(
        &self,
        obj: &BTreeMap<String, Value>,
        path: &str,
    ) -> Result<Option<Identified>, NormalizationError> {
        let Some(typename) = obj.get(&self.typename_field).and_then(Value::as_str) else {
            return Ok(None);
        };

        for candidate in &self.id_fields {
            let Some(id_value) = obj.get(candidate) else {
                continue;
            };
            let id = match id_value {
                Value::String(s) => s.clone(),
                Value::Int(i) => i.to_string(),
                Value::Null => continue,
                _ => {
                    return Err(NormalizationError::NonScalarId {
                        path: path.to_string(),
                        field: candidate.clone(),
                    })
                }
            };
            return Ok(Some(Identified {
                key: EntityKey::new(typename, id),
                id_field: candidate.clone(),
                id_value: id_value.clone(),
            }));
        }

        Ok(None)
    }
}

/// Computes the storage key for a field with resolved arguments.
///
/// Fields without arguments are keyed by name alone. Fields with arguments
/// append the canonical JSON of the argument object (sorted keys via
/// `BTreeMap`), so the same arguments always produce the same key.
///
/// # Errors
///
/// Returns [`NormalizationError::UnserializableArguments`] when an
/// argument value cannot be encoded as JSON (non-finite floats).
pub fn field_key(
    name: &str,
    args: &BTreeMap<String, Value>,
) -> Result<String, NormalizationError> {
    if args.is_empty() {
        return Ok(name.to_string());
    }
    let canonical = serde_json::to_string(args).map_err(|_| {
        NormalizationError::UnserializableArguments {
            field: name.to_string(),
        }
    })?;
    Ok(format!("{name}({canonical})"))
}
