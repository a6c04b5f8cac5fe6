//! Error types for normalization and snapshot encoding.

/// Errors raised while normalizing a result into the store.
///
/// Raised locally by the write path and surfaced to the writer; never
/// retried internally. Merges are applied per-entity, so the unambiguous
/// entities ahead of the failure point may already be committed when the
/// error is returned -- the variants carry enough context for the writer
/// to decide whether to proceed.
#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    /// An object claims an identity (typename + id field present) but the
    /// id value is not a string or integer.
    #[error("object at `{path}` has a non-scalar value for id field `{field}`")]
    NonScalarId {
        /// Result path of the offending object.
        path: String,
        /// The id candidate field that matched.
        field: String,
    },

    /// The same field of the same record received structurally conflicting
    /// values from different places within a single write -- typically an
    /// entity reference from one path and an inline (keyless) object from
    /// another.
    #[error("conflicting shapes for field `{field}` of `{entity}` within a single write")]
    ShapeConflict {
        /// String form of the affected entity key.
        entity: String,
        /// The affected field storage key.
        field: String,
    },

    /// An argument referenced a variable the operation does not bind.
    #[error("variable `${name}` referenced by field `{field}` is not bound")]
    UnboundVariable {
        /// The unbound variable name.
        name: String,
        /// The field whose argument referenced it.
        field: String,
    },

    /// Field arguments could not be encoded into a canonical storage key.
    #[error("arguments of field `{field}` are not JSON-encodable")]
    UnserializableArguments {
        /// The field whose arguments failed to encode.
        field: String,
    },

    /// The value being written where an object is required is not one.
    #[error("value at `{path}` is not an object")]
    NotAnObject {
        /// Result path of the offending value.
        path: String,
    },
}

/// Errors raised while encoding or decoding a cache snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// JSON encoding or decoding failed.
    #[error("snapshot JSON codec: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack encoding failed.
    #[error("snapshot MsgPack encode: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack decoding failed.
    #[error("snapshot MsgPack decode: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),
}
