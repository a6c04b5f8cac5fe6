//! Graphcache core — normalized cache store, selections, and snapshots.
//!
//! The store maintains a flat mapping from entity identity to field data,
//! de-duplicating objects that appear in multiple query results. Writes
//! normalize hierarchical results into per-entity records; reads rebuild
//! hierarchical results by following references; snapshots make the whole
//! mapping transmissible for client-side rehydration.

pub mod error;
pub mod key;
mod normalize;
pub mod read;
pub mod record;
pub mod selection;
pub mod snapshot;
pub mod store;
pub mod traits;
pub mod types;

pub use error::{NormalizationError, SnapshotError};
pub use key::{EntityKey, KeyConfig};
pub use read::ReadResult;
pub use record::{FieldEntry, FieldValue, NormalizedRecord};
pub use selection::{Argument, Operation, OperationKind, Selection, SelectionField};
pub use snapshot::CacheSnapshot;
pub use store::{CacheStore, WriteReport};
pub use traits::{DataDependency, DataTree, QueryTransport};
pub use types::Value;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
