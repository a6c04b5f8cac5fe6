//! Pending query descriptors and their identity.
//!
//! A descriptor wraps one declared data dependency for the duration of a
//! fetch pass. Its [`DescriptorKey`] -- operation kind, name, and
//! canonical variables -- defines *distinctness*: the pass executes each
//! distinct descriptor at most once, which is what bounds the
//! walk-until-stable loop even when a dependency perpetually fails and is
//! re-declared on every walk.

use std::fmt;

use graphcache_core::traits::DataDependency;
use graphcache_core::Operation;

/// Identity of a descriptor within one pass.
///
/// Two dependencies with the same operation kind, name, and variables are
/// the same descriptor, regardless of which tree node declared them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorKey(String);

impl DescriptorKey {
    /// Derives the key for an operation.
    ///
    /// Variables canonicalize through their sorted-key JSON form; an
    /// unencodable variable set (non-finite floats) falls back to the
    /// operation name alone, which only ever over-merges descriptors.
    #[must_use]
    pub fn for_operation(operation: &Operation) -> Self {
        let variables = serde_json::to_string(&operation.variables).unwrap_or_default();
        Self(format!(
            "{:?}:{}:{}",
            operation.kind, operation.name, variables
        ))
    }
}

impl fmt::Display for DescriptorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending query discovered during a tree walk.
///
/// Created when a view-tree node declares a data dependency during a
/// discovery walk; consumed once its result is merged or it is skipped.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    /// Distinctness key within the pass.
    pub key: DescriptorKey,
    /// The operation to execute.
    pub operation: Operation,
    /// Whether the descriptor may execute during a server-side pass.
    pub server_eligible: bool,
}

impl From<DataDependency> for QueryDescriptor {
    fn from(dependency: DataDependency) -> Self {
        Self {
            key: DescriptorKey::for_operation(&dependency.operation),
            operation: dependency.operation,
            server_eligible: dependency.server_eligible,
        }
    }
}

/// One recorded descriptor failure: execution or merge.
#[derive(Debug, Clone)]
pub struct DescriptorFailure {
    /// The failing descriptor's key.
    pub key: DescriptorKey,
    /// Human-readable failure description.
    pub error: String,
}
