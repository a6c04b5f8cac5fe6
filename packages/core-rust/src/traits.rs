use async_trait::async_trait;

use crate::selection::Operation;
use crate::store::CacheStore;
use crate::types::Value;

/// One data dependency declared by a view-tree node during a discovery
/// walk.
#[derive(Debug, Clone)]
pub struct DataDependency {
    /// The operation that would satisfy the dependency.
    pub operation: Operation,
    /// Whether this dependency may be executed during a server-side fetch
    /// pass. Opted-out dependencies render in a pending state on the
    /// server and fetch on the client instead.
    pub server_eligible: bool,
}

impl DataDependency {
    /// Creates a server-eligible dependency.
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            server_eligible: true,
        }
    }

    /// Marks the dependency as not executable during server-side passes.
    #[must_use]
    pub fn client_only(mut self) -> Self {
        self.server_eligible = false;
        self
    }
}

/// Opaque query-execution capability (network transport or in-process
/// schema executor).
///
/// Given an operation and its variables, returns the raw hierarchical
/// result tree or an error. The coordinator treats failures as
/// per-descriptor outcomes, never as pass aborts.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    /// Executes one operation and returns its raw result.
    async fn execute(&self, operation: &Operation) -> anyhow::Result<Value>;
}

/// A walkable view tree with two invocation modes.
///
/// Discovery mode registers data dependencies against the current cache
/// state without producing output; final mode produces output assuming
/// the cache is complete. The split makes the tree walk's side effects
/// deterministic and testable without a live rendering engine.
pub trait DataTree: Send + Sync {
    /// Discovery mode: report the dependencies the tree declares given
    /// the store's current contents. Called repeatedly as the cache
    /// fills; newly satisfied data may reveal dependencies of previously
    /// gated subtrees.
    fn collect_dependencies(&self, store: &CacheStore) -> Vec<DataDependency>;

    /// Final mode: produce rendered output, assuming every dependency the
    /// last discovery walk reported is satisfied or deliberately pending.
    ///
    /// # Errors
    ///
    /// Implementations may fail on irrecoverable render errors.
    fn render(&self, store: &CacheStore) -> anyhow::Result<String>;
}
