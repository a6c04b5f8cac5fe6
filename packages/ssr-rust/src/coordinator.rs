//! The tree data-fetch coordinator.
//!
//! Orchestrates server-side data-fetching so that, by the time rendered
//! output is produced, the store contains everything the client's initial
//! render will read. The walk-until-stable algorithm is an iterative
//! fixed-point loop over an explicit descriptor queue:
//!
//! ```text
//! Idle -> Walking -> (new descriptors? -> Executing -> merge -> Walking)
//!                 -> (none            -> Done)
//! ```
//!
//! All descriptors discovered in one walk execute concurrently; the
//! iteration awaits every outcome before merging, and no descriptor of
//! iteration N+1 starts before iteration N's merges commit, since later
//! discovery depends on previously merged data. Results merge in
//! descriptor order, so the per-field last-writer is deterministic
//! regardless of which transport future completed first.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use graphcache_core::store::CacheStore;
use graphcache_core::traits::{DataTree, QueryTransport};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::descriptor::{DescriptorFailure, DescriptorKey, QueryDescriptor};
use crate::error::PassError;

/// Tuning knobs for one coordinator pass.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of executing iterations before the pass fails with
    /// [`PassError::IterationLimit`]. Guards against trees whose
    /// discovery never stabilizes.
    pub max_iterations: u32,
    /// Overall wall-clock budget for the pass. `None` means unbounded.
    pub deadline: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 32,
            deadline: None,
        }
    }
}

/// Phase of a coordinator pass.
///
/// `Done` is terminal; `Executing` only ever transitions back to
/// `Walking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// Pass not yet started.
    Idle,
    /// Discovery walk in progress.
    Walking,
    /// Dispatched descriptors are executing.
    Executing,
    /// The last walk discovered no new executable descriptors.
    Done,
}

/// Outcome of a successful pass.
///
/// A pass with recorded failures is still a success -- independent
/// subtrees resolved, and the caller decides whether to degrade the
/// failed views at render time.
#[derive(Debug)]
pub struct PassReport {
    /// Number of executing iterations (walks that found new work).
    pub iterations: u32,
    /// Total discovery walks, including the final stabilizing one.
    pub walks: u32,
    /// Descriptors dispatched to the transport.
    pub executed: usize,
    /// Descriptors skipped because they opted out of server execution.
    pub skipped: Vec<DescriptorKey>,
    /// Per-descriptor execution or merge failures.
    pub failures: Vec<DescriptorFailure>,
    /// Final state; always [`PassState::Done`] on a returned report.
    pub final_state: PassState,
}

/// Coordinates discovery walks and concurrent descriptor execution
/// against a request-scoped [`CacheStore`].
pub struct FetchCoordinator {
    transport: Arc<dyn QueryTransport>,
    config: CoordinatorConfig,
}

impl FetchCoordinator {
    /// Creates a coordinator with the default configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn QueryTransport>) -> Self {
        Self::with_config(transport, CoordinatorConfig::default())
    }

    /// Creates a coordinator with an explicit configuration.
    #[must_use]
    pub fn with_config(transport: Arc<dyn QueryTransport>, config: CoordinatorConfig) -> Self {
        Self { transport, config }
    }

    /// Runs one pass over `tree`, filling `store` until discovery
    /// stabilizes.
    ///
    /// The store is expected to be freshly constructed for this request;
    /// the coordinator never owns or shares one across passes.
    ///
    /// # Errors
    ///
    /// Returns [`PassError::IterationLimit`] or
    /// [`PassError::DeadlineExceeded`] when a non-termination guard
    /// trips. On either error the cache may be mid-fill and the caller
    /// must not render from it.
    pub async fn run(
        &self,
        tree: &dyn DataTree,
        store: &CacheStore,
    ) -> Result<PassReport, PassError> {
        let deadline_at = self.config.deadline.map(|d| Instant::now() + d);

        let mut state = PassState::Idle;
        let mut seen: HashSet<DescriptorKey> = HashSet::new();
        let mut skipped: Vec<DescriptorKey> = Vec::new();
        let mut failures: Vec<DescriptorFailure> = Vec::new();
        let mut iterations = 0u32;
        let mut walks = 0u32;
        let mut executed = 0usize;

        debug!(state = ?state, "starting fetch pass");

        loop {
            state = PassState::Walking;
            walks += 1;
            debug!(state = ?state, walk = walks, "collecting dependencies");
            self.check_deadline(deadline_at)?;

            let discovered = tree.collect_dependencies(store);
            let mut batch: Vec<QueryDescriptor> = Vec::new();
            for descriptor in discovered.into_iter().map(QueryDescriptor::from) {
                // Distinctness is per pass: a dependency re-declared on a
                // later walk (still-loading subtrees do that on every
                // walk) is not new work, and neither is a failed one --
                // that bound is what makes the loop terminate.
                if !seen.insert(descriptor.key.clone()) {
                    continue;
                }
                if descriptor.server_eligible {
                    batch.push(descriptor);
                } else {
                    debug!(key = %descriptor.key, "descriptor opted out of server execution");
                    skipped.push(descriptor.key);
                }
            }

            if batch.is_empty() {
                state = PassState::Done;
                break;
            }

            if iterations >= self.config.max_iterations {
                warn!(
                    limit = self.config.max_iterations,
                    "fetch pass did not stabilize within the iteration limit"
                );
                return Err(PassError::IterationLimit {
                    limit: self.config.max_iterations,
                });
            }

            state = PassState::Executing;
            iterations += 1;
            debug!(
                state = ?state,
                iteration = iterations,
                dispatched = batch.len(),
                "executing descriptors"
            );

            let results = self
                .execute_batch(&batch, deadline_at)
                .await?;

            // Merge in descriptor order: stable ordering makes the
            // per-field last-writer deterministic even though execution
            // completed in arbitrary order.
            for (descriptor, result) in batch.iter().zip(results) {
                executed += 1;
                match result {
                    Ok(data) => {
                        if let Err(err) = store.write(&data, &descriptor.operation) {
                            warn!(key = %descriptor.key, error = %err, "merge failed");
                            failures.push(DescriptorFailure {
                                key: descriptor.key.clone(),
                                error: err.to_string(),
                            });
                        }
                    }
                    Err(err) => {
                        warn!(key = %descriptor.key, error = %err, "descriptor execution failed");
                        failures.push(DescriptorFailure {
                            key: descriptor.key.clone(),
                            error: err.to_string(),
                        });
                    }
                }
            }
        }

        debug_assert_eq!(state, PassState::Done);
        debug!(
            iterations,
            walks,
            executed,
            failures = failures.len(),
            "fetch pass stabilized"
        );

        Ok(PassReport {
            iterations,
            walks,
            executed,
            skipped,
            failures,
            final_state: state,
        })
    }

    /// Dispatches one iteration's descriptors concurrently and awaits
    /// every outcome, bounded by the pass deadline.
    async fn execute_batch(
        &self,
        batch: &[QueryDescriptor],
        deadline_at: Option<Instant>,
    ) -> Result<Vec<anyhow::Result<graphcache_core::Value>>, PassError> {
        let futures = batch
            .iter()
            .map(|descriptor| self.transport.execute(&descriptor.operation));

        match deadline_at {
            Some(at) => tokio::time::timeout_at(at, join_all(futures))
                .await
                .map_err(|_| self.deadline_error()),
            None => Ok(join_all(futures).await),
        }
    }

    fn check_deadline(&self, deadline_at: Option<Instant>) -> Result<(), PassError> {
        match deadline_at {
            Some(at) if Instant::now() >= at => Err(self.deadline_error()),
            _ => Ok(()),
        }
    }

    fn deadline_error(&self) -> PassError {
        let deadline_ms = self
            .config
            .deadline
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        PassError::DeadlineExceeded { deadline_ms }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use graphcache_core::traits::DataDependency;
    use graphcache_core::{Operation, Selection, SelectionField, Value};
    use parking_lot::Mutex;

    use super::*;

    // ---- Test doubles ----

    /// Transport serving canned responses by operation name.
    struct StaticTransport {
        responses: HashMap<String, Value>,
        failing: HashSet<String>,
        delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
    }

    impl StaticTransport {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                failing: HashSet::new(),
                delay: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn respond(mut self, name: &str, data: serde_json::Value) -> Self {
            self.responses.insert(name.to_string(), Value::from(data));
            self
        }

        fn fail(mut self, name: &str) -> Self {
            self.failing.insert(name.to_string());
            self
        }

        fn delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl QueryTransport for StaticTransport {
        async fn execute(&self, operation: &Operation) -> anyhow::Result<Value> {
            self.calls.lock().push(operation.name.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.contains(&operation.name) {
                anyhow::bail!("transport unreachable");
            }
            self.responses
                .get(&operation.name)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no canned response for {}", operation.name))
        }
    }

    fn item_operation(name: &str, field: &str) -> Operation {
        Operation::query(
            name,
            Selection::new(vec![SelectionField::new(field).select(vec![
                SelectionField::new("id"),
                SelectionField::new("name"),
            ])]),
        )
    }

    fn item_response(field: &str, id: &str, name: &str) -> serde_json::Value {
        serde_json::json!({
            field: { "__typename": "Item", "id": id, "name": name }
        })
    }

    /// Tree with no data dependencies at all.
    struct EmptyTree;

    impl DataTree for EmptyTree {
        fn collect_dependencies(&self, _store: &CacheStore) -> Vec<DataDependency> {
            Vec::new()
        }

        fn render(&self, _store: &CacheStore) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    /// Tree where B's dependency is gated on A's data being present,
    /// mimicking conditional rendering on loading state.
    struct TwoPhaseTree;

    impl TwoPhaseTree {
        fn op_a() -> Operation {
            item_operation("GetA", "a")
        }

        fn op_b() -> Operation {
            item_operation("GetB", "b")
        }
    }

    impl DataTree for TwoPhaseTree {
        fn collect_dependencies(&self, store: &CacheStore) -> Vec<DataDependency> {
            let mut deps = vec![DataDependency::new(Self::op_a())];
            if store.read(&Self::op_a()).is_complete() {
                deps.push(DataDependency::new(Self::op_b()));
            }
            deps
        }

        fn render(&self, _store: &CacheStore) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    /// Tree declaring one eligible and one opted-out dependency.
    struct OptOutTree;

    impl DataTree for OptOutTree {
        fn collect_dependencies(&self, _store: &CacheStore) -> Vec<DataDependency> {
            vec![
                DataDependency::new(item_operation("GetA", "a")),
                DataDependency::new(item_operation("GetClientOnly", "c")).client_only(),
            ]
        }

        fn render(&self, _store: &CacheStore) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    /// Tree declaring two independent sibling dependencies.
    struct SiblingTree;

    impl DataTree for SiblingTree {
        fn collect_dependencies(&self, _store: &CacheStore) -> Vec<DataDependency> {
            vec![
                DataDependency::new(item_operation("GetA", "a")),
                DataDependency::new(item_operation("GetB", "b")),
            ]
        }

        fn render(&self, _store: &CacheStore) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    /// Pathological tree producing a fresh distinct descriptor per walk.
    struct EndlessTree {
        walk: AtomicU32,
    }

    impl DataTree for EndlessTree {
        fn collect_dependencies(&self, _store: &CacheStore) -> Vec<DataDependency> {
            let n = self.walk.fetch_add(1, Ordering::SeqCst);
            let operation = Operation::query(
                "Gen",
                Selection::new(vec![SelectionField::new("x")]),
            )
            .var("n", i64::from(n));
            vec![DataDependency::new(operation)]
        }

        fn render(&self, _store: &CacheStore) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    // ---- Termination ----

    #[tokio::test]
    async fn zero_dependency_tree_terminates_after_one_walk() {
        let transport = Arc::new(StaticTransport::new());
        let coordinator = FetchCoordinator::new(transport.clone());
        let store = CacheStore::new();

        let report = coordinator.run(&EmptyTree, &store).await.expect("pass");

        assert_eq!(report.walks, 1);
        assert_eq!(report.iterations, 0);
        assert_eq!(report.executed, 0);
        assert_eq!(report.final_state, PassState::Done);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn gated_dependency_resolves_in_two_iterations() {
        let transport = Arc::new(
            StaticTransport::new()
                .respond("GetA", item_response("a", "a1", "Alpha"))
                .respond("GetB", item_response("b", "b1", "Beta")),
        );
        let coordinator = FetchCoordinator::new(transport.clone());
        let store = CacheStore::new();

        let report = coordinator.run(&TwoPhaseTree, &store).await.expect("pass");

        assert_eq!(report.iterations, 2);
        assert_eq!(report.walks, 3);
        assert_eq!(report.executed, 2);
        assert!(report.failures.is_empty());
        // A was declared on every walk but dispatched exactly once.
        assert_eq!(transport.calls(), vec!["GetA", "GetB"]);
        assert!(store.read(&TwoPhaseTree::op_a()).is_complete());
        assert!(store.read(&TwoPhaseTree::op_b()).is_complete());
    }

    #[tokio::test]
    async fn opted_out_descriptor_is_never_dispatched() {
        let transport = Arc::new(
            StaticTransport::new().respond("GetA", item_response("a", "a1", "Alpha")),
        );
        let coordinator = FetchCoordinator::new(transport.clone());
        let store = CacheStore::new();

        let report = coordinator.run(&OptOutTree, &store).await.expect("pass");

        assert_eq!(report.final_state, PassState::Done);
        assert_eq!(report.executed, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(transport.calls(), vec!["GetA"]);
    }

    #[tokio::test]
    async fn failing_descriptor_does_not_block_siblings() {
        let transport = Arc::new(
            StaticTransport::new()
                .fail("GetA")
                .respond("GetB", item_response("b", "b1", "Beta")),
        );
        let coordinator = FetchCoordinator::new(transport);
        let store = CacheStore::new();

        let report = coordinator.run(&SiblingTree, &store).await.expect("pass");

        assert_eq!(report.final_state, PassState::Done);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.contains("transport unreachable"));
        // The sibling's data still merged.
        assert!(store
            .read(&item_operation("GetB", "b"))
            .is_complete());
        // The failing descriptor was re-declared on the second walk but
        // not re-dispatched, so the pass still stabilized.
        assert_eq!(report.iterations, 1);
    }

    #[tokio::test]
    async fn merge_failure_is_recorded_per_descriptor() {
        // GetA returns an entity whose id is an object: normalization
        // rejects it, and the failure is recorded without aborting.
        let transport = Arc::new(
            StaticTransport::new()
                .respond(
                    "GetA",
                    serde_json::json!({ "a": { "__typename": "Item", "id": { "bad": true } } }),
                )
                .respond("GetB", item_response("b", "b1", "Beta")),
        );
        let coordinator = FetchCoordinator::new(transport);
        let store = CacheStore::new();

        let report = coordinator.run(&SiblingTree, &store).await.expect("pass");

        assert_eq!(report.failures.len(), 1);
        assert!(store.read(&item_operation("GetB", "b")).is_complete());
    }

    // ---- Non-termination guards ----

    #[tokio::test]
    async fn iteration_limit_is_fatal() {
        let transport = Arc::new(
            StaticTransport::new().respond("Gen", serde_json::json!({ "x": 1 })),
        );
        let coordinator = FetchCoordinator::with_config(
            transport,
            CoordinatorConfig {
                max_iterations: 3,
                deadline: None,
            },
        );
        let store = CacheStore::new();
        let tree = EndlessTree {
            walk: AtomicU32::new(0),
        };

        let err = coordinator.run(&tree, &store).await.expect_err("fatal");
        assert!(matches!(err, PassError::IterationLimit { limit: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_is_fatal() {
        let transport = Arc::new(
            StaticTransport::new()
                .respond("GetA", item_response("a", "a1", "Alpha"))
                .respond("GetB", item_response("b", "b1", "Beta"))
                .delay(Duration::from_millis(50)),
        );
        let coordinator = FetchCoordinator::with_config(
            transport,
            CoordinatorConfig {
                max_iterations: 32,
                deadline: Some(Duration::from_millis(10)),
            },
        );
        let store = CacheStore::new();

        let err = coordinator.run(&SiblingTree, &store).await.expect_err("fatal");
        assert!(matches!(err, PassError::DeadlineExceeded { deadline_ms: 10 }));
    }

    // ---- End-to-end ----

    #[tokio::test]
    async fn resolved_pass_supports_render_and_rehydration() {
        let transport = Arc::new(
            StaticTransport::new()
                .respond("GetA", item_response("a", "a1", "Alpha"))
                .respond("GetB", item_response("b", "b1", "Beta")),
        );
        let coordinator = FetchCoordinator::new(transport);
        let store = CacheStore::new();

        coordinator.run(&TwoPhaseTree, &store).await.expect("pass");
        TwoPhaseTree.render(&store).expect("render");

        // Caller renders separately, then ships the snapshot to a fresh
        // client-side store; both dependencies read complete there with
        // no further fetching.
        let encoded = store.extract().to_embeddable_json().expect("encode");
        let client = CacheStore::new();
        client.restore(
            graphcache_core::CacheSnapshot::from_embeddable_json(&encoded).expect("decode"),
        );
        assert!(client.read(&TwoPhaseTree::op_a()).is_complete());
        assert!(client.read(&TwoPhaseTree::op_b()).is_complete());
    }
}
