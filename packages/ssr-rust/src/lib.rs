//! Graphcache SSR — the tree data-fetch coordinator.
//!
//! Walks a view tree in discovery mode, executes the data dependencies it
//! declares, merges each result into a request-scoped
//! [`CacheStore`](graphcache_core::CacheStore), and repeats until a walk
//! discovers no new executable descriptors. Once stable, the caller
//! performs the final render pass and serializes the store for
//! client-side rehydration.

pub mod coordinator;
pub mod descriptor;
pub mod error;

pub use coordinator::{CoordinatorConfig, FetchCoordinator, PassReport, PassState};
pub use descriptor::{DescriptorFailure, DescriptorKey, QueryDescriptor};
pub use error::PassError;
