//! Fatal pass errors.
//!
//! Per-descriptor execution failures are NOT errors at this level; they
//! are recorded in the pass report and the pass continues. The variants
//! here are the non-termination guards: on either one the caller must
//! not render, because the tree may be observing an inconsistent cache.

/// Fatal failure of a coordinator pass.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// The walk/execute loop exceeded the configured iteration cap
    /// without stabilizing.
    #[error("fetch pass exceeded iteration limit of {limit}")]
    IterationLimit {
        /// The configured cap.
        limit: u32,
    },

    /// The caller-supplied deadline elapsed before the pass stabilized.
    #[error("fetch pass exceeded deadline of {deadline_ms}ms")]
    DeadlineExceeded {
        /// The configured deadline in milliseconds.
        deadline_ms: u64,
    },
}
