//! Error types for the structurizer.
//!
//! Mirrors the error-handling style used throughout this codebase: a single
//! `thiserror`-derived enum with one variant per reportable, non-recoverable
//! condition. Conditions that indicate a bug in this crate rather than a
//! malformed caller-supplied CFG are asserted with `debug_assert!` instead of
//! going through this type; see section 7 of SPEC_FULL.md for the split.

use thiserror::Error;

use crate::cfg::{BlockId, EdgeId};

/// Errors produced while structuring a control-flow graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructurizerError {
    /// A child region's entry or exit block could not be located in the
    /// post-order range its parent region is currently reducing.
    #[error("region boundary block {block:?} not found in post-order range starting at {begin:?} (end {end:?})")]
    RegionBoundaryNotFound {
        block: BlockId,
        begin: BlockId,
        end: Option<BlockId>,
    },

    /// An edge was present in one endpoint's adjacency list but absent from
    /// the other's.
    #[error("edge {edge:?} is inconsistent: present in one endpoint's adjacency but not the other's")]
    InconsistentAdjacency { edge: EdgeId },

    /// The function has no block reachable from the entry that can serve as
    /// the final exit, so the top-level fold would produce an infinite loop.
    #[error("function has no reachable exit from the entry block")]
    NoReachableExit,

    /// A strongly connected component exceeded `StructurizerConfig::max_scc_size`.
    #[error("strongly connected component of size {size} exceeds configured limit {limit}")]
    SccTooLarge { size: usize, limit: usize },
}
