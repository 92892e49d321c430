//! Structures an unstructured control-flow graph into a tree of sequences,
//! conditionals and loops, free of `goto`.
//!
//! The crate is organized into the pipeline SPEC_FULL.md's function driver
//! runs in order:
//!
//! - [`cfg`] - the pre-AST control-flow graph: blocks, condition-labelled
//!   edges, arena-stable ids.
//! - [`sese`] - the SESE Normalizer, which inserts redirector blocks so every
//!   cycle has a single entry and exit.
//! - [`region`] - the Region Analyzer: dominator/post-dominator trees,
//!   dominance frontier, and the tree of natural-loop regions.
//! - [`structurizer`] - the Structurizer itself: bottom-up region reduction
//!   plus reaching-condition folding of the remaining acyclic range.
//! - [`driver`] - ties the above together into `structurize_function`, plus
//!   the module driver's function-ordering contract.
//!
//! [`ast`] defines the output side: the opaque `AstContext` trait the
//! structurizer builds statements and expressions through, and the
//! `ArenaAstContext` reference implementation.

pub mod ast;
pub mod cfg;
pub mod config;
pub mod driver;
pub mod error;
pub mod region;
pub mod sese;
pub mod structurizer;

pub use ast::{AstContext, ExprId, LoopKind, NaryOp, StmtId};
pub use cfg::{BlockId, Cfg, EdgeId};
pub use config::StructurizerConfig;
pub use driver::{order_functions, structurize_function};
pub use error::StructurizerError;
pub use region::{Region, RegionAnalysis};
