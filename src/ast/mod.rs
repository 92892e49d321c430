//! Statement and expression trees produced by the structurizer.
//!
//! Everything in this module is deliberately opaque from the structurizer's
//! point of view: it only ever calls the constructors on [`AstContext`] and,
//! for one case, the `is_sequence` type-test. The concrete representation
//! (what a `StmtId` or `ExprId` actually points at) is owned entirely by
//! whichever `AstContext` implementation is in use - [`arena::ArenaAstContext`]
//! is the reference implementation shipped with this crate.

mod context;
mod ids;

pub mod arena;

pub use context::AstContext;
pub use ids::{ExprId, StmtId};

/// Boolean combinator used by [`AstContext::nary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum NaryOp {
    And,
    Or,
}

/// Normalizes `*stmt` to a sequence container (wrapping the existing
/// statement if it isn't one, creating an empty one if absent) and returns
/// its id. Shared by the SESE normalizer (appending a selector assignment)
/// and the structurizer's folding step (appending a block's `IfElse`/`Break`
/// wrapper) - see SPEC_FULL.md section 4.3.3's "normalize to a sequence
/// container" step.
pub(crate) fn ensure_sequence<C: AstContext>(ctx: &mut C, stmt: &mut Option<StmtId>) -> StmtId {
    let seq = match *stmt {
        None => ctx.sequence(),
        Some(s) if ctx.is_sequence(s) => s,
        Some(s) => {
            let wrapped = ctx.sequence();
            ctx.append(wrapped, s);
            wrapped
        }
    };
    *stmt = Some(seq);
    seq
}

/// Loop shape attached to a `Loop` statement. The structurizer only ever
/// constructs `PreTested` loops with a `true` condition (see SPEC_FULL.md
/// section 4.3.3); the other variants exist so an `AstContext` can also be
/// used to represent loops recovered by some other means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LoopKind {
    PreTested,
    PostChecked,
    Endless,
}
