//! Reference [`AstContext`] implementation: an arena that owns every
//! statement and expression node by value, referencing each other through
//! stable `StmtId`/`ExprId` indices. This follows the same arena-with-stable-
//! indices discipline SPEC_FULL.md's Design Notes call for on the CFG side,
//! and the compact id-newtype convention this codebase already uses (see
//! `BlockId`/`EdgeId` in the `cfg` module).
//!
//! `ArenaAstContext` is generic over the front end's block-body type
//! (`B`), atomic leaf-condition type (`L`) and selector-variable type (`V`)
//! so it can serve both real front ends and the small string-based harness
//! used in this crate's own tests. `V` must be constructible from a `u64`
//! counter (`mk_fresh_var` mints one per redirector) - for front ends whose
//! real variable handles come from elsewhere, wrap them behind a small
//! newtype with a trivial `From<u64>` impl.

use super::{AstContext, ExprId, LoopKind, NaryOp, StmtId};

/// A statement node, as owned by an [`ArenaAstContext`].
#[derive(Debug, Clone)]
pub enum Stmt<B, V> {
    Sequence(Vec<StmtId>),
    IfElse { cond: ExprId, then_branch: StmtId },
    Loop {
        cond: ExprId,
        kind: LoopKind,
        body: StmtId,
    },
    Break { cond: ExprId },
    /// `var := val`, synthesized by the SESE normalizer for redirector
    /// dispatch - never produced by a lifting front end.
    Assign { var: V, val: u64 },
    /// A front-end-supplied lifted block body, opaque to the structurizer.
    Block(B),
}

/// An expression node, as owned by an [`ArenaAstContext`].
#[derive(Debug, Clone)]
pub enum Expr<L, V> {
    True,
    Nary(NaryOp, ExprId, ExprId),
    Equals(V, u64),
    Leaf(L),
}

/// Arena-backed `AstContext`.
pub struct ArenaAstContext<B, L, V> {
    stmts: Vec<Stmt<B, V>>,
    exprs: Vec<Expr<L, V>>,
    next_var: u64,
}

impl<B, L, V> Default for ArenaAstContext<B, L, V> {
    fn default() -> Self {
        ArenaAstContext {
            stmts: Vec::new(),
            exprs: Vec::new(),
            next_var: 0,
        }
    }
}

impl<B, L, V> ArenaAstContext<B, L, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_stmt(&mut self, stmt: Stmt<B, V>) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    fn push_expr(&mut self, expr: Expr<L, V>) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    /// Reads back a previously constructed statement. Not part of
    /// `AstContext`: the structurizer never needs this, but tests and
    /// pretty-printers do.
    pub fn stmt(&self, id: StmtId) -> &Stmt<B, V> {
        &self.stmts[id.0 as usize]
    }

    /// Reads back a previously constructed expression.
    pub fn expr(&self, id: ExprId) -> &Expr<L, V> {
        &self.exprs[id.0 as usize]
    }
}

impl<B, L, V> AstContext for ArenaAstContext<B, L, V>
where
    L: Clone,
    V: Clone + From<u64>,
{
    type Block = B;
    type Leaf = L;
    type Var = V;

    fn mk_fresh_var(&mut self) -> Self::Var {
        let id = self.next_var;
        self.next_var += 1;
        V::from(id)
    }

    fn mk_var_assign(&mut self, var: &Self::Var, val: u64) -> StmtId {
        self.push_stmt(Stmt::Assign {
            var: var.clone(),
            val,
        })
    }

    fn expr_true(&mut self) -> ExprId {
        self.push_expr(Expr::True)
    }

    fn leaf(&mut self, cond: Self::Leaf) -> ExprId {
        self.push_expr(Expr::Leaf(cond))
    }

    fn equals(&mut self, var: &Self::Var, val: u64) -> ExprId {
        self.push_expr(Expr::Equals(var.clone(), val))
    }

    fn nary(&mut self, op: NaryOp, lhs: ExprId, rhs: ExprId) -> ExprId {
        self.push_expr(Expr::Nary(op, lhs, rhs))
    }

    fn sequence(&mut self) -> StmtId {
        self.push_stmt(Stmt::Sequence(Vec::new()))
    }

    fn append(&mut self, seq: StmtId, stmt: StmtId) {
        match &mut self.stmts[seq.0 as usize] {
            Stmt::Sequence(items) => items.push(stmt),
            _ => panic!("append called on a non-sequence statement {:?}", seq),
        }
    }

    fn is_sequence(&self, stmt: StmtId) -> bool {
        matches!(self.stmts[stmt.0 as usize], Stmt::Sequence(_))
    }

    fn if_else(&mut self, cond: ExprId, then_branch: StmtId) -> StmtId {
        self.push_stmt(Stmt::IfElse { cond, then_branch })
    }

    fn loop_stmt(&mut self, cond: ExprId, kind: LoopKind, body: StmtId) -> StmtId {
        self.push_stmt(Stmt::Loop { cond, kind, body })
    }

    fn break_stmt(&mut self, cond: ExprId) -> StmtId {
        self.push_stmt(Stmt::Break { cond })
    }

    fn block_stmt(&mut self, block: Self::Block) -> StmtId {
        self.push_stmt(Stmt::Block(block))
    }
}
