use super::{ExprId, LoopKind, NaryOp, StmtId};

/// Constructs and owns statement and expression nodes on behalf of the
/// structurizer. This is the "AST context" external collaborator from
/// SPEC_FULL.md section 1: the structurizer never inspects a `Stmt` or
/// `Expr` directly, it only calls these constructors (and `is_sequence`,
/// the single type-test it needs to decide whether a block's existing body
/// must be wrapped before more statements can be appended to it).
///
/// `Block` is the type the lifting front-end uses to represent a basic
/// block's already-lifted body; the structurizer treats it as opaque and
/// only ever moves it around via `Cfg::create_block`.
/// `Leaf` is the front-end's representation of an atomic (non-synthesized)
/// branch condition; `Var` is an opaque selector-variable handle minted by
/// `mk_fresh_var` and tested with `equals`.
pub trait AstContext {
    type Block;
    type Leaf: Clone;
    type Var: Clone;

    /// Mints a fresh selector variable for funneling abnormal entries/exits
    /// through a redirector block.
    fn mk_fresh_var(&mut self) -> Self::Var;

    /// Builds the statement `var := val`.
    fn mk_var_assign(&mut self, var: &Self::Var, val: u64) -> StmtId;

    /// The `true` literal.
    fn expr_true(&mut self) -> ExprId;

    /// Wraps a front-end-supplied atomic condition as an expression.
    fn leaf(&mut self, cond: Self::Leaf) -> ExprId;

    /// Builds `var == val`, used for redirector dispatch.
    fn equals(&mut self, var: &Self::Var, val: u64) -> ExprId;

    /// Short-circuit AND/OR of two already-built expressions.
    fn nary(&mut self, op: NaryOp, lhs: ExprId, rhs: ExprId) -> ExprId;

    /// An empty, appendable `Sequence`.
    fn sequence(&mut self) -> StmtId;

    /// Appends `stmt` to the end of `seq`. `seq` must be a `Sequence`
    /// (i.e. `is_sequence(seq)` must hold).
    fn append(&mut self, seq: StmtId, stmt: StmtId);

    /// Type-test: is `stmt` a `Sequence`? The structurizer uses this to
    /// decide whether a block's existing body can be appended to directly
    /// or must first be wrapped in a fresh one-element `Sequence`.
    fn is_sequence(&self, stmt: StmtId) -> bool;

    /// `if (cond) { then_branch }`, with no else branch. The structurizer
    /// never needs an explicit else: mutually exclusive reaching conditions
    /// are expressed as separate `IfElse` statements in sequence.
    fn if_else(&mut self, cond: ExprId, then_branch: StmtId) -> StmtId;

    /// `loop { body }` of the given shape and loop condition.
    fn loop_stmt(&mut self, cond: ExprId, kind: LoopKind, body: StmtId) -> StmtId;

    /// `if (cond) break;` (unconditional when `cond` is the `true` literal).
    fn break_stmt(&mut self, cond: ExprId) -> StmtId;

    /// Wraps a front-end-supplied lifted block body as a statement.
    fn block_stmt(&mut self, block: Self::Block) -> StmtId;
}
