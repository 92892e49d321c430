//! Structurizer: walks the region tree bottom-up, reducing each region to a
//! single statement and folding the remaining flat block range with reaching
//! conditions. See SPEC_FULL.md section 4.3.
//!
//! Only the loop regions found by the region analyzer get an explicit
//! reduction step; an acyclic branch is never wrapped in its own `Region` -
//! it falls straight out of [`fold_basic_blocks`]'s reaching-condition
//! bookkeeping over a flat range, the same way this produces `Sequence[A;
//! IfElse(p, B); IfElse(not p, C); D]` for a plain diamond with no region
//! nesting at all.

use std::collections::{HashMap, HashSet};

use log::trace;

use crate::ast::{ensure_sequence, AstContext, ExprId, LoopKind, NaryOp, StmtId};
use crate::cfg::{BlockId, Cfg, EdgeId};
use crate::error::StructurizerError;
use crate::region::Region;

/// An intrusive doubly-linked list over block ids. Supports O(1) splicing of
/// a reduced range into a single synthetic block without invalidating a
/// `BlockId` recorded by a region reduction further out - see SPEC_FULL.md's
/// Design Notes on mutable lists reordered during iteration.
struct PostOrder {
    next: HashMap<BlockId, Option<BlockId>>,
    prev: HashMap<BlockId, Option<BlockId>>,
}

impl PostOrder {
    fn from_order(order: Vec<BlockId>) -> Self {
        let mut next = HashMap::new();
        let mut prev = HashMap::new();
        for (i, &b) in order.iter().enumerate() {
            next.insert(b, order.get(i + 1).copied());
            prev.insert(b, if i == 0 { None } else { Some(order[i - 1]) });
        }
        PostOrder { next, prev }
    }

    /// Collects the range `[begin, end)` (or `[begin, ..]` if `end` is `None`)
    /// in list order.
    fn collect_range(&self, begin: BlockId, end: Option<BlockId>) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut cur = Some(begin);
        while let Some(b) = cur {
            if Some(b) == end {
                break;
            }
            out.push(b);
            cur = self.next.get(&b).copied().flatten();
        }
        out
    }

    /// Confirms that, walking forward from `begin`, `entry` is reached
    /// before `end`, and `exit` is reached at or before `end` once past
    /// `entry`. Returns `false` if either search runs off the list or past
    /// `end` without finding its target.
    fn find_boundaries(&self, begin: BlockId, end: Option<BlockId>, entry: BlockId, exit: BlockId) -> bool {
        let mut cur = begin;
        loop {
            if cur == entry {
                break;
            }
            if Some(cur) == end {
                return false;
            }
            cur = match self.next.get(&cur).copied().flatten() {
                Some(n) => n,
                None => return false,
            };
        }
        loop {
            if cur == exit {
                return true;
            }
            if Some(cur) == end {
                return false;
            }
            cur = match self.next.get(&cur).copied().flatten() {
                Some(n) => n,
                None => return false,
            };
        }
    }

    /// Replaces `[first, last_exclusive)` with the single node `replacement`.
    /// `last_exclusive` keeps its place; `replacement` takes the place of
    /// `first` in the surrounding links.
    fn replace_range(&mut self, first: BlockId, last_exclusive: BlockId, replacement: BlockId) {
        let left = self.prev.get(&first).copied().flatten();
        if let Some(l) = left {
            self.next.insert(l, Some(replacement));
        }
        self.prev.insert(replacement, left);
        self.next.insert(replacement, Some(last_exclusive));
        self.prev.insert(last_exclusive, Some(replacement));
    }
}

/// Reverse-postorder from the function entry: the entry comes first, so the
/// fold below processes a loop header before the blocks whose reaching
/// conditions depend on it, and a back-edge into the header is naturally
/// still unprocessed (see `fold_basic_blocks`'s reach-condition loop).
pub(crate) fn initial_order(cfg: &Cfg) -> Vec<BlockId> {
    let n = cfg.block_count();
    let mut visited = vec![false; n];
    let mut postorder: Vec<BlockId> = Vec::new();
    let mut stack: Vec<(BlockId, usize, Vec<BlockId>)> = Vec::new();
    let entry = cfg.entry();

    let succs_of = |cfg: &Cfg, b: BlockId| -> Vec<BlockId> {
        cfg.block(b).succs.iter().map(|&e| cfg.edge(e).to).collect()
    };

    visited[entry.0 as usize] = true;
    stack.push((entry, 0, succs_of(cfg, entry)));
    while !stack.is_empty() {
        let top = stack.len() - 1;
        if stack[top].1 < stack[top].2.len() {
            let w = stack[top].2[stack[top].1];
            stack[top].1 += 1;
            if !visited[w.0 as usize] {
                visited[w.0 as usize] = true;
                let wc = succs_of(cfg, w);
                stack.push((w, 0, wc));
            }
        } else {
            let (node, _, _) = stack.pop().unwrap();
            postorder.push(node);
        }
    }
    postorder.reverse();
    postorder
}

/// Entry point: reduces `root` over `cfg`, consuming both, and returns the
/// single statement denoting the whole function body.
pub fn structurize<C: AstContext>(
    cfg: &mut Cfg,
    ctx: &mut C,
    root: Region,
) -> Result<StmtId, StructurizerError> {
    let order = initial_order(cfg);
    let mut post = PostOrder::from_order(order);
    let begin = cfg.entry();
    reduce_region(cfg, ctx, &mut post, root, begin, None)
}

fn reduce_region<C: AstContext>(
    cfg: &mut Cfg,
    ctx: &mut C,
    post: &mut PostOrder,
    mut region: Region,
    mut begin: BlockId,
    end: Option<BlockId>,
) -> Result<StmtId, StructurizerError> {
    while let Some(child_entry) = region.children.first().map(|c| c.entry) {
        let child = region.remove_sub_region(child_entry);
        let entry = child.entry;
        let exit = child
            .exit
            .expect("non-root region produced by the region analyzer always has a concrete exit");

        if !post.find_boundaries(begin, end, entry, exit) {
            return Err(StructurizerError::RegionBoundaryNotFound {
                block: entry,
                begin,
                end,
            });
        }

        trace!("reducing child region entry={:?} exit={:?}", entry, exit);
        let child_members = child.members().clone();
        let child_stmt = reduce_region(cfg, ctx, post, child, entry, Some(exit))?;

        let n = cfg.create_block();
        cfg.block_mut(n).statement = Some(child_stmt);

        let was_begin = entry == begin;
        post.replace_range(entry, exit, n);
        if was_begin {
            begin = n;
        }

        let preds_of_entry: Vec<EdgeId> = cfg.block(entry).preds.iter().copied().collect();
        for e in preds_of_entry {
            cfg.retarget_edge_to(e, n);
        }
        cfg.block_mut(entry).preds.clear();

        let exit_preds: Vec<EdgeId> = cfg.block(exit).preds.iter().copied().collect();
        for e in exit_preds {
            if child_members[cfg.edge(e).from.0 as usize] {
                cfg.remove_edge(e);
            }
        }

        let true_cond = ctx.expr_true();
        cfg.create_edge(n, exit, true_cond);
    }

    fold_basic_blocks(cfg, ctx, post, begin, end)
}

/// Folds a flat, already-region-free block range into one statement using
/// reaching conditions (SPEC_FULL.md section 4.3.3).
fn fold_basic_blocks<C: AstContext>(
    cfg: &mut Cfg,
    ctx: &mut C,
    post: &PostOrder,
    begin: BlockId,
    end: Option<BlockId>,
) -> Result<StmtId, StructurizerError> {
    let members = post.collect_range(begin, end);
    let member_set: HashSet<BlockId> = members.iter().copied().collect();

    let out = ctx.sequence();
    // `None` means "this block's reaching condition is the `true` literal" -
    // tracked on the Rust side rather than materialized as an expression, so
    // the `true AND x == x` / `true OR x == true` identities fall out of the
    // match arms below instead of needing an `is_true` query on `AstContext`.
    let mut reach: HashMap<BlockId, Option<ExprId>> = HashMap::new();
    let mut is_loop = false;

    for &b in &members {
        // A flat range handed to this function never contains a nested
        // region any more (those were already reduced to a single synthetic
        // block); the only back-edge it can still contain is one that
        // targets the range's own header, i.e. a loop whose region-analysis
        // pass identified `begin` itself as the loop header. A successor
        // landing on some other member is just a forward branch (S1's
        // diamond has plenty of those and is not a loop).
        for &e in &cfg.block(b).succs {
            if cfg.edge(e).to == begin {
                is_loop = true;
            }
        }

        let preds: Vec<EdgeId> = cfg.block(b).preds.iter().copied().collect();
        let mut acc: Option<Option<ExprId>> = None;
        for p_edge in preds {
            let edge = *cfg.edge(p_edge);
            let contribution: Option<ExprId> = match reach.get(&edge.from).copied() {
                None => None,
                Some(None) => Some(edge.condition),
                Some(Some(parent_expr)) => Some(ctx.nary(NaryOp::And, parent_expr, edge.condition)),
            };
            acc = Some(match (acc, contribution) {
                (None, c) => c,
                (Some(None), _) => None,
                (Some(Some(_)), None) => None,
                (Some(Some(prev)), Some(c)) => Some(ctx.nary(NaryOp::Or, prev, c)),
            });
        }
        let reach_cond: Option<ExprId> = acc.unwrap_or(None);

        let mut stmt = cfg.block(b).statement;
        let seq = ensure_sequence(ctx, &mut stmt);
        cfg.block_mut(b).statement = stmt;

        let appended = match reach_cond {
            None => seq,
            Some(cond) => ctx.if_else(cond, seq),
        };
        ctx.append(out, appended);

        reach.insert(b, reach_cond);
    }

    if is_loop {
        match end {
            Some(sentinel) => {
                let sentinel_preds: Vec<EdgeId> = cfg.block(sentinel).preds.iter().copied().collect();
                for e in sentinel_preds {
                    let edge = *cfg.edge(e);
                    if member_set.contains(&edge.from) {
                        let brk = ctx.break_stmt(edge.condition);
                        let mut src_stmt = cfg.block(edge.from).statement;
                        let seq = ensure_sequence(ctx, &mut src_stmt);
                        ctx.append(seq, brk);
                        cfg.block_mut(edge.from).statement = src_stmt;
                    }
                }
                let true_cond = ctx.expr_true();
                return Ok(ctx.loop_stmt(true_cond, LoopKind::PreTested, out));
            }
            None => {
                // The whole-function range forming a cycle means the
                // function never returns; the driver is responsible for
                // reporting this as `StructurizerError::NoReachableExit`
                // before structurizing ever reaches this point.
                debug_assert!(
                    false,
                    "top-level block range formed a cycle; driver should have rejected this function"
                );
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::arena::{ArenaAstContext, Expr, Stmt};
    use crate::ast::NaryOp as Op;
    use crate::cfg::Cfg;
    use crate::config::StructurizerConfig;
    use crate::region::analyze;
    use crate::sese;

    type TestCtx = ArenaAstContext<&'static str, &'static str, u64>;

    fn run(cfg: &mut Cfg, ctx: &mut TestCtx) -> StmtId {
        let config = StructurizerConfig::default();
        sese::normalize(cfg, ctx, &config).expect("normalize");
        let analysis = analyze(cfg);
        structurize(cfg, ctx, analysis.root).expect("structurize")
    }

    /// S1 - single diamond: `A,B,C,D`; `A->B[p]`, `A->C[!p]`, `B->D[true]`,
    /// `C->D[true]`. Expected: `Sequence[A; IfElse(!p,C); IfElse(p,B);
    /// IfElse((p AND true) OR (!p AND true), D)]` - the fold visits blocks in
    /// reverse-post-order, not creation order, and `D` has two predecessors
    /// so its reaching condition is a real disjunction, not a bare edge
    /// condition.
    #[test]
    fn s1_single_diamond() {
        let (mut cfg, a) = Cfg::new();
        let mut ctx: TestCtx = ArenaAstContext::new();
        let b = cfg.create_block();
        let c = cfg.create_block();
        let d = cfg.create_block();
        cfg.block_mut(a).statement = Some(ctx.block_stmt("A"));
        cfg.block_mut(b).statement = Some(ctx.block_stmt("B"));
        cfg.block_mut(c).statement = Some(ctx.block_stmt("C"));
        cfg.block_mut(d).statement = Some(ctx.block_stmt("D"));

        let p = ctx.leaf("p");
        let not_p = ctx.leaf("!p");
        let t = ctx.expr_true();
        cfg.create_edge(a, b, p);
        cfg.create_edge(a, c, not_p);
        cfg.create_edge(b, d, t);
        cfg.create_edge(c, d, t);

        let root = run(&mut cfg, &mut ctx);
        let items = match ctx.stmt(root) {
            Stmt::Sequence(items) => items.clone(),
            other => panic!("expected a top-level sequence, got {:?}", other),
        };
        assert_eq!(items.len(), 4);

        // A has no reaching condition of its own (it's the entry): its
        // wrapper sequence is appended bare, with no `IfElse` around it.
        assert_eq!(single_block_name(&ctx, items[0]), "A");

        // B and C's conditions come straight from their one incoming edge
        // (A's own reaching condition is `true`, so `true AND x` collapses
        // to `x` without materializing a new expression). `A`'s edge to `B`
        // was created first, so the DFS explores `B`'s whole subtree (and
        // post-order-pops it) before it ever visits `C` - reversing
        // postorder flips that finish-order for siblings, so `C` ends up
        // before `B` in the range this fold walks.
        let (c_cond, c_name) = guarded_block(&ctx, items[1]);
        assert_eq!(c_cond, not_p);
        assert_eq!(c_name, "C");

        let (b_cond, b_name) = guarded_block(&ctx, items[2]);
        assert_eq!(b_cond, p);
        assert_eq!(b_name, "B");

        // D has two predecessors, so its reaching condition is the
        // disjunction `(p AND true) OR (!p AND true)`, not a bare edge
        // condition - this is the "guard D with a non-trivial IfElse" case.
        let (d_cond, d_name) = guarded_block(&ctx, items[3]);
        assert_eq!(d_name, "D");
        let Expr::Nary(Op::Or, lhs, rhs) = ctx.expr(d_cond) else {
            panic!("expected D's reaching condition to be an OR, got {:?}", ctx.expr(d_cond));
        };
        assert_and_of(&ctx, *lhs, p, t);
        assert_and_of(&ctx, *rhs, not_p, t);
    }

    /// Unwraps a bare (non-`IfElse`) `Sequence[Block(name)]` item and
    /// returns `name`.
    fn single_block_name(ctx: &TestCtx, item: StmtId) -> &'static str {
        let Stmt::Sequence(inner) = ctx.stmt(item) else {
            panic!("expected a bare Sequence wrapper, got {:?}", ctx.stmt(item));
        };
        assert_eq!(inner.len(), 1);
        let Stmt::Block(name) = ctx.stmt(inner[0]) else {
            panic!("expected a Block, got {:?}", ctx.stmt(inner[0]));
        };
        *name
    }

    /// Unwraps an `IfElse(cond, Sequence[Block(name)])` item and returns
    /// `(cond, name)`.
    fn guarded_block(ctx: &TestCtx, item: StmtId) -> (ExprId, &'static str) {
        let Stmt::IfElse { cond, then_branch } = ctx.stmt(item) else {
            panic!("expected an IfElse, got {:?}", ctx.stmt(item));
        };
        (*cond, single_block_name(ctx, *then_branch))
    }

    fn assert_and_of(ctx: &TestCtx, e: ExprId, expected_lhs: ExprId, expected_rhs: ExprId) {
        let Expr::Nary(Op::And, lhs, rhs) = ctx.expr(e) else {
            panic!("expected an AND, got {:?}", ctx.expr(e));
        };
        assert_eq!(*lhs, expected_lhs);
        assert_eq!(*rhs, expected_rhs);
    }

    /// S2 - while-loop: `H,B,X`; `H->B[p]`, `H->X[!p]`, `B->H[true]`.
    #[test]
    fn s2_while_loop() {
        let (mut cfg, h) = Cfg::new();
        let mut ctx: TestCtx = ArenaAstContext::new();
        let b = cfg.create_block();
        let x = cfg.create_block();
        cfg.block_mut(h).statement = Some(ctx.block_stmt("H"));
        cfg.block_mut(b).statement = Some(ctx.block_stmt("B"));
        cfg.block_mut(x).statement = Some(ctx.block_stmt("X"));

        let p = ctx.leaf("p");
        let not_p = ctx.leaf("!p");
        let t = ctx.expr_true();
        cfg.create_edge(h, b, p);
        cfg.create_edge(h, x, not_p);
        cfg.create_edge(b, h, t);

        let root = run(&mut cfg, &mut ctx);
        let items = match ctx.stmt(root) {
            Stmt::Sequence(items) => items.clone(),
            other => panic!("expected a top-level sequence, got {:?}", other),
        };
        let has_loop = items.iter().any(|&s| matches!(ctx.stmt(s), Stmt::Loop { .. }));
        assert!(has_loop, "expected a Loop statement in {:?}", items);

        let loop_id = items
            .iter()
            .copied()
            .find(|&s| matches!(ctx.stmt(s), Stmt::Loop { .. }))
            .unwrap();
        let Stmt::Loop { body, kind, .. } = ctx.stmt(loop_id) else {
            unreachable!()
        };
        assert_eq!(*kind, LoopKind::PreTested);
        let Stmt::Sequence(body_items) = ctx.stmt(*body) else {
            panic!("loop body should be a sequence");
        };
        let has_break = body_items.iter().any(|&s| {
            find_break_in(&ctx, s)
        });
        assert!(has_break, "expected a Break for the H->X exit edge");
    }

    fn find_break_in(ctx: &TestCtx, s: StmtId) -> bool {
        match ctx.stmt(s) {
            Stmt::Break { .. } => true,
            Stmt::Sequence(items) => items.iter().any(|&i| find_break_in(ctx, i)),
            Stmt::IfElse { then_branch, .. } => find_break_in(ctx, *then_branch),
            _ => false,
        }
    }

    /// S5 - self-loop: `A` with `A->A[p]`, `A->X[!p]`.
    #[test]
    fn s5_self_loop() {
        let (mut cfg, a) = Cfg::new();
        let mut ctx: TestCtx = ArenaAstContext::new();
        let x = cfg.create_block();
        cfg.block_mut(a).statement = Some(ctx.block_stmt("A"));
        cfg.block_mut(x).statement = Some(ctx.block_stmt("X"));

        let p = ctx.leaf("p");
        let not_p = ctx.leaf("!p");
        cfg.create_edge(a, a, p);
        cfg.create_edge(a, x, not_p);

        let root = run(&mut cfg, &mut ctx);
        let items = match ctx.stmt(root) {
            Stmt::Sequence(items) => items.clone(),
            other => panic!("expected a top-level sequence, got {:?}", other),
        };
        let has_loop = items.iter().any(|&s| matches!(ctx.stmt(s), Stmt::Loop { .. }));
        assert!(has_loop);
    }

    /// Property 7: every back-edge in a folded loop range is accompanied by
    /// at least one `Break` whose condition equals the original exit edge's.
    #[test]
    fn loop_wrap_up_break_condition_matches_exit_edge() {
        let (mut cfg, h) = Cfg::new();
        let mut ctx: TestCtx = ArenaAstContext::new();
        let b = cfg.create_block();
        let x = cfg.create_block();
        cfg.block_mut(h).statement = Some(ctx.block_stmt("H"));
        cfg.block_mut(b).statement = Some(ctx.block_stmt("B"));
        cfg.block_mut(x).statement = Some(ctx.block_stmt("X"));

        let p = ctx.leaf("p");
        let not_p = ctx.leaf("!p");
        let t = ctx.expr_true();
        cfg.create_edge(h, b, p);
        let exit_edge_cond = not_p;
        cfg.create_edge(h, x, exit_edge_cond);
        cfg.create_edge(b, h, t);

        let root = run(&mut cfg, &mut ctx);
        let found_matching_break = collect_break_conditions(&ctx, root)
            .into_iter()
            .any(|c| c == exit_edge_cond);
        assert!(found_matching_break);
    }

    fn collect_break_conditions(ctx: &TestCtx, s: StmtId) -> Vec<ExprId> {
        match ctx.stmt(s) {
            Stmt::Break { cond } => vec![*cond],
            Stmt::Sequence(items) => items.iter().flat_map(|&i| collect_break_conditions(ctx, i)).collect(),
            Stmt::IfElse { then_branch, .. } => collect_break_conditions(ctx, *then_branch),
            Stmt::Loop { body, .. } => collect_break_conditions(ctx, *body),
            _ => Vec::new(),
        }
    }

    #[allow(dead_code)]
    fn assert_expr_is_and(ctx: &TestCtx, e: ExprId) {
        assert!(matches!(ctx.expr(e), Expr::Nary(Op::And, _, _)));
    }
}
