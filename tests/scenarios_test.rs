//! Crate-level scenario tests against the public API, covering the
//! concrete scenarios from SPEC_FULL.md section 8 that the inline unit
//! tests in `src/structurizer.rs` and `src/sese.rs` don't already exercise:
//! S3 (irreducible two-entry cycle), S4 (nested if inside a loop) and S6
//! (multi-exit loop).

use std::collections::HashSet;

use ctrlstruct::ast::arena::{ArenaAstContext, Stmt};
use ctrlstruct::{structurize_function, AstContext, BlockId, Cfg, StmtId, StructurizerConfig};

type TestCtx = ArenaAstContext<&'static str, &'static str, u64>;

fn collect_blocks(ctx: &TestCtx, id: StmtId, out: &mut Vec<&'static str>) {
    match ctx.stmt(id) {
        Stmt::Sequence(items) => items.iter().for_each(|&i| collect_blocks(ctx, i, out)),
        Stmt::IfElse { then_branch, .. } => collect_blocks(ctx, *then_branch, out),
        Stmt::Loop { body, .. } => collect_blocks(ctx, *body, out),
        Stmt::Block(name) => out.push(name),
        Stmt::Break { .. } | Stmt::Assign { .. } => {}
    }
}

fn count_breaks(ctx: &TestCtx, id: StmtId) -> usize {
    match ctx.stmt(id) {
        Stmt::Break { .. } => 1,
        Stmt::Sequence(items) => items.iter().map(|&i| count_breaks(ctx, i)).sum(),
        Stmt::IfElse { then_branch, .. } => count_breaks(ctx, *then_branch),
        Stmt::Loop { body, .. } => count_breaks(ctx, *body),
        _ => 0,
    }
}

fn has_loop(ctx: &TestCtx, id: StmtId) -> bool {
    match ctx.stmt(id) {
        Stmt::Loop { .. } => true,
        Stmt::Sequence(items) => items.iter().any(|&i| has_loop(ctx, i)),
        Stmt::IfElse { then_branch, .. } => has_loop(ctx, *then_branch),
        _ => false,
    }
}

/// S3 - irreducible two-entry cycle: `A, B, C, D` with `A->C`, `B->D`,
/// `C->D`, `D->C`, plus an escape `D->X` so the function actually returns.
#[test]
fn s3_irreducible_cycle_structures_successfully() {
    let (mut cfg, a) = Cfg::new();
    let mut ctx: TestCtx = ArenaAstContext::new();
    let b = cfg.create_block();
    let c = cfg.create_block();
    let d = cfg.create_block();
    let x = cfg.create_block();
    for (id, name) in [(a, "A"), (b, "B"), (c, "C"), (d, "D"), (x, "X")] {
        cfg.block_mut(id).statement = Some(ctx.block_stmt(name));
    }

    let t = ctx.expr_true();
    let q = ctx.leaf("q");
    let not_q = ctx.leaf("!q");
    cfg.create_edge(a, c, t);
    cfg.create_edge(a, b, t);
    cfg.create_edge(b, d, t);
    cfg.create_edge(c, d, t);
    cfg.create_edge(d, c, q);
    cfg.create_edge(d, x, not_q);

    let config = StructurizerConfig::default();
    let body = structurize_function(&mut cfg, &mut ctx, &config).expect("structurize_function");
    assert!(has_loop(&ctx, body), "irreducible cycle should structure into a Loop");
    assert!(cfg.check_bidirectional().is_ok());

    let mut blocks = Vec::new();
    collect_blocks(&ctx, body, &mut blocks);
    let seen: HashSet<_> = blocks.into_iter().collect();
    assert!(seen.contains("A"));
    assert!(seen.contains("X"));
}

/// S4 - nested if inside a loop: `H, B1, B2, M, X`;
/// `H->B1[p]`, `H->X[!p]`, `B1->B2[q]`, `B1->M[!q]`, `B2->M[true]`, `M->H[true]`.
#[test]
fn s4_nested_if_inside_loop() {
    let (mut cfg, h) = Cfg::new();
    let mut ctx: TestCtx = ArenaAstContext::new();
    let b1 = cfg.create_block();
    let b2 = cfg.create_block();
    let m = cfg.create_block();
    let x = cfg.create_block();
    for (id, name) in [(h, "H"), (b1, "B1"), (b2, "B2"), (m, "M"), (x, "X")] {
        cfg.block_mut(id).statement = Some(ctx.block_stmt(name));
    }

    let p = ctx.leaf("p");
    let not_p = ctx.leaf("!p");
    let q = ctx.leaf("q");
    let not_q = ctx.leaf("!q");
    let t = ctx.expr_true();
    cfg.create_edge(h, b1, p);
    cfg.create_edge(h, x, not_p);
    cfg.create_edge(b1, b2, q);
    cfg.create_edge(b1, m, not_q);
    cfg.create_edge(b2, m, t);
    cfg.create_edge(m, h, t);

    let config = StructurizerConfig::default();
    let body = structurize_function(&mut cfg, &mut ctx, &config).expect("structurize_function");
    assert!(has_loop(&ctx, body));
    assert_eq!(count_breaks(&ctx, body), 1, "exactly one break, for H->X");

    let mut blocks = Vec::new();
    collect_blocks(&ctx, body, &mut blocks);
    assert!(blocks.contains(&"B2"), "nested if's then-branch must still appear: {:?}", blocks);
}

/// S6 - multi-exit loop: `H, B, X1, X2`; `H->B[p]`, `H->X1[!p]`,
/// `B->H[q]`, `B->X2[!q]`. SESE normalization must unify `X1`/`X2` behind a
/// single exit redirector before the loop can be folded.
#[test]
fn s6_multi_exit_loop_gets_unified_exit() {
    let (mut cfg, h) = Cfg::new();
    let mut ctx: TestCtx = ArenaAstContext::new();
    let b = cfg.create_block();
    let x1 = cfg.create_block();
    let x2 = cfg.create_block();
    for (id, name) in [(h, "H"), (b, "B"), (x1, "X1"), (x2, "X2")] {
        cfg.block_mut(id).statement = Some(ctx.block_stmt(name));
    }

    let p = ctx.leaf("p");
    let not_p = ctx.leaf("!p");
    let q = ctx.leaf("q");
    let not_q = ctx.leaf("!q");
    cfg.create_edge(h, b, p);
    cfg.create_edge(h, x1, not_p);
    cfg.create_edge(b, h, q);
    cfg.create_edge(b, x2, not_q);

    let config = StructurizerConfig::default();
    let redirectors = ctrlstruct::sese::normalize(&mut cfg, &mut ctx, &config).expect("normalize");
    assert_eq!(redirectors, 1, "only the exit side is ambiguous; entry H already has one external pred");

    let analysis = ctrlstruct::region::analyze(&cfg);
    let body = ctrlstruct::structurizer::structurize(&mut cfg, &mut ctx, analysis.root).expect("structurize");
    assert!(has_loop(&ctx, body));
    assert_eq!(count_breaks(&ctx, body), 2, "one break per original exit edge");
    assert!(cfg.check_bidirectional().is_ok());
}

/// Sanity check that `BlockId` ordering from `Cfg::create_block` is exactly
/// creation order, which the scenario tests above rely on implicitly.
#[test]
fn block_ids_are_assigned_in_creation_order() {
    let (mut cfg, a) = Cfg::new();
    let b = cfg.create_block();
    let c = cfg.create_block();
    assert_eq!(a, BlockId(0));
    assert_eq!(b, BlockId(1));
    assert_eq!(c, BlockId(2));
}
