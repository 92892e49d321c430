//! Function and module drivers: the orchestration layer that runs the SESE
//! normalizer, region analyzer and structurizer in sequence for one function,
//! plus the small ordering contract the module driver is expected to honor.
//! See SPEC_FULL.md sections 4.4 and 4.5.

use log::{debug, trace, warn};

use crate::ast::{AstContext, StmtId};
use crate::cfg::Cfg;
use crate::config::StructurizerConfig;
use crate::error::StructurizerError;
use crate::region::{self, Region};
use crate::sese;
use crate::structurizer;

/// Runs the full pipeline over one function's CFG: normalize, analyze,
/// structurize. Returns the statement denoting the whole function body.
///
/// Exclusive, single-threaded access to `cfg` and `ctx` for the duration of
/// the call; functions are otherwise independent and a module driver may run
/// this once per function in parallel.
pub fn structurize_function<C: AstContext>(
    cfg: &mut Cfg,
    ctx: &mut C,
    config: &StructurizerConfig,
) -> Result<StmtId, StructurizerError> {
    debug!(
        "structurize_function: {} block(s) before normalization",
        cfg.block_count()
    );

    let redirectors = sese::normalize(cfg, ctx, config)?;
    debug!("SESE normalization inserted {} redirector block(s)", redirectors);

    let analysis = region::analyze(cfg);
    trace!("region analysis found {} top-level loop region(s)", analysis.root.children.len());

    if has_loop_without_exit(&analysis.root, true) {
        warn!("function has no reachable exit from the entry block");
        return Err(StructurizerError::NoReachableExit);
    }

    let body = structurizer::structurize(cfg, ctx, analysis.root)?;
    debug!("structurize_function: done, {} block(s) in final CFG", cfg.block_count());
    Ok(body)
}

/// Is there a loop region anywhere in the tree whose body never escapes?
/// The root region's own `exit` is always `None` (it denotes the
/// whole-function range, not a loop) and is not itself a failure; only a
/// non-root region with no exit means a loop the driver can prove never
/// reaches a return.
fn has_loop_without_exit(region: &Region, is_root: bool) -> bool {
    if !is_root && region.exit.is_none() {
        return true;
    }
    region.children.iter().any(|child| has_loop_without_exit(child, false))
}

/// Sorts `functions` ascending by `(virtual_address, name)`, the ordering
/// SPEC_FULL.md's module driver applies to emitted function nodes before
/// running AST post-passes. Function discovery, prototype filtering and the
/// post-pass registry itself are external collaborators this crate does not
/// implement; this helper is the one piece of the module driver contract
/// that is pure data shuffling and safe to ship as a reusable function.
pub fn order_functions<T>(
    functions: &mut [T],
    virtual_address: impl Fn(&T) -> u64,
    name: impl Fn(&T) -> &str,
) {
    functions.sort_by(|a, b| {
        virtual_address(a)
            .cmp(&virtual_address(b))
            .then_with(|| name(a).cmp(name(b)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::arena::ArenaAstContext;

    type TestCtx = ArenaAstContext<&'static str, &'static str, u64>;

    #[test]
    fn structurize_function_runs_full_pipeline_on_a_diamond() {
        let (mut cfg, a) = Cfg::new();
        let mut ctx: TestCtx = ArenaAstContext::new();
        let b = cfg.create_block();
        let c = cfg.create_block();
        let d = cfg.create_block();
        let p = ctx.leaf("p");
        let not_p = ctx.leaf("!p");
        let t = ctx.expr_true();
        cfg.create_edge(a, b, p);
        cfg.create_edge(a, c, not_p);
        cfg.create_edge(b, d, t);
        cfg.create_edge(c, d, t);

        let config = StructurizerConfig::default();
        let result = structurize_function(&mut cfg, &mut ctx, &config);
        assert!(result.is_ok());
    }

    #[test]
    fn structurize_function_rejects_a_function_with_no_reachable_exit() {
        let (mut cfg, a) = Cfg::new();
        let mut ctx: TestCtx = ArenaAstContext::new();
        let t = ctx.expr_true();
        cfg.create_edge(a, a, t);

        let config = StructurizerConfig::default();
        let result = structurize_function(&mut cfg, &mut ctx, &config);
        assert_eq!(result, Err(StructurizerError::NoReachableExit));
    }

    #[test]
    fn order_functions_sorts_by_address_then_name() {
        let mut funcs = vec![("sub_200", 0x200u64), ("sub_100b", 0x100), ("sub_100a", 0x100)];
        order_functions(&mut funcs, |f| f.1, |f| f.0);
        assert_eq!(
            funcs,
            vec![("sub_100a", 0x100), ("sub_100b", 0x100), ("sub_200", 0x200)]
        );
    }
}
