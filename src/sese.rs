//! SESE Normalizer: rewrites a CFG so that every cycle has exactly one entry
//! block and exactly one exit block, inserting synthetic redirector blocks
//! where it doesn't. See SPEC_FULL.md section 4.1.

use std::collections::HashSet;

use bitvec::prelude::*;
use log::{debug, trace};

use crate::ast::{ensure_sequence, AstContext};
use crate::cfg::{BlockId, Cfg, EdgeId};
use crate::config::StructurizerConfig;
use crate::error::StructurizerError;

/// Runs the normalizer over `cfg`, inserting redirector blocks as needed.
/// Returns the number of redirector blocks inserted (for logging/tests).
/// Running this twice on an already-normalized CFG inserts none - every
/// SCC it finds the second time already has a single entry and exit.
pub fn normalize<C: AstContext>(
    cfg: &mut Cfg,
    ctx: &mut C,
    config: &StructurizerConfig,
) -> Result<usize, StructurizerError> {
    let sccs = tarjan_sccs(cfg);
    let mut redirectors_inserted = 0;

    for scc in sccs {
        if !is_cycle(cfg, &scc) {
            continue;
        }
        if scc.len() > config.max_scc_size {
            return Err(StructurizerError::SccTooLarge {
                size: scc.len(),
                limit: config.max_scc_size,
            });
        }
        trace!("normalizing SCC of size {}", scc.len());

        let mut members: BitVec<u32> = bitvec![u32, Lsb0; 0; cfg.block_count()];
        for &b in &scc {
            members.set(b.0 as usize, true);
        }

        let mut entering_edges: Vec<EdgeId> = Vec::new();
        let mut entry_set: HashSet<BlockId> = HashSet::new();
        for &b in &scc {
            for &e in &cfg.block(b).preds {
                let from = cfg.edge(e).from;
                if !members[from.0 as usize] {
                    entering_edges.push(e);
                    entry_set.insert(b);
                }
            }
        }

        // Back-edge discovery: DFS restricted to SCC members, starting from
        // the first member in SCC-enumeration order (deterministic given a
        // deterministic Tarjan's pass over insertion-ordered adjacency).
        let start = scc[0];
        for e in discover_back_edges(cfg, &members, start) {
            entry_set.insert(cfg.edge(e).to);
            entering_edges.push(e);
        }

        let mut exiting_edges: Vec<EdgeId> = Vec::new();
        let mut exit_set: HashSet<BlockId> = HashSet::new();
        for &b in &scc {
            for &e in &cfg.block(b).succs {
                let to = cfg.edge(e).to;
                if !members[to.0 as usize] {
                    exiting_edges.push(e);
                    exit_set.insert(to);
                }
            }
        }

        if entry_set.len() > 1 {
            create_redirector_block(cfg, ctx, &entering_edges);
            redirectors_inserted += 1;
        }
        if exit_set.len() > 1 {
            create_redirector_block(cfg, ctx, &exiting_edges);
            redirectors_inserted += 1;
        }
    }

    debug!("SESE normalization inserted {} redirector block(s)", redirectors_inserted);
    Ok(redirectors_inserted)
}

/// An SCC is a cycle (not a lone non-self-looping block) iff it has more
/// than one member, or its single member has a self-loop.
fn is_cycle(cfg: &Cfg, scc: &[BlockId]) -> bool {
    if scc.len() > 1 {
        return true;
    }
    let only = scc[0];
    cfg.block(only).succs.iter().any(|&e| cfg.edge(e).to == only)
}

/// DFS restricted to `members`, starting at `start`. Every edge to an
/// already-visited member is a back-edge. The DFS is guaranteed to visit
/// every member in a single tree: `members` is a strongly connected
/// subgraph, so a DFS from any one of its blocks (staying inside the
/// subgraph) necessarily reaches the rest.
fn discover_back_edges(cfg: &Cfg, members: &BitVec<u32>, start: BlockId) -> Vec<EdgeId> {
    let mut visited: BitVec<u32> = bitvec![u32, Lsb0; 0; cfg.block_count()];
    let mut back_edges = Vec::new();
    let mut stack: Vec<(BlockId, usize)> = Vec::new();
    visited.set(start.0 as usize, true);
    stack.push((start, 0));

    while let Some(&(node, idx)) = stack.last() {
        let succs = &cfg.block(node).succs;
        if idx >= succs.len() {
            stack.pop();
            continue;
        }
        let edge_id = succs[idx];
        stack.last_mut().unwrap().1 += 1;
        let to = cfg.edge(edge_id).to;
        if !members[to.0 as usize] {
            continue;
        }
        if visited[to.0 as usize] {
            back_edges.push(edge_id);
        } else {
            visited.set(to.0 as usize, true);
            stack.push((to, 0));
        }
    }

    debug_assert_eq!(
        visited.count_ones(),
        members.count_ones(),
        "DFS restricted to a strongly connected component must visit every member"
    );
    back_edges
}

/// Builds a redirector block `R`: every edge in `edges` is retargeted to
/// `R`, its source gets a selector assignment conjoined onto its statement,
/// and `R` dispatches to each distinct original target via `selector == i`.
fn create_redirector_block<C: AstContext>(cfg: &mut Cfg, ctx: &mut C, edges: &[EdgeId]) -> BlockId {
    let r = cfg.create_block();
    let selector = ctx.mk_fresh_var();

    let mut targets: Vec<BlockId> = Vec::new();
    for &e in edges {
        let to = cfg.edge(e).to;
        if !targets.contains(&to) {
            targets.push(to);
        }
    }

    for &e in edges {
        let edge = *cfg.edge(e);
        let selector_value = targets.iter().position(|&t| t == edge.to).unwrap() as u64;
        let assign = ctx.mk_var_assign(&selector, selector_value);

        let src = edge.from;
        let mut stmt = cfg.block(src).statement;
        let seq = ensure_sequence(ctx, &mut stmt);
        ctx.append(seq, assign);
        cfg.block_mut(src).statement = stmt;

        cfg.retarget_edge_to(e, r);
    }

    for (i, &target) in targets.iter().enumerate() {
        let cond = ctx.equals(&selector, i as u64);
        cfg.create_edge(r, target, cond);
    }

    r
}

/// Iterative Tarjan's algorithm (Robert Tarjan, "Depth-first search and
/// linear graph algorithms", 1972), run with an explicit work stack instead
/// of recursion: the blocks of a decompiled function can form arbitrarily
/// deep chains, and this codebase's other graph analyses avoid recursion on
/// attacker/compiler-sized input for the same reason.
fn tarjan_sccs(cfg: &Cfg) -> Vec<Vec<BlockId>> {
    let n = cfg.block_count();
    let mut index: Vec<Option<u32>> = vec![None; n];
    let mut lowlink: Vec<u32> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut sstack: Vec<BlockId> = Vec::new();
    let mut sccs: Vec<Vec<BlockId>> = Vec::new();
    let mut counter: u32 = 0;

    for start in cfg.blocks() {
        if index[start.0 as usize].is_some() {
            continue;
        }

        let mut work: Vec<(BlockId, usize)> = Vec::new();
        index[start.0 as usize] = Some(counter);
        lowlink[start.0 as usize] = counter;
        counter += 1;
        sstack.push(start);
        on_stack[start.0 as usize] = true;
        work.push((start, 0));

        while let Some(&(node, idx)) = work.last() {
            let succs = &cfg.block(node).succs;
            if idx < succs.len() {
                work.last_mut().unwrap().1 += 1;
                let w = cfg.edge(succs[idx]).to;
                if index[w.0 as usize].is_none() {
                    index[w.0 as usize] = Some(counter);
                    lowlink[w.0 as usize] = counter;
                    counter += 1;
                    sstack.push(w);
                    on_stack[w.0 as usize] = true;
                    work.push((w, 0));
                } else if on_stack[w.0 as usize] {
                    let w_index = index[w.0 as usize].unwrap();
                    if w_index < lowlink[node.0 as usize] {
                        lowlink[node.0 as usize] = w_index;
                    }
                }
            } else {
                work.pop();
                if let Some(&(parent, _)) = work.last() {
                    if lowlink[node.0 as usize] < lowlink[parent.0 as usize] {
                        lowlink[parent.0 as usize] = lowlink[node.0 as usize];
                    }
                }
                if lowlink[node.0 as usize] == index[node.0 as usize].unwrap() {
                    let mut component = Vec::new();
                    loop {
                        let w = sstack.pop().unwrap();
                        on_stack[w.0 as usize] = false;
                        component.push(w);
                        if w == node {
                            break;
                        }
                    }
                    sccs.push(component);
                }
            }
        }
    }

    sccs
}
