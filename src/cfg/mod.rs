//! The pre-AST control-flow graph: a mutable, owning graph of basic blocks
//! and directed, condition-labelled edges for a single function.
//!
//! Blocks and edges are stored in arenas and referenced by stable index
//! (`BlockId`/`EdgeId`), the same discipline this codebase's `ControlFlowGraph`
//! (`analysis/control_flow.rs`) uses for its own `u32` block/edge ids, rather
//! than through owning references between nodes - see SPEC_FULL.md's Design
//! Notes for why that would be unworkable on a densely cyclic graph.
//!
//! Blocks are never physically freed once created (an arena slot lives as
//! long as the `Cfg` does, so indices handed out earlier are always valid).
//! Edges *can* be logically removed (tombstoned) - see [`Cfg::remove_edge`] -
//! because the structurizer does need to drop specific edges while keeping
//! both endpoints' adjacency lists consistent with each other.

mod iter;

pub use iter::{BlockIter, EdgeIter};

use std::fmt;

use smallvec::SmallVec;

use crate::ast::{ExprId, StmtId};
use crate::error::StructurizerError;

/// Handle to a block. Stable for the lifetime of the owning [`Cfg`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct BlockId(pub u32);

/// Handle to an edge. Stable for the lifetime of the owning [`Cfg`], even
/// after the edge is removed (the slot is tombstoned, not reused).
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct EdgeId(pub u32);

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Inline capacity for adjacency lists. Matches this codebase's own
/// `SmallVec<[u32; 2]>` convention for block successors/predecessors: most
/// blocks have at most two neighbors (fall-through + branch).
pub(crate) type AdjList = SmallVec<[EdgeId; 2]>;

/// A basic block. `statement` is `None` until the lifting front-end (or a
/// region reduction) attaches a body.
#[derive(Debug, Clone)]
pub struct Block {
    pub statement: Option<StmtId>,
    pub preds: AdjList,
    pub succs: AdjList,
}

impl Block {
    fn empty() -> Self {
        Block {
            statement: None,
            preds: SmallVec::new(),
            succs: SmallVec::new(),
        }
    }
}

/// A directed, condition-labelled edge.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub from: BlockId,
    pub to: BlockId,
    pub condition: ExprId,
}

#[derive(Debug, Clone)]
enum EdgeSlot {
    Live(Edge),
    Removed,
}

/// Owns every block and edge of a single function's pre-AST CFG.
#[derive(Debug)]
pub struct Cfg {
    blocks: Vec<Block>,
    edges: Vec<EdgeSlot>,
    entry: BlockId,
}

impl Cfg {
    /// Creates a new CFG consisting of a single entry block.
    pub fn new() -> (Cfg, BlockId) {
        let mut cfg = Cfg {
            blocks: vec![Block::empty()],
            edges: Vec::new(),
            entry: BlockId(0),
        };
        cfg.entry = BlockId(0);
        let entry = cfg.entry;
        (cfg, entry)
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0 as usize]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        match &self.edges[id.0 as usize] {
            EdgeSlot::Live(e) => e,
            EdgeSlot::Removed => panic!("edge {:?} was removed", id),
        }
    }

    /// All blocks ever created, in creation order. Includes blocks that have
    /// become unreachable after a region reduction - the caller's post-order
    /// traversal (not this iterator) is what determines relevance.
    pub fn blocks(&self) -> BlockIter<'_> {
        iter::BlockIter::new(self.blocks.len())
    }

    /// All edges that have not been removed, in creation order.
    pub fn edges(&self) -> EdgeIter<'_> {
        iter::EdgeIter::new(&self.edges)
    }

    /// Creates a new block with no statement body and no edges.
    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::empty());
        id
    }

    /// Creates a directed edge `from -> to` labelled with `condition`,
    /// registering it in both endpoints' adjacency lists.
    pub fn create_edge(&mut self, from: BlockId, to: BlockId, condition: ExprId) -> EdgeId {
        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(EdgeSlot::Live(Edge { from, to, condition }));
        self.blocks[from.0 as usize].succs.push(id);
        self.blocks[to.0 as usize].preds.push(id);
        id
    }

    /// Changes `edge`'s target to `new_to`, moving its registration from the
    /// old target's `preds` to the new one's. The source's `succs` entry is
    /// untouched (it still correctly names this edge).
    pub fn retarget_edge_to(&mut self, edge: EdgeId, new_to: BlockId) {
        let old_to = {
            let e = match &mut self.edges[edge.0 as usize] {
                EdgeSlot::Live(e) => e,
                EdgeSlot::Removed => panic!("edge {:?} was removed", edge),
            };
            let old_to = e.to;
            e.to = new_to;
            old_to
        };
        remove_from_adj(&mut self.blocks[old_to.0 as usize].preds, edge);
        self.blocks[new_to.0 as usize].preds.push(edge);
    }

    /// Fully removes `edge`: drops it from both endpoints' adjacency lists
    /// and tombstones its slot. Required to keep the edge-bidirectionality
    /// invariant (section 8, property 2) intact when a region reduction
    /// collapses an internal back-edge that still targets the region's
    /// exit block.
    pub fn remove_edge(&mut self, edge: EdgeId) {
        let (from, to) = {
            let e = match &self.edges[edge.0 as usize] {
                EdgeSlot::Live(e) => *e,
                EdgeSlot::Removed => return,
            };
            (e.from, e.to)
        };
        remove_from_adj(&mut self.blocks[from.0 as usize].succs, edge);
        remove_from_adj(&mut self.blocks[to.0 as usize].preds, edge);
        self.edges[edge.0 as usize] = EdgeSlot::Removed;
    }

    /// Checks the bidirectionality invariant (section 8, property 2) for
    /// every live edge. Exposed for tests; not used on the hot path.
    pub fn check_bidirectional(&self) -> Result<(), StructurizerError> {
        for id in self.edges() {
            let e = self.edge(id);
            if !self.blocks[e.from.0 as usize].succs.contains(&id) {
                return Err(StructurizerError::InconsistentAdjacency { edge: id });
            }
            if !self.blocks[e.to.0 as usize].preds.contains(&id) {
                return Err(StructurizerError::InconsistentAdjacency { edge: id });
            }
        }
        Ok(())
    }
}

fn remove_from_adj(adj: &mut AdjList, edge: EdgeId) {
    if let Some(pos) = adj.iter().position(|&e| e == edge) {
        adj.remove(pos);
    }
}
