use std::collections::HashMap;

use crate::cfg::{CfgBlock, ControlFlowGraph, RPOWorklist};
use crate::domains::JoinSemiLattice;

/// Position of an operation within a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OpPos<NodeId> {
    pub node: NodeId,
    pub index: usize,
}

pub trait TransferFunction<Cfg: ControlFlowGraph, D: JoinSemiLattice> {
    fn operation(
        &mut self,
        pos: OpPos<Cfg::NodeId>,
        op: &<Cfg::Block as CfgBlock>::Operation,
        cfg: &Cfg,
        ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> D;

    /// Transfer along an edge, e.g., to refine the state with the
    /// direction a conditional took. `None` keeps the predecessor
    /// state unchanged.
    fn edge(
        &mut self,
        _edge: Cfg::EdgeId,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        _pre_state: &D,
    ) -> Option<D> {
        None
    }

    /// Transfer a whole node. The default folds [`Self::operation`]
    /// over the node's operations in stored order.
    fn block(
        &mut self,
        node: Cfg::NodeId,
        cfg: &Cfg,
        ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> D {
        let mut state = pre_state.clone();
        for (index, op) in cfg.block(node).operations().iter().enumerate() {
            state = self.operation(OpPos { node, index }, op, cfg, ctx, &state);
        }
        state
    }
}

/// Adapts a node-level closure to [`TransferFunction`], for analyses
/// that only depend on the shape of the graph.
pub struct BlockTransfer<F>(F);

impl<F> BlockTransfer<F> {
    pub fn new(transfer: F) -> Self {
        BlockTransfer(transfer)
    }
}

impl<Cfg, D, F> TransferFunction<Cfg, D> for BlockTransfer<F>
where
    Cfg: ControlFlowGraph,
    D: JoinSemiLattice,
    F: FnMut(Cfg::NodeId, &Cfg, &D::LatticeContext, &D) -> D,
{
    fn operation(
        &mut self,
        _pos: OpPos<Cfg::NodeId>,
        _op: &<Cfg::Block as CfgBlock>::Operation,
        _cfg: &Cfg,
        _ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> D {
        pre_state.clone()
    }

    fn block(
        &mut self,
        node: Cfg::NodeId,
        cfg: &Cfg,
        ctx: &D::LatticeContext,
        pre_state: &D,
    ) -> D {
        (self.0)(node, cfg, ctx, pre_state)
    }
}

/// Monotone fixpoint iteration over a reverse postorder worklist.
/// The pre-state of a node is the join of the (edge-transferred)
/// post-states of its predecessors; the entry node is additionally
/// seeded with the initial state. On revisits the new post-state is
/// widened against the previous one.
pub struct SolveMonotone {
    /// Limit on how often a node can be processed before the
    /// iteration is considered diverging, as a multiple of the node
    /// count. Zero means no limit.
    pub node_limit: usize,
}

impl Default for SolveMonotone {
    fn default() -> Self {
        Self { node_limit: 20 }
    }
}

impl SolveMonotone {
    /// Post-states of all reachable nodes, or an empty map when the
    /// node limit was exhausted before reaching a fixpoint.
    pub fn solve<Cfg, D>(
        &self,
        cfg: &Cfg,
        initial: D,
        ctx: &D::LatticeContext,
        transfer: &mut impl TransferFunction<Cfg, D>,
    ) -> HashMap<Cfg::NodeId, D>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
    {
        let limit = self.node_limit * cfg.blocks().len();
        let mut processed_nodes = 0_usize;
        let mut visits: HashMap<Cfg::NodeId, usize> = HashMap::new();
        let mut post_states: HashMap<Cfg::NodeId, D> = HashMap::new();

        let mut worklist = RPOWorklist::new(cfg);
        worklist.push(cfg.entry());
        while let Some(current) = worklist.pop() {
            if limit > 0 && processed_nodes >= limit {
                return HashMap::new();
            }

            let mut pre_state = if current == cfg.entry() {
                initial.clone()
            } else {
                D::bottom(ctx)
            };
            for edge in cfg.predecessors(current) {
                if let Some(pred_state) = post_states.get(&cfg.source(edge)) {
                    let transferred = transfer
                        .edge(edge, cfg, ctx, pred_state)
                        .unwrap_or_else(|| pred_state.clone());
                    pre_state = pre_state.join(&transferred, ctx);
                }
            }

            let mut post_state = transfer.block(current, cfg, ctx, &pre_state);
            processed_nodes += 1;
            let visit_count = *visits
                .entry(current)
                .and_modify(|count| *count += 1)
                .or_insert(1);
            match post_states.get(&current) {
                Some(old) if *old == post_state => continue,
                Some(old) => {
                    post_state = post_state.widen(old, ctx, visit_count);
                    if *old == post_state {
                        continue;
                    }
                }
                None => {}
            }

            post_states.insert(current, post_state);
            worklist.push_successors(current);
        }

        post_states
    }

    /// Convenience entry point for node-level transfers.
    pub fn transfer_blocks<Cfg, D>(
        &self,
        cfg: &Cfg,
        initial: D,
        ctx: &D::LatticeContext,
        transfer: &mut impl FnMut(Cfg::NodeId, &Cfg, &D::LatticeContext, &D) -> D,
    ) -> HashMap<Cfg::NodeId, D>
    where
        Cfg: ControlFlowGraph,
        D: JoinSemiLattice,
    {
        self.solve(
            cfg,
            initial,
            ctx,
            &mut BlockTransfer::new(|node: Cfg::NodeId, cfg: &Cfg, ctx: &D::LatticeContext, pre: &D| {
                transfer(node, cfg, ctx, pre)
            }),
        )
    }
}
