use std::collections::HashMap;
use std::hash::Hash;

use crate::cfg::{postorder, ControlFlowGraph};
use crate::domains::{BitSetDomain, BitSetTop, Flipped, Lattice};
use crate::solvers::SolveMonotone;

/// Dominator sets of every reachable node, queryable by node id.
/// The sets are encoded as bitsets over a dense numbering of the
/// graph's stable ids.
pub struct Dominators<NodeId> {
    order: Vec<NodeId>,
    index: HashMap<NodeId, usize>,
    sets: HashMap<NodeId, BitSetDomain>,
}

impl<NodeId: Copy + Eq + Hash> Dominators<NodeId> {
    /// Whether `a` dominates `b`. Every node dominates itself.
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        self.sets
            .get(&b)
            .is_some_and(|doms| doms.0.contains(self.index[&a]))
    }

    pub fn dominators_of(&self, node: NodeId) -> Vec<NodeId> {
        self.sets.get(&node).map_or_else(Vec::new, |doms| {
            doms.0.ones().map(|idx| self.order[idx]).collect()
        })
    }
}

/// Dominator analysis as a forward must-problem: a node is dominated
/// by itself and by everything dominating all of its predecessors.
/// Runs the flipped powerset lattice through the monotone solver, so
/// the solver's join performs the intersection.
pub fn calculate_dominators<Cfg: ControlFlowGraph>(
    cfg: &Cfg,
    node_limit: usize,
) -> Dominators<Cfg::NodeId> {
    let order = cfg.blocks();
    let index: HashMap<_, _> = order
        .iter()
        .copied()
        .enumerate()
        .map(|(idx, node)| (node, idx))
        .collect();
    let ctx = BitSetTop(order.len());
    let solver = SolveMonotone { node_limit };
    let initial = Flipped(BitSetDomain::from(&ctx, &[index[&cfg.entry()]]));
    let post_states = solver.transfer_blocks(
        cfg,
        initial,
        &ctx,
        &mut |node, _cfg, lat_ctx, preds_merged: &Flipped<BitSetDomain>| {
            let result = Flipped(BitSetDomain::from(lat_ctx, &[index[&node]]));
            result.meet(preds_merged, lat_ctx)
        },
    );
    Dominators {
        order,
        index,
        sets: post_states
            .into_iter()
            .map(|(node, doms)| (node, doms.0))
            .collect(),
    }
}

/// The immediate dominator of a node together with the node's
/// postorder number, the representation the intersection walks
/// operate on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DominatorInfo<NodeId> {
    pub dom: NodeId,
    pub postorder: usize,
}

/// Immediate dominators of all nodes reachable from the entry. The
/// entry is its own immediate dominator. Iterates to a fixpoint in
/// reverse postorder, intersecting the already processed
/// predecessors of every node.
pub fn immediate_dominators<Cfg: ControlFlowGraph>(
    cfg: &Cfg,
) -> HashMap<Cfg::NodeId, DominatorInfo<Cfg::NodeId>> {
    let order = postorder(cfg);
    let number: HashMap<_, _> = order
        .iter()
        .copied()
        .enumerate()
        .map(|(num, node)| (node, num))
        .collect();
    let mut doms = HashMap::new();
    doms.insert(
        cfg.entry(),
        DominatorInfo {
            dom: cfg.entry(),
            postorder: number[&cfg.entry()],
        },
    );

    let mut changed = true;
    while changed {
        changed = false;
        for &node in order.iter().rev() {
            if node == cfg.entry() {
                continue;
            }
            let mut new_dom = None;
            for pred in cfg.predecessor_nodes(node) {
                if !doms.contains_key(&pred) {
                    continue;
                }
                new_dom = Some(match new_dom {
                    None => pred,
                    Some(current) => idom_intersect(&doms, current, pred),
                });
            }
            let Some(dom) = new_dom
            else {
                continue;
            };
            let info = DominatorInfo {
                dom,
                postorder: number[&node],
            };
            if doms.get(&node) != Some(&info) {
                doms.insert(node, info);
                changed = true;
            }
        }
    }
    doms
}

/// Common dominator closest to both nodes: walk both fingers up the
/// immediate dominator tree, always advancing the one with the
/// smaller postorder number, until they meet.
pub fn idom_intersect<NodeId: Copy + Eq + Hash>(
    doms: &HashMap<NodeId, DominatorInfo<NodeId>>,
    mut finger1: NodeId,
    mut finger2: NodeId,
) -> NodeId {
    while finger1 != finger2 {
        while doms[&finger1].postorder < doms[&finger2].postorder {
            finger1 = doms[&finger1].dom;
        }
        while doms[&finger2].postorder < doms[&finger1].postorder {
            finger2 = doms[&finger2].dom;
        }
    }
    finger1
}
