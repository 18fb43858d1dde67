use core::fmt::{Debug, Display};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write;
use std::hash::Hash;

/// The way control is transferred along an edge: a fall-through or
/// unconditional jump, a taken conditional or switch case, or an
/// exceptional transfer into a catch handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    Goto,
    Branch,
    Throw,
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EdgeKind::Goto => write!(f, "goto"),
            EdgeKind::Branch => write!(f, "branch"),
            EdgeKind::Throw => write!(f, "throw"),
        }
    }
}

pub trait CfgBlock {
    type Operation;

    fn operations(&self) -> &[Self::Operation];
}

/// The interface the analyses and the fixpoint iteration consume.
/// Nodes and edges are addressed by stable ids owned by the graph, so
/// implementations are free to keep sparse id spaces (e.g., after
/// pruning unreachable blocks). The successor and predecessor lists
/// preserve insertion order, and [`ControlFlowGraph::blocks`] returns
/// ids in id order, which makes every traversal deterministic.
pub trait ControlFlowGraph {
    type Block: CfgBlock;
    type NodeId: Copy + Eq + Ord + Hash + Debug + Display;
    type EdgeId: Copy + Eq + Debug;

    fn entry(&self) -> Self::NodeId;

    /// The unique block without successors, when there is one. Graphs
    /// ending in an infinite loop have no exit.
    fn exit(&self) -> Option<Self::NodeId>;

    fn blocks(&self) -> Vec<Self::NodeId>;

    fn block(&self, node: Self::NodeId) -> &Self::Block;

    fn successors(&self, node: Self::NodeId) -> Vec<Self::EdgeId>;

    fn predecessors(&self, node: Self::NodeId) -> Vec<Self::EdgeId>;

    fn source(&self, edge: Self::EdgeId) -> Self::NodeId;

    fn target(&self, edge: Self::EdgeId) -> Self::NodeId;

    fn edge_kind(&self, edge: Self::EdgeId) -> EdgeKind;

    fn successor_nodes(&self, node: Self::NodeId) -> Vec<Self::NodeId> {
        self.successors(node)
            .into_iter()
            .map(|edge| self.target(edge))
            .collect()
    }

    fn predecessor_nodes(&self, node: Self::NodeId) -> Vec<Self::NodeId> {
        self.predecessors(node)
            .into_iter()
            .map(|edge| self.source(edge))
            .collect()
    }
}

/// Postorder of the nodes reachable from the entry.
pub fn postorder<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Vec<Cfg::NodeId> {
    let mut result = Vec::new();
    let mut visited = HashSet::from([cfg.entry()]);
    let mut stack = vec![(cfg.entry(), visit_order(cfg, cfg.entry()), 0usize)];
    while !stack.is_empty() {
        let (node, succs, idx) = stack.last_mut().unwrap();
        if *idx < succs.len() {
            let next = succs[*idx];
            *idx += 1;
            if visited.insert(next) {
                stack.push((next, visit_order(cfg, next), 0));
            }
        } else {
            result.push(*node);
            stack.pop();
        }
    }
    result
}

/// Edges closing a cycle in the depth-first traversal order, i.e.,
/// edges into a node of the active traversal stack. Every loop has at
/// least one.
pub fn get_back_edges<Cfg: ControlFlowGraph>(cfg: &Cfg) -> HashSet<(Cfg::NodeId, Cfg::NodeId)> {
    let mut back_edges = HashSet::new();
    let mut visited = HashSet::from([cfg.entry()]);
    let mut on_stack = HashSet::from([cfg.entry()]);
    let mut stack = vec![(cfg.entry(), visit_order(cfg, cfg.entry()), 0usize)];
    while !stack.is_empty() {
        let (node, succs, idx) = stack.last_mut().unwrap();
        if *idx < succs.len() {
            let next = succs[*idx];
            let current = *node;
            *idx += 1;
            if on_stack.contains(&next) {
                back_edges.insert((current, next));
            } else if visited.insert(next) {
                on_stack.insert(next);
                stack.push((next, visit_order(cfg, next), 0));
            }
        } else {
            on_stack.remove(node);
            stack.pop();
        }
    }
    back_edges
}

fn visit_order<Cfg: ControlFlowGraph>(cfg: &Cfg, node: Cfg::NodeId) -> Vec<Cfg::NodeId> {
    let mut succs = cfg.successor_nodes(node);
    succs.reverse();
    succs
}

/// Worklist popping the nodes in reverse postorder. Pushing a node
/// that is already queued or is unreachable from the entry is a no-op.
pub struct RPOWorklist<'cfg, Cfg: ControlFlowGraph> {
    cfg: &'cfg Cfg,
    rpo_order: HashMap<Cfg::NodeId, usize>,
    queue: BTreeSet<(usize, Cfg::NodeId)>,
}

impl<'cfg, Cfg: ControlFlowGraph> RPOWorklist<'cfg, Cfg> {
    pub fn new(cfg: &'cfg Cfg) -> Self {
        let rpo_order = postorder(cfg)
            .into_iter()
            .rev()
            .enumerate()
            .map(|(order, node)| (node, order))
            .collect();
        Self {
            cfg,
            rpo_order,
            queue: BTreeSet::new(),
        }
    }

    pub fn push(&mut self, node: Cfg::NodeId) {
        if let Some(&order) = self.rpo_order.get(&node) {
            self.queue.insert((order, node));
        }
    }

    pub fn push_successors(&mut self, node: Cfg::NodeId) {
        for succ in self.cfg.successor_nodes(node) {
            self.push(succ);
        }
    }

    pub fn pop(&mut self) -> Option<Cfg::NodeId> {
        self.queue.pop_first().map(|(_, node)| node)
    }

    pub fn get_rpo_order(&self, node: Cfg::NodeId) -> usize {
        self.rpo_order[&node]
    }
}

/// Render the graph in the DOT graph description language. Nodes are
/// labelled with their id and the textual dump of their operations,
/// edges with the way control is transferred.
pub fn print<Cfg: ControlFlowGraph>(
    name: Option<&str>,
    cfg: &Cfg,
    mut op_printer: impl FnMut(&<Cfg::Block as CfgBlock>::Operation) -> String,
) -> String {
    let mut output = match name {
        Some(name) => format!("digraph {name} {{\n"),
        None => "digraph {\n".to_owned(),
    };
    for node in cfg.blocks() {
        write!(output, "  B{node}[label=\"B{node}").unwrap();
        for op in cfg.block(node).operations() {
            write!(output, "\\n{}", op_printer(op)).unwrap();
        }
        output.push_str("\"]\n");
    }
    output.push('\n');
    for node in cfg.blocks() {
        for edge in cfg.successors(node) {
            writeln!(
                output,
                "  B{} -> B{}[label=\"{}\"]",
                node,
                cfg.target(edge),
                cfg.edge_kind(edge)
            )
            .unwrap();
        }
    }
    output.push_str("}\n");
    output
}
