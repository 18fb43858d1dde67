use std::collections::{BTreeMap, HashMap, HashSet};

use analysis::cfg::{CfgBlock, ControlFlowGraph, EdgeKind};

use crate::ir::{self, Entry, Inst, Label, TryId, Unit};
use crate::lexer::IdentifierTable;

pub type BlockId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EdgeId(usize);

/// Edges are owned by the graph and shared by both endpoints through
/// their id, so a mutation is observed from both sides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Edge {
    src: BlockId,
    target: BlockId,
    kind: EdgeKind,
}

impl Edge {
    pub fn src(&self) -> BlockId {
        self.src
    }

    pub fn target(&self) -> BlockId {
        self.target
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }
}

/// A piece of straight-line code: branches only occur as the last
/// instruction, catch markers only as the first entry. The block owns
/// its entries; target and try markers are not among them, they are
/// represented by the graph structure.
#[derive(Clone, Debug, Default)]
pub struct Block {
    id: BlockId,
    entries: Vec<Entry>,
    preds: Vec<EdgeId>,
    succs: Vec<EdgeId>,
    default_succ: Option<BlockId>,
    catch_region: Option<TryId>,
}

impl Block {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// The successor control falls through to, or the switch default.
    /// Blocks ending in an explicit branch, a return or a throw have
    /// none.
    pub fn default_successor(&self) -> Option<BlockId> {
        self.default_succ
    }

    /// The try region covering this block, if any.
    pub fn catch_region(&self) -> Option<TryId> {
        self.catch_region
    }

    /// Whether this block starts a catch handler.
    pub fn is_catch(&self) -> bool {
        matches!(self.entries.first(), Some(Entry::Catch(_)))
    }

    /// Remove all source line markers from this block.
    pub fn remove_debug_line_info(&mut self) {
        self.entries
            .retain(|entry| !matches!(entry, Entry::Position(_)));
    }
}

/// A control flow graph over the method item entries of a single
/// method. Constructing it takes ownership of the linear entry
/// stream; the graph is the authoritative representation until
/// [`Cfg::linearize`] turns it back into a stream.
///
/// Blocks are kept in an ordered map under their stable id, edges in
/// an arena indexed by [`EdgeId`]; neither ids nor edge ids are
/// reused after pruning. The stream is trusted input produced by an
/// upstream decoder: malformed streams (dangling targets, control
/// falling off the end, inconsistent try markers) abort construction.
pub struct Cfg {
    blocks: BTreeMap<BlockId, Block>,
    edges: Vec<Option<Edge>>,
    entry: BlockId,
    exit: Option<BlockId>,
    ghost: Option<BlockId>,
    targets: HashMap<Label, BlockId>,
    catches: HashMap<TryId, Vec<BlockId>>,
}

impl Cfg {
    pub fn new(entries: Vec<Entry>) -> Self {
        assert!(
            !entries.is_empty(),
            "Cannot build a graph from an empty stream."
        );
        let mut cfg = Cfg {
            blocks: BTreeMap::new(),
            edges: Vec::new(),
            entry: 0,
            exit: None,
            ghost: None,
            targets: HashMap::new(),
            catches: HashMap::new(),
        };
        cfg.find_block_boundaries(entries);
        cfg.connect_blocks();
        cfg.add_catch_edges();
        cfg.remove_unreachable_blocks();
        cfg.calculate_exit_block();
        cfg.sanity_check();
        cfg
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry
    }

    pub fn exit_block(&self) -> Option<BlockId> {
        self.exit
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn get_block(&self, id: BlockId) -> &Block {
        &self.blocks[&id]
    }

    pub fn get_block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks.get_mut(&id).expect("No such block.")
    }

    pub fn edge(&self, edge: EdgeId) -> &Edge {
        self.edges[edge.0].as_ref().expect("Edge was removed.")
    }

    /// The handler chain of a try region in declaration order.
    pub fn catch_handlers(&self, region: TryId) -> &[BlockId] {
        self.catches.get(&region).map_or(&[], Vec::as_slice)
    }

    /// Iterate over all instructions of the graph: blocks in id
    /// order, entries of a block in stored order, non-instruction
    /// entries skipped.
    pub fn instructions(&self) -> InstructionIterator<'_> {
        InstructionIterator {
            blocks: self.blocks.values(),
            current: [].iter(),
        }
    }

    /// Split the stream into blocks. A block starts at the first
    /// entry, at every target, after every terminator, and at every
    /// try or catch marker; consecutive boundary triggers share one
    /// block. Target and try markers are dropped here, catch entries
    /// stay as the head of their handler block.
    fn find_block_boundaries(&mut self, entries: Vec<Entry>) {
        let mut active_region = None;
        let mut current = self.start_block(active_region);
        let mut after_terminator = false;

        for entry in entries {
            let starts_block = after_terminator
                || matches!(
                    entry,
                    Entry::Target(_) | Entry::TryStart(_) | Entry::TryEnd(_) | Entry::Catch(_)
                );
            if starts_block && !self.blocks[&current].entries.is_empty() {
                current = self.start_block(active_region);
            }
            after_terminator = false;

            match entry {
                Entry::Target(label) => {
                    let previous = self.targets.insert(label, current);
                    assert!(previous.is_none(), "Duplicate target {label:?}.");
                }
                Entry::TryStart(region) => {
                    assert!(
                        active_region.is_none(),
                        "Nested or overlapping try regions."
                    );
                    active_region = Some(region);
                    self.blocks.get_mut(&current).unwrap().catch_region = active_region;
                }
                Entry::TryEnd(region) => {
                    assert_eq!(active_region, Some(region), "Mismatched try markers.");
                    active_region = None;
                    self.blocks.get_mut(&current).unwrap().catch_region = None;
                }
                Entry::Catch(region) => {
                    self.catches.entry(region).or_default().push(current);
                    self.blocks
                        .get_mut(&current)
                        .unwrap()
                        .entries
                        .push(Entry::Catch(region));
                }
                Entry::Inst(inst) => {
                    after_terminator = inst.is_terminator();
                    self.blocks
                        .get_mut(&current)
                        .unwrap()
                        .entries
                        .push(Entry::Inst(inst));
                }
                entry @ (Entry::Debug(_) | Entry::Position(_)) => {
                    self.blocks.get_mut(&current).unwrap().entries.push(entry);
                }
            }
        }
        assert!(active_region.is_none(), "Unterminated try region.");
    }

    /// Wire the ordinary edges by inspecting the terminator of every
    /// block. Fall-throughs and switch defaults become the default
    /// successor.
    fn connect_blocks(&mut self) {
        let ids: Vec<BlockId> = self.blocks.keys().copied().collect();
        let mut edges = Vec::new();
        let mut defaults = Vec::new();
        for (idx, &id) in ids.iter().enumerate() {
            let next = ids.get(idx + 1).copied();
            let terminator = self.blocks[&id]
                .entries
                .iter()
                .rev()
                .find_map(Entry::as_inst)
                .filter(|inst| inst.is_terminator())
                .cloned();
            match terminator {
                Some(Inst::Goto { target }) => {
                    edges.push((id, self.resolve_target(target), EdgeKind::Goto));
                }
                Some(Inst::Branch { target, .. }) => {
                    edges.push((id, self.resolve_target(target), EdgeKind::Branch));
                    let fall = next.expect("Conditional branch at the end of the method.");
                    edges.push((id, fall, EdgeKind::Goto));
                    defaults.push((id, fall));
                }
                Some(Inst::Switch { cases, .. }) => {
                    for case in cases {
                        edges.push((id, self.resolve_target(case), EdgeKind::Branch));
                    }
                    let fall = next.expect("Switch at the end of the method.");
                    edges.push((id, fall, EdgeKind::Goto));
                    defaults.push((id, fall));
                }
                Some(Inst::Return { .. } | Inst::Throw { .. }) => {}
                Some(Inst::Op { .. }) => unreachable!("Terminator expected."),
                None => {
                    if let Some(fall) = next {
                        edges.push((id, fall, EdgeKind::Goto));
                        defaults.push((id, fall));
                    } else {
                        // A residue of stripped markers may trail the
                        // last terminator; anything else has to end
                        // the method explicitly.
                        assert!(
                            self.blocks[&id].entries.iter().all(|e| e.as_inst().is_none()),
                            "Control falls off the end of the method."
                        );
                    }
                }
            }
        }
        for (src, target, kind) in edges {
            self.add_edge(src, target, kind);
        }
        for (id, fall) in defaults {
            self.blocks.get_mut(&id).unwrap().default_succ = Some(fall);
        }
    }

    /// Every block covered by a try region throws into every handler
    /// of the region's chain, in declaration order.
    fn add_catch_edges(&mut self) {
        let mut edges = Vec::new();
        for (&id, block) in &self.blocks {
            let Some(region) = block.catch_region
            else {
                continue;
            };
            let handlers = self
                .catches
                .get(&region)
                .unwrap_or_else(|| panic!("Try region without catch handlers {region:?}."));
            for &handler in handlers {
                edges.push((id, handler, EdgeKind::Throw));
            }
        }
        for (src, target, kind) in edges {
            self.add_edge(src, target, kind);
        }
    }

    /// Drop everything unreachable from the entry: first the edges
    /// leaving dead blocks, then the blocks themselves together with
    /// the target and handler table rows referring to them.
    fn remove_unreachable_blocks(&mut self) {
        let mut reachable = HashSet::from([self.entry]);
        let mut worklist = vec![self.entry];
        while let Some(current) = worklist.pop() {
            for edge in self.blocks[&current].succs.clone() {
                let target = self.edge(edge).target;
                if reachable.insert(target) {
                    worklist.push(target);
                }
            }
        }

        let dead: Vec<BlockId> = self
            .blocks
            .keys()
            .copied()
            .filter(|id| !reachable.contains(id))
            .collect();
        for &id in &dead {
            for edge in self.blocks[&id].succs.clone() {
                self.remove_edge(edge);
            }
            for edge in self.blocks[&id].preds.clone() {
                self.remove_edge(edge);
            }
        }
        for id in dead {
            self.blocks.remove(&id);
            self.targets.retain(|_, &mut target| target != id);
            for handlers in self.catches.values_mut() {
                handlers.retain(|&handler| handler != id);
            }
        }
        self.catches.retain(|_, handlers| !handlers.is_empty());
    }

    /// Determine where the exit block is. If there is more than one
    /// block without successors, synthesize a ghost block that is the
    /// successor of all of them.
    fn calculate_exit_block(&mut self) {
        let exits: Vec<BlockId> = self
            .blocks
            .values()
            .filter(|block| block.succs.is_empty())
            .map(Block::id)
            .collect();
        match exits.as_slice() {
            [] => self.exit = None,
            [exit] => self.exit = Some(*exit),
            _ => {
                let ghost = self.blocks.keys().next_back().unwrap() + 1;
                self.blocks.insert(
                    ghost,
                    Block {
                        id: ghost,
                        ..Block::default()
                    },
                );
                for exit in exits {
                    self.add_edge(exit, ghost, EdgeKind::Goto);
                }
                self.ghost = Some(ghost);
                self.exit = Some(ghost);
            }
        }
    }

    fn sanity_check(&self) {
        for (&id, block) in &self.blocks {
            assert!(
                id == self.entry || !block.preds.is_empty(),
                "Non-entry block without predecessors."
            );
            for &edge in &block.succs {
                let edge = self.edge(edge);
                assert_eq!(edge.src, id);
                assert!(self.blocks.contains_key(&edge.target));
            }
            for &edge in &block.preds {
                let edge_ref = self.edge(edge);
                assert_eq!(edge_ref.target, id);
                assert!(self.blocks[&edge_ref.src].succs.contains(&edge));
            }
            if let Some(default) = block.default_succ {
                assert!(
                    block.succs.iter().any(|&edge| {
                        let edge = self.edge(edge);
                        edge.kind == EdgeKind::Goto && edge.target == default
                    }),
                    "Default successor without a goto edge."
                );
            }
            let mut seen = HashSet::new();
            for &edge in &block.succs {
                let edge = self.edge(edge);
                assert!(
                    seen.insert((edge.target, edge.kind)),
                    "Duplicate edge between two blocks."
                );
            }
        }
    }

    fn start_block(&mut self, region: Option<TryId>) -> BlockId {
        let id = self.blocks.keys().next_back().map_or(0, |last| last + 1);
        self.blocks.insert(
            id,
            Block {
                id,
                catch_region: region,
                ..Block::default()
            },
        );
        id
    }

    fn add_edge(&mut self, src: BlockId, target: BlockId, kind: EdgeKind) {
        let duplicate = self.blocks[&src].succs.iter().any(|&edge| {
            let edge = self.edge(edge);
            edge.target == target && edge.kind == kind
        });
        if duplicate {
            return;
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(Edge { src, target, kind }));
        self.blocks.get_mut(&src).unwrap().succs.push(id);
        self.blocks.get_mut(&target).unwrap().preds.push(id);
    }

    fn remove_edge(&mut self, edge: EdgeId) {
        let Some(Edge { src, target, .. }) = self.edges[edge.0].take()
        else {
            return;
        };
        self.blocks
            .get_mut(&src)
            .unwrap()
            .succs
            .retain(|&e| e != edge);
        self.blocks
            .get_mut(&target)
            .unwrap()
            .preds
            .retain(|&e| e != edge);
    }

    fn resolve_target(&self, label: Label) -> BlockId {
        *self
            .targets
            .get(&label)
            .unwrap_or_else(|| panic!("Dangling branch target {label:?}."))
    }

    fn fresh_label(
        &self,
        identifiers: &mut IdentifierTable,
        labeled: &HashMap<BlockId, Label>,
    ) -> Label {
        let mut counter = self.blocks.len();
        loop {
            let label = Label(identifiers.get_identifier(&format!(".L{counter}")));
            if !self.targets.contains_key(&label) && !labeled.values().any(|&used| used == label) {
                return label;
            }
            counter += 1;
        }
    }

    /// Convert the graph back to a flat entry stream equivalent to
    /// it, consuming the graph. Blocks are emitted in id order with
    /// the entry first, which keeps every fall-through adjacent to
    /// its default successor; an explicit goto is appended where it
    /// is not. Contiguous runs of blocks sharing a catch region are
    /// wrapped in try markers, unconditional branches to the next
    /// emitted block are dropped, and exactly the blocks referenced
    /// by a surviving branch receive a target entry, with the branch
    /// operands rewritten to those canonical labels.
    ///
    /// Rebuilding a graph from the result reproduces the block and
    /// edge structure, except that a block reduced to a dropped goto
    /// merges into its successor; linearizing again afterwards yields
    /// the identical stream.
    pub fn linearize(mut self, identifiers: &mut IdentifierTable) -> Vec<Entry> {
        let order: Vec<BlockId> = self
            .blocks
            .keys()
            .copied()
            .filter(|&id| Some(id) != self.ghost)
            .collect();

        // Canonical labels for every block targeted by an emitted
        // branch. First pass so the emission below can rewrite all
        // operands, including forward references.
        let mut labeled: HashMap<BlockId, Label> = HashMap::new();
        for (idx, &id) in order.iter().enumerate() {
            for entry in &self.blocks[&id].entries {
                let Some(inst) = entry.as_inst()
                else {
                    continue;
                };
                if let Inst::Goto { target } = inst {
                    if Some(self.resolve_target(*target)) == order.get(idx + 1).copied() {
                        continue;
                    }
                }
                for label in inst.branch_targets() {
                    let target = self.resolve_target(label);
                    labeled.entry(target).or_insert(label);
                }
            }
        }
        let mut appended_gotos: HashMap<BlockId, Label> = HashMap::new();
        for (idx, &id) in order.iter().enumerate() {
            let Some(default) = self.blocks[&id].default_succ
            else {
                continue;
            };
            if order.get(idx + 1) == Some(&default) {
                continue;
            }
            let label = match labeled.get(&default) {
                Some(&label) => label,
                None => {
                    let label = self.fresh_label(identifiers, &labeled);
                    labeled.insert(default, label);
                    label
                }
            };
            appended_gotos.insert(id, label);
        }

        let mut result = Vec::new();
        let mut current_region = None;
        for (idx, &id) in order.iter().enumerate() {
            let entries = std::mem::take(&mut self.blocks.get_mut(&id).unwrap().entries);
            let region = self.blocks[&id].catch_region;
            if region != current_region {
                if let Some(closed) = current_region {
                    result.push(Entry::TryEnd(closed));
                }
                if let Some(opened) = region {
                    result.push(Entry::TryStart(opened));
                }
                current_region = region;
            }
            if let Some(&label) = labeled.get(&id) {
                result.push(Entry::Target(label));
            }
            for entry in entries {
                let rewritten = match entry {
                    Entry::Inst(Inst::Goto { target })
                        if Some(self.resolve_target(target)) == order.get(idx + 1).copied() =>
                    {
                        continue
                    }
                    Entry::Inst(Inst::Goto { target }) => Entry::Inst(Inst::Goto {
                        target: labeled[&self.resolve_target(target)],
                    }),
                    Entry::Inst(Inst::Branch { cond, target }) => Entry::Inst(Inst::Branch {
                        cond,
                        target: labeled[&self.resolve_target(target)],
                    }),
                    Entry::Inst(Inst::Switch { scrutinee, cases }) => Entry::Inst(Inst::Switch {
                        scrutinee,
                        cases: cases
                            .into_iter()
                            .map(|case| labeled[&self.resolve_target(case)])
                            .collect(),
                    }),
                    entry => entry,
                };
                result.push(rewritten);
            }
            if let Some(&label) = appended_gotos.get(&id) {
                result.push(Entry::Inst(Inst::Goto { target: label }));
            }
        }
        if let Some(closed) = current_region {
            result.push(Entry::TryEnd(closed));
        }
        result
    }
}

impl CfgBlock for Block {
    type Operation = Entry;

    fn operations(&self) -> &[Self::Operation] {
        &self.entries
    }
}

impl ControlFlowGraph for Cfg {
    type Block = Block;
    type NodeId = BlockId;
    type EdgeId = EdgeId;

    fn entry(&self) -> BlockId {
        self.entry
    }

    fn exit(&self) -> Option<BlockId> {
        self.exit
    }

    fn blocks(&self) -> Vec<BlockId> {
        self.blocks.keys().copied().collect()
    }

    fn block(&self, node: BlockId) -> &Block {
        &self.blocks[&node]
    }

    fn successors(&self, node: BlockId) -> Vec<EdgeId> {
        self.blocks[&node].succs.clone()
    }

    fn predecessors(&self, node: BlockId) -> Vec<EdgeId> {
        self.blocks[&node].preds.clone()
    }

    fn source(&self, edge: EdgeId) -> BlockId {
        self.edge(edge).src()
    }

    fn target(&self, edge: EdgeId) -> BlockId {
        self.edge(edge).target()
    }

    fn edge_kind(&self, edge: EdgeId) -> EdgeKind {
        self.edge(edge).kind()
    }
}

/// Forward iterator over the instructions of a graph. Entries of the
/// same block are visited in order, blocks in id order. The borrow of
/// the graph makes structural mutation during iteration impossible.
pub struct InstructionIterator<'cfg> {
    blocks: std::collections::btree_map::Values<'cfg, BlockId, Block>,
    current: std::slice::Iter<'cfg, Entry>,
}

impl<'cfg> Iterator for InstructionIterator<'cfg> {
    type Item = &'cfg Inst;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for entry in self.current.by_ref() {
                if let Some(inst) = entry.as_inst() {
                    return Some(inst);
                }
            }
            match self.blocks.next() {
                Some(block) => self.current = block.entries.iter(),
                None => return None,
            }
        }
    }
}

/// Render the graph of a method in the DOT graph description
/// language.
pub fn print(method_name: &str, cfg: &Cfg, unit: &Unit) -> String {
    analysis::cfg::print(Some(&format!("\"{method_name}\"")), cfg, |entry| {
        ir::print_entry(entry, unit)
    })
}
