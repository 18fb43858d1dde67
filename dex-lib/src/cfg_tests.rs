use analysis::analyses::{calculate_dominators, immediate_dominators};
use analysis::cfg::{get_back_edges, ControlFlowGraph, EdgeKind};

use crate::cfg::{BlockId, Cfg};
use crate::ir::{print_inst, Entry, Inst, Label, TryId, Unit};
use crate::lexer::Identifier;
use crate::parser_tests::parse_string;

fn build(source: &str) -> (Cfg, Unit) {
    let unit = parse_string(source).expect("Failed to parse the input.");
    let cfg = Cfg::new(unit.methods[0].entries.clone());
    (cfg, unit)
}

fn ident(unit: &Unit, name: &str) -> Identifier {
    Identifier(
        unit.identifiers
            .0
            .iter()
            .position(|interned| interned == name)
            .expect("Unknown identifier."),
    )
}

fn edge_set(cfg: &Cfg) -> Vec<(BlockId, BlockId, EdgeKind)> {
    let mut result = Vec::new();
    for node in cfg.blocks() {
        for edge in cfg.successors(node) {
            result.push((cfg.source(edge), cfg.target(edge), cfg.edge_kind(edge)));
        }
    }
    result.sort();
    result
}

fn instructions(cfg: &Cfg, unit: &Unit) -> Vec<String> {
    cfg.instructions()
        .map(|inst| print_inst(inst, unit))
        .collect()
}

use EdgeKind::*;

#[test]
fn straight_line_single_block() {
    let (cfg, unit) = build(
        r"@main {
  const v0;
  mul v1 v0 v0;
  return v1;
}
",
    );

    assert_eq!(cfg.num_blocks(), 1);
    assert_eq!(cfg.entry_block(), 0);
    assert_eq!(cfg.exit_block(), Some(0));
    assert!(cfg.successors(0).is_empty());
    assert!(cfg.predecessors(0).is_empty());
    assert_eq!(
        instructions(&cfg, &unit),
        vec!["const v0;", "mul v1 v0 v0;", "return v1;"]
    );
}

const DIAMOND: &str = r"@main {
  const v0;
  if v0 .else;
  add v1;
  goto .end;
.else:
  sub v1;
.end:
  return v1;
}
";

#[test]
fn diamond_blocks_and_edges() {
    let (cfg, unit) = build(DIAMOND);

    assert_eq!(cfg.num_blocks(), 4);
    assert_eq!(
        edge_set(&cfg),
        vec![(0, 1, Goto), (0, 2, Branch), (1, 3, Goto), (2, 3, Goto)]
    );
    assert_eq!(cfg.entry_block(), 0);
    assert_eq!(cfg.exit_block(), Some(3));
    // The merge block has both arms as predecessors.
    assert_eq!(cfg.predecessors(3).len(), 2);

    // Fall-throughs and implicit continuations are the default
    // successors, explicit branches have none.
    assert_eq!(cfg.get_block(0).default_successor(), Some(1));
    assert_eq!(cfg.get_block(1).default_successor(), None);
    assert_eq!(cfg.get_block(2).default_successor(), Some(3));

    // Target markers are consumed by the construction.
    for node in cfg.blocks() {
        for entry in cfg.get_block(node).entries() {
            assert!(!matches!(
                entry,
                Entry::Target(_) | Entry::TryStart(_) | Entry::TryEnd(_)
            ));
        }
    }

    assert_eq!(
        instructions(&cfg, &unit),
        vec![
            "const v0;",
            "if v0 .else;",
            "add v1;",
            "goto .end;",
            "sub v1;",
            "return v1;"
        ]
    );
}

#[test]
fn diamond_dominators() {
    let (cfg, _) = build(DIAMOND);

    let idoms = immediate_dominators(&cfg);
    assert_eq!(idoms[&0].dom, 0);
    assert_eq!(idoms[&1].dom, 0);
    assert_eq!(idoms[&2].dom, 0);
    // The merge block is dominated by the branch, not by either arm.
    assert_eq!(idoms[&3].dom, 0);

    let dominators = calculate_dominators(&cfg, 20);
    assert!(dominators.dominates(0, 3));
    assert!(!dominators.dominates(1, 3));
    assert!(!dominators.dominates(2, 3));
}

#[test]
fn diamond_linearize_is_identity() {
    let (cfg, mut unit) = build(DIAMOND);

    let linearized = cfg.linearize(&mut unit.identifiers);
    assert_eq!(linearized, unit.methods[0].entries);
}

#[test]
fn diamond_dot_dump() {
    let (cfg, unit) = build(DIAMOND);

    let printed = crate::cfg::print("@main", &cfg, &unit);
    let expected = r#"digraph "@main" {
  B0[label="B0\nconst v0;\nif v0 .else;"]
  B1[label="B1\nadd v1;\ngoto .end;"]
  B2[label="B2\nsub v1;"]
  B3[label="B3\nreturn v1;"]

  B0 -> B2[label="branch"]
  B0 -> B1[label="goto"]
  B1 -> B3[label="goto"]
  B2 -> B3[label="goto"]
}
"#;
    assert_eq!(printed, expected);
}

const LOOP: &str = r"@main {
.head:
  dec v0;
  if v0 .head;
  return;
}
";

#[test]
fn loop_back_edge() {
    let (cfg, _) = build(LOOP);

    assert_eq!(cfg.num_blocks(), 2);
    assert_eq!(edge_set(&cfg), vec![(0, 0, Branch), (0, 1, Goto)]);
    // A branch back to the first instruction gives the entry a
    // predecessor.
    assert_eq!(cfg.predecessors(0).len(), 1);
    assert_eq!(cfg.exit_block(), Some(1));
    assert!(get_back_edges(&cfg).contains(&(0, 0)));

    let idoms = immediate_dominators(&cfg);
    assert_eq!(idoms[&0].dom, 0);
    assert_eq!(idoms[&1].dom, 0);
}

#[test]
fn loop_linearize_is_identity() {
    let (cfg, mut unit) = build(LOOP);

    let linearized = cfg.linearize(&mut unit.identifiers);
    assert_eq!(linearized, unit.methods[0].entries);
}

const TRY_CATCH: &str = r"@main {
  .try_start T;
  const v0;
  throw v0;
  .try_end T;
  .catch T;
  const v1;
  return v1;
}
";

#[test]
fn try_catch_throw_edge() {
    let (cfg, unit) = build(TRY_CATCH);

    assert_eq!(cfg.num_blocks(), 2);
    assert_eq!(edge_set(&cfg), vec![(0, 1, Throw)]);

    let region = TryId(ident(&unit, "T"));
    assert_eq!(cfg.get_block(0).catch_region(), Some(region));
    assert_eq!(cfg.get_block(1).catch_region(), None);
    assert_eq!(cfg.catch_handlers(region), &[1]);
    assert!(cfg.get_block(1).is_catch());
    assert!(!cfg.get_block(0).is_catch());

    // The throwing block has a successor, so the handler is the exit.
    assert_eq!(cfg.exit_block(), Some(1));
}

#[test]
fn try_catch_linearize_round_trip() {
    let (cfg, mut unit) = build(TRY_CATCH);
    let edges = edge_set(&cfg);

    let linearized = cfg.linearize(&mut unit.identifiers);
    assert_eq!(linearized, unit.methods[0].entries);

    let rebuilt = Cfg::new(linearized.clone());
    assert_eq!(edge_set(&rebuilt), edges);
    assert_eq!(rebuilt.linearize(&mut unit.identifiers), linearized);
}

#[test]
fn try_region_spanning_multiple_blocks() {
    let (cfg, mut unit) = build(
        r"@main {
  .try_start T;
  const v0;
  if v0 .more;
  throw;
.more:
  throw v0;
  .try_end T;
  .catch T;
  return;
}
",
    );

    let region = TryId(ident(&unit, "T"));
    assert_eq!(cfg.num_blocks(), 4);
    for covered in [0, 1, 2] {
        assert_eq!(cfg.get_block(covered).catch_region(), Some(region));
    }
    assert_eq!(
        edge_set(&cfg),
        vec![
            (0, 1, Goto),
            (0, 2, Branch),
            (0, 3, Throw),
            (1, 3, Throw),
            (2, 3, Throw)
        ]
    );

    // One contiguous marker run suffices for the whole region.
    let linearized = cfg.linearize(&mut unit.identifiers);
    assert_eq!(linearized, unit.methods[0].entries);
}

#[test]
fn catch_chain_order() {
    let (cfg, unit) = build(
        r"@main {
  .try_start T;
  throw;
  .try_end T;
  .catch T;
  one v0;
  return;
  .catch T;
  two v0;
  return;
}
",
    );

    let region = TryId(ident(&unit, "T"));
    assert_eq!(cfg.catch_handlers(region), &[1, 2]);
    // Throw edges follow the declaration order of the chain.
    let succs: Vec<_> = cfg
        .successors(0)
        .into_iter()
        .map(|edge| (cfg.target(edge), cfg.edge_kind(edge)))
        .collect();
    assert_eq!(succs, vec![(1, Throw), (2, Throw)]);

    // Two returns force a synthesized exit.
    assert_eq!(cfg.exit_block(), Some(3));
    assert!(cfg.get_block(3).entries().is_empty());
}

#[test]
fn unreachable_blocks_are_pruned() {
    let (cfg, unit) = build(
        r"@main {
  goto .next;
  dead v0;
.next:
  return;
}
",
    );

    // The skipped block is dropped entirely; ids stay stable.
    assert_eq!(cfg.num_blocks(), 2);
    assert_eq!(cfg.blocks(), vec![0, 2]);
    assert_eq!(edge_set(&cfg), vec![(0, 2, Goto)]);
    assert!(instructions(&cfg, &unit)
        .iter()
        .all(|inst| !inst.starts_with("dead")));
}

#[test]
fn linearize_drops_redundant_goto() {
    let (cfg, mut unit) = build(
        r"@main {
  goto .next;
  dead v0;
.next:
  return;
}
",
    );

    // The goto targets the next emitted block, so it is dropped and
    // its block merges into the successor on a rebuild. A second
    // round trip is stable.
    let linearized = cfg.linearize(&mut unit.identifiers);
    assert_eq!(linearized, vec![Entry::Inst(Inst::Return { value: None })]);

    let rebuilt = Cfg::new(linearized.clone());
    assert_eq!(rebuilt.num_blocks(), 1);
    assert_eq!(rebuilt.linearize(&mut unit.identifiers), linearized);
}

#[test]
fn ghost_exit_block() {
    let (cfg, mut unit) = build(
        r"@main {
  const v0;
  if v0 .other;
  return v0;
.other:
  return;
}
",
    );

    // Two returns: a ghost block with no entries collects them.
    assert_eq!(cfg.num_blocks(), 4);
    let ghost = cfg.exit_block().expect("No exit block.");
    assert_eq!(ghost, 3);
    assert!(cfg.get_block(ghost).entries().is_empty());
    assert_eq!(
        edge_set(&cfg),
        vec![
            (0, 1, Goto),
            (0, 2, Branch),
            (1, 3, Goto),
            (2, 3, Goto)
        ]
    );

    // The ghost block never shows up in the linearized stream.
    let linearized = cfg.linearize(&mut unit.identifiers);
    assert_eq!(linearized, unit.methods[0].entries);
}

#[test]
fn switch_edges() {
    let (cfg, mut unit) = build(
        r"@main {
  const v0;
  switch v0 .a .b;
  fall v1;
  goto .end;
.a:
  aaa v1;
  goto .end;
.b:
  bbb v1;
.end:
  return;
}
",
    );

    assert_eq!(cfg.num_blocks(), 5);
    assert_eq!(
        edge_set(&cfg),
        vec![
            (0, 1, Goto),
            (0, 2, Branch),
            (0, 3, Branch),
            (1, 4, Goto),
            (2, 4, Goto),
            (3, 4, Goto)
        ]
    );
    // The switch default is the fall-through.
    assert_eq!(cfg.get_block(0).default_successor(), Some(1));

    let linearized = cfg.linearize(&mut unit.identifiers);
    assert_eq!(linearized, unit.methods[0].entries);
}

#[test]
fn switch_duplicate_case_targets_share_an_edge() {
    let (cfg, _) = build(
        r"@main {
  switch v0 .a .a;
  nop;
.a:
  return;
}
",
    );

    // Exactly one edge per (source, target, kind).
    assert_eq!(
        edge_set(&cfg),
        vec![(0, 1, Goto), (0, 2, Branch), (1, 2, Goto)]
    );
}

#[test]
fn branch_to_fall_through_keeps_both_edges() {
    let (cfg, _) = build(
        r"@main {
  if v0 .next;
.next:
  return;
}
",
    );

    // Same endpoints, different kinds: both edges are kept.
    assert_eq!(edge_set(&cfg), vec![(0, 1, Goto), (0, 1, Branch)]);
    assert_eq!(cfg.get_block(0).default_successor(), Some(1));
}

#[test]
fn debug_entries_travel_with_their_block() {
    let (mut cfg, unit) = build(
        r"@main {
  .pos 10;
  const v0;
  .debug tag;
  .pos 11;
  return v0;
}
",
    );

    assert_eq!(cfg.num_blocks(), 1);
    assert_eq!(cfg.get_block(0).entries().len(), 5);

    cfg.get_block_mut(0).remove_debug_line_info();
    let entries = cfg.get_block(0).entries().to_vec();
    assert!(!entries.iter().any(|e| matches!(e, Entry::Position(_))));
    assert!(entries.iter().any(|e| matches!(e, Entry::Debug(_))));
    assert_eq!(instructions(&cfg, &unit).len(), 2);
}

#[test]
fn infinite_loop_has_no_exit() {
    let (cfg, _) = build(
        r"@main {
.spin:
  nop;
  goto .spin;
}
",
    );

    assert_eq!(cfg.num_blocks(), 1);
    assert_eq!(cfg.exit_block(), None);
}

#[test]
#[should_panic(expected = "Dangling branch target")]
fn dangling_target_aborts() {
    Cfg::new(vec![Entry::Inst(Inst::Goto {
        target: Label(Identifier(0)),
    })]);
}

#[test]
#[should_panic(expected = "Cannot build a graph from an empty stream")]
fn empty_stream_aborts() {
    Cfg::new(Vec::new());
}

#[test]
#[should_panic(expected = "Control falls off the end of the method")]
fn missing_terminator_aborts() {
    Cfg::new(vec![Entry::Inst(Inst::Op {
        mnemonic: Identifier(0),
        args: Vec::new(),
    })]);
}

#[test]
#[should_panic(expected = "Conditional branch at the end of the method")]
fn trailing_conditional_branch_aborts() {
    Cfg::new(vec![
        Entry::Target(Label(Identifier(0))),
        Entry::Inst(Inst::Branch {
            cond: Identifier(1),
            target: Label(Identifier(0)),
        }),
    ]);
}

#[test]
#[should_panic(expected = "Nested or overlapping try regions")]
fn nested_try_regions_abort() {
    Cfg::new(vec![
        Entry::TryStart(TryId(Identifier(0))),
        Entry::TryStart(TryId(Identifier(1))),
        Entry::Inst(Inst::Return { value: None }),
    ]);
}

#[test]
#[should_panic(expected = "Mismatched try markers")]
fn mismatched_try_markers_abort() {
    Cfg::new(vec![
        Entry::TryStart(TryId(Identifier(0))),
        Entry::Inst(Inst::Op {
            mnemonic: Identifier(2),
            args: Vec::new(),
        }),
        Entry::TryEnd(TryId(Identifier(1))),
        Entry::Inst(Inst::Return { value: None }),
    ]);
}

#[test]
#[should_panic(expected = "Unterminated try region")]
fn unterminated_try_region_aborts() {
    Cfg::new(vec![
        Entry::TryStart(TryId(Identifier(0))),
        Entry::Inst(Inst::Return { value: None }),
    ]);
}

#[test]
#[should_panic(expected = "Try region without catch handlers")]
fn try_region_without_handlers_aborts() {
    Cfg::new(vec![
        Entry::TryStart(TryId(Identifier(0))),
        Entry::Inst(Inst::Op {
            mnemonic: Identifier(1),
            args: Vec::new(),
        }),
        Entry::TryEnd(TryId(Identifier(0))),
        Entry::Inst(Inst::Return { value: None }),
    ]);
}
