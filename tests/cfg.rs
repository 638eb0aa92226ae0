//! CFG integration tests.
//!
//! These tests drive the public graph API end to end:
//! 1. Build a CFG from a structured instruction stream
//! 2. Inspect blocks, edges and the text dump
//! 3. Mutate the graph and verify the invariants still hold
//! 4. Query dominance before and after mutation
//! 5. Compare dominance on arbitrary graphs against plain reachability

use simdcfg::{
    cfg::{ControlFlowGraph, DependencyClass, EdgeKind},
    ir::{Instruction, Opcode, Reg},
    Error, Result,
};

fn alu(n: u32) -> Instruction {
    Instruction::new(Opcode::Add)
        .dst(Reg::vgrf(n))
        .src(Reg::vgrf(n))
        .src(Reg::imm(1))
}

fn op(opcode: Opcode) -> Instruction {
    Instruction::new(opcode)
}

/// `a; if { b } else { c } endif; d`
fn diamond() -> ControlFlowGraph {
    ControlFlowGraph::build(vec![
        alu(0),
        op(Opcode::If).predicated(false),
        alu(1),
        op(Opcode::Else),
        alu(2),
        op(Opcode::Endif),
        alu(3),
    ])
}

fn edge(cfg: &ControlFlowGraph, from: usize, to: usize) -> Option<EdgeKind> {
    let from = cfg.block(cfg.id_at(from)?);
    from.child_kind(cfg.id_at(to)?)
}

/// Sequence numbers and instruction ranges of all blocks.
fn layout(cfg: &ControlFlowGraph) -> Vec<(usize, usize, usize)> {
    cfg.blocks()
        .map(|b| (b.num(), b.start_ip(), b.len()))
        .collect()
}

#[test]
fn test_diamond_structure() -> Result<()> {
    let cfg = diamond();
    cfg.check()?;

    assert_eq!(layout(&cfg), vec![(0, 0, 2), (1, 2, 2), (2, 4, 1), (3, 5, 2)]);
    assert_eq!(cfg.num_instructions(), 7);

    // Every edge is recorded on both endpoints with the same kind.
    for block in cfg.blocks() {
        for link in block.children() {
            let child = cfg.block(link.block);
            assert_eq!(child.parent_kind(block.id()), Some(link.kind));
        }
    }
    assert_eq!(edge(&cfg, 1, 2), Some(EdgeKind::Physical));
    assert_eq!(edge(&cfg, 0, 3), None);
    Ok(())
}

#[test]
fn test_diamond_dump() {
    let dump = diamond().dump();
    let markers: Vec<_> = dump
        .lines()
        .filter(|l| l.starts_with("START") || l.starts_with("END"))
        .collect();
    assert_eq!(
        markers,
        vec![
            "START B0 IDOM(none)",
            "END B0 ->B1 ->B2",
            "START B1 IDOM(B0) <-B0",
            "END B1 ~>B2 ->B3",
            "START B2 IDOM(B0) <-B0 <~B1",
            "END B2 ->B3",
            "START B3 IDOM(B0) <-B1 <-B2",
            "END B3",
        ]
    );
    // Instructions carry their global index.
    assert!(dump.lines().any(|l| l.starts_with("   6: ")), "{dump}");
}

#[test]
fn test_flattening_restores_program_order() {
    let cfg = diamond();
    let ops: Vec<_> = cfg.into_instructions().into_iter().map(|i| i.opcode).collect();
    assert_eq!(
        ops,
        vec![
            Opcode::Add,
            Opcode::If,
            Opcode::Add,
            Opcode::Else,
            Opcode::Add,
            Opcode::Endif,
            Opcode::Add,
        ]
    );
}

#[test]
fn test_removing_last_instruction_splices_block() -> Result<()> {
    let mut cfg = diamond();
    let else_block = cfg.id_at(2).unwrap();
    let removed = cfg.remove_instruction(else_block, 0).unwrap();
    assert_eq!(removed.dst, Reg::vgrf(2));

    cfg.check()?;
    assert!(cfg.get(else_block).is_none());
    assert_eq!(layout(&cfg), vec![(0, 0, 2), (1, 2, 2), (2, 4, 2)]);
    // The parents of the removed block now reach its child directly; the
    // existing logical ELSE edge is not weakened by the spliced physical one.
    assert_eq!(edge(&cfg, 0, 2), Some(EdgeKind::Logical));
    assert_eq!(edge(&cfg, 1, 2), Some(EdgeKind::Logical));
    assert!(matches!(cfg.remove_block(else_block), Err(Error::UnknownBlock(_))));
    Ok(())
}

#[test]
fn test_merge_and_split() -> Result<()> {
    let mut cfg = ControlFlowGraph::build(vec![alu(0), alu(1), alu(2)]);
    let entry = cfg.entry();

    let tail = cfg.split_block(entry, 1).unwrap();
    cfg.check()?;
    assert_eq!(layout(&cfg), vec![(0, 0, 1), (1, 1, 2)]);
    assert!(cfg.can_combine(entry, tail));
    assert!(!cfg.can_combine(tail, entry));

    assert!(cfg.merge(entry, tail));
    cfg.check()?;
    assert_eq!(layout(&cfg), vec![(0, 0, 3)]);
    assert!(matches!(cfg.remove_block(entry), Err(Error::InvalidCfg { .. })));
    Ok(())
}

#[test]
fn test_merge_refuses_control_flow_boundary() {
    let mut cfg = diamond();
    let (b0, b1) = (cfg.id_at(0).unwrap(), cfg.id_at(1).unwrap());
    assert!(!cfg.can_combine(b0, b1));
    assert!(!cfg.merge(b0, b1));
    assert_eq!(cfg.num_blocks(), 4);
}

#[test]
fn test_dominance_is_cached_per_generation() {
    let mut cfg = diamond();
    let generation = cfg.generation();
    assert!(cfg.dominance().is_current(&cfg));
    assert_eq!(cfg.dominance().immediate_dominator(3), Some(0));
    assert!(cfg.dominance().dominates(0, 2));
    assert!(!cfg.dominance().dominates(1, 3));

    // Instruction-level changes keep the block structure and the tree.
    cfg.invalidate(DependencyClass::INSTRUCTION_DETAIL);
    assert_eq!(cfg.generation(), generation);

    let else_block = cfg.id_at(2).unwrap();
    cfg.remove_instruction(else_block, 0);
    assert!(cfg.generation() > generation);
    assert!(cfg.dominance().is_current(&cfg));
    assert_eq!(cfg.dominance().len(), 3);
    assert_eq!(cfg.dominance().immediate_dominator(2), Some(0));
}

#[test]
fn test_loop_with_breaks_and_continues() -> Result<()> {
    let cfg = ControlFlowGraph::try_build(vec![
        op(Opcode::Do),
        alu(0),
        op(Opcode::Continue).predicated(false),
        alu(1),
        op(Opcode::Break).predicated(true),
        alu(2),
        op(Opcode::While).predicated(false),
        alu(3),
    ])?;
    cfg.check()?;

    // The loop header dominates the whole body, and every body block is
    // reachable from the entry.
    let dom = cfg.dominance();
    for num in 1..cfg.num_blocks() {
        assert!(dom.is_reachable(num), "B{num} unreachable");
        assert!(dom.dominates(0, num));
    }
    Ok(())
}

#[test]
fn test_malformed_nesting() {
    for stream in [
        vec![op(Opcode::Else)],
        vec![op(Opcode::Endif)],
        vec![op(Opcode::Break)],
        vec![op(Opcode::Continue)],
        vec![
            op(Opcode::If).predicated(false),
            op(Opcode::Else),
            op(Opcode::Else),
            op(Opcode::Endif),
        ],
    ] {
        let result = ControlFlowGraph::try_build(stream);
        assert!(matches!(result, Err(Error::Malformed { .. })));
    }
}

#[test]
fn test_dot_export() {
    let dot = diamond().to_dot(Some("diamond"));
    assert!(dot.contains("label=\"diamond\";"));
    assert!(dot.contains("B1 -> B2 [style=dashed];"));
    assert!(dot.contains("B2 -> B3;"));
}

/// Small deterministic generator so failures are reproducible.
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, n: usize) -> usize {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((self.0 >> 33) as usize) % n
    }
}

/// Blocks reachable from the entry without passing through `skip`.
fn reachable_avoiding(cfg: &ControlFlowGraph, skip: Option<usize>) -> Vec<bool> {
    let mut seen = vec![false; cfg.num_blocks()];
    if skip == Some(0) {
        return seen;
    }
    let mut stack = vec![0];
    seen[0] = true;
    while let Some(num) = stack.pop() {
        let block = cfg.block(cfg.id_at(num).unwrap());
        for link in block.children() {
            let child = cfg.block(link.block).num();
            if Some(child) != skip && !seen[child] {
                seen[child] = true;
                stack.push(child);
            }
        }
    }
    seen
}

/// `a` dominates `b` iff `b` is reachable and removing `a` cuts it off.
fn assert_dominance_matches_reachability(cfg: &ControlFlowGraph, context: &str) {
    cfg.check().unwrap_or_else(|e| panic!("{context}: {e}"));
    let tree = cfg.dominance();
    let reachable = reachable_avoiding(cfg, None);
    for a in 0..cfg.num_blocks() {
        let without_a = reachable_avoiding(cfg, Some(a));
        for b in 0..cfg.num_blocks() {
            let expected = reachable[b] && (a == b || !without_a[b]);
            assert_eq!(tree.dominates(a, b), expected, "{context}: does B{a} dominate B{b}?");
        }
        assert_eq!(tree.is_reachable(a), reachable[a], "{context}: B{a} reachability");
    }
}

fn random_graph(rng: &mut Lcg) -> ControlFlowGraph {
    let n = 2 + rng.below(7);
    let blocks = (0..n as u32).map(|i| vec![alu(i), alu(i + 100)]).collect();
    let mut edges = Vec::new();
    for from in 0..n {
        for _ in 0..rng.below(3) {
            let kind = if rng.below(4) == 0 {
                EdgeKind::Physical
            } else {
                EdgeKind::Logical
            };
            edges.push((from, rng.below(n), kind));
        }
    }
    ControlFlowGraph::from_parts(blocks, edges).unwrap()
}

#[test]
fn test_dominance_of_arbitrary_graphs() {
    let mut rng = Lcg(0x5eed);
    for round in 0..200 {
        let cfg = random_graph(&mut rng);
        assert_dominance_matches_reachability(&cfg, &format!("graph {round}"));
    }
}

#[test]
fn test_dominance_after_mutation() {
    let mut rng = Lcg(0xd0d0);
    for round in 0..60 {
        let mut cfg = random_graph(&mut rng);
        for step in 0..6 {
            let num = rng.below(cfg.num_blocks());
            let id = cfg.id_at(num).unwrap();
            match rng.below(4) {
                0 => {
                    if let Some(link) = cfg.block(id).children().first().copied() {
                        cfg.remove_edge(id, link.block);
                    }
                }
                1 => {
                    cfg.split_block(id, 1);
                }
                2 => {
                    if let Some(next) = cfg.next(id) {
                        cfg.merge(id, next);
                    }
                }
                _ => {
                    cfg.remove_instruction(id, 0);
                }
            }
            assert_dominance_matches_reachability(&cfg, &format!("graph {round} step {step}"));
        }
    }
}
