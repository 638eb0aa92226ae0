//! CFG construction from a flat structured-control-flow instruction stream.
//!
//! One linear scan cuts the stream into blocks at control-flow instructions
//! and inserts the edges that model SIMD divergence:
//!
//! | Opcode     | Edges added from the block it ends                                                   |
//! |------------|--------------------------------------------------------------------------------------|
//! | `IF`       | logical to the then-block                                                            |
//! | `ELSE`     | IF block logical to the else-block, then-block physical to the else-block            |
//! | `ENDIF`    | ELSE block (or IF block without ELSE) logical to the convergence block               |
//! | `DO`       | logical to the loop body, physical to the block after `WHILE`                        |
//! | `BREAK`    | physical to the DO block, logical past `WHILE`, to the next block by predication      |
//! | `CONTINUE` | logical to the loop body, to the next block by predication                           |
//! | `WHILE`    | logical to the DO block when predicated, to the loop body otherwise                  |
//!
//! Adding an edge that already exists keeps a single edge of the smaller kind.

use crate::{
    cfg::{BlockId, ControlFlowGraph, EdgeKind},
    error::malformed_error,
    ir::{Instruction, Opcode},
    Result,
};

/// Scan state: the current block plus the enclosing IF/ELSE/DO/WHILE context.
///
/// `cur_while` is allocated when its DO is seen and only enters program order
/// once the matching WHILE is reached.
struct CfgBuilder {
    cfg: ControlFlowGraph,
    cur: BlockId,
    ip: usize,
    cur_if: Option<BlockId>,
    cur_else: Option<BlockId>,
    cur_do: Option<BlockId>,
    cur_while: Option<BlockId>,
    if_stack: Vec<Option<BlockId>>,
    else_stack: Vec<Option<BlockId>>,
    do_stack: Vec<Option<BlockId>>,
    while_stack: Vec<Option<BlockId>>,
}

impl CfgBuilder {
    fn new() -> Self {
        let mut cfg = ControlFlowGraph::empty();
        let entry = cfg.alloc_block();
        cfg.place_block(entry, 0);
        Self {
            cfg,
            cur: entry,
            ip: 0,
            cur_if: None,
            cur_else: None,
            cur_do: None,
            cur_while: None,
            if_stack: Vec::new(),
            else_stack: Vec::new(),
            do_stack: Vec::new(),
            while_stack: Vec::new(),
        }
    }

    fn append(&mut self, inst: Instruction) {
        self.cfg.block_mut(self.cur).instructions.push(inst);
        self.ip += 1;
    }

    /// Places `block` after the current one and makes it current.
    fn set_next_block(&mut self, block: BlockId) {
        self.cfg.place_block(block, self.ip);
        self.cur = block;
    }

    fn link(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        self.cfg.add_edge(from, to, kind);
    }

    /// Opens a fresh block after the current one, reached with `kind`.
    fn open_successor(&mut self, kind: EdgeKind) {
        let next = self.cfg.alloc_block();
        self.link(self.cur, next, kind);
        self.set_next_block(next);
    }

    /// Reuses the current block if it is still empty, otherwise opens a new
    /// block reached by logical fallthrough.
    fn open_or_reuse(&mut self) -> BlockId {
        if self.cfg.block(self.cur).is_empty() {
            self.cur
        } else {
            let next = self.cfg.alloc_block();
            self.link(self.cur, next, EdgeKind::Logical);
            self.set_next_block(next);
            next
        }
    }

    /// The first block of the loop body, placed directly after the DO block.
    fn loop_body(&self, do_block: BlockId) -> Result<BlockId> {
        self.cfg
            .next(do_block)
            .ok_or_else(|| malformed_error!("loop at ip {} has no body block", self.ip))
    }

    fn innermost_loop(&self, what: Opcode) -> Result<(BlockId, BlockId)> {
        match (self.cur_do, self.cur_while) {
            (Some(d), Some(w)) => Ok((d, w)),
            _ => Err(malformed_error!("{} at ip {} outside of a loop", what, self.ip)),
        }
    }

    fn fallthrough_kind(inst: &Instruction) -> EdgeKind {
        if inst.is_predicated() {
            EdgeKind::Logical
        } else {
            EdgeKind::Physical
        }
    }

    fn visit(&mut self, inst: Instruction) -> Result<()> {
        match inst.opcode {
            Opcode::If => {
                self.append(inst);
                self.if_stack.push(self.cur_if);
                self.else_stack.push(self.cur_else);
                self.cur_if = Some(self.cur);
                self.cur_else = None;
                self.open_successor(EdgeKind::Logical);
            }
            Opcode::Else => {
                let if_block = self
                    .cur_if
                    .ok_or_else(|| malformed_error!("ELSE at ip {} without IF", self.ip))?;
                if self.cur_else.is_some() {
                    return Err(malformed_error!("second ELSE at ip {}", self.ip));
                }
                self.append(inst);
                self.cur_else = Some(self.cur);
                let next = self.cfg.alloc_block();
                self.link(if_block, next, EdgeKind::Logical);
                self.link(self.cur, next, EdgeKind::Physical);
                self.set_next_block(next);
            }
            Opcode::Endif => {
                let if_block = self
                    .cur_if
                    .ok_or_else(|| malformed_error!("ENDIF at ip {} without IF", self.ip))?;
                let endif_block = self.open_or_reuse();
                self.append(inst);
                let from = self.cur_else.unwrap_or(if_block);
                self.link(from, endif_block, EdgeKind::Logical);
                self.cur_if = self.if_stack.pop().flatten();
                self.cur_else = self.else_stack.pop().flatten();
            }
            Opcode::Do => {
                self.do_stack.push(self.cur_do);
                self.while_stack.push(self.cur_while);
                let while_block = self.cfg.alloc_block();
                self.cur_while = Some(while_block);
                let do_block = self.open_or_reuse();
                self.cur_do = Some(do_block);
                self.append(inst);
                let body = self.cfg.alloc_block();
                self.link(do_block, body, EdgeKind::Logical);
                self.link(do_block, while_block, EdgeKind::Physical);
                self.set_next_block(body);
            }
            Opcode::Break => {
                let (do_block, while_block) = self.innermost_loop(inst.opcode)?;
                let kind = Self::fallthrough_kind(&inst);
                self.append(inst);
                self.link(self.cur, do_block, EdgeKind::Physical);
                self.link(self.cur, while_block, EdgeKind::Logical);
                self.open_successor(kind);
            }
            Opcode::Continue => {
                let (do_block, _) = self.innermost_loop(inst.opcode)?;
                let body = self.loop_body(do_block)?;
                let kind = Self::fallthrough_kind(&inst);
                self.append(inst);
                self.link(self.cur, body, EdgeKind::Logical);
                self.open_successor(kind);
            }
            Opcode::While => {
                let (do_block, while_block) = self.innermost_loop(inst.opcode)?;
                let target = if inst.is_predicated() {
                    do_block
                } else {
                    self.loop_body(do_block)?
                };
                self.append(inst);
                self.link(self.cur, target, EdgeKind::Logical);
                self.set_next_block(while_block);
                self.cur_do = self.do_stack.pop().flatten();
                self.cur_while = self.while_stack.pop().flatten();
            }
            _ => self.append(inst),
        }
        Ok(())
    }

    fn finish(self) -> Result<ControlFlowGraph> {
        if self.cur_if.is_some() {
            return Err(malformed_error!("IF without ENDIF at end of stream"));
        }
        if self.cur_do.is_some() {
            return Err(malformed_error!("DO without WHILE at end of stream"));
        }
        Ok(self.cfg)
    }
}

impl ControlFlowGraph {
    /// Builds the CFG of an instruction stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the structured control flow is not
    /// properly nested.
    pub fn try_build(instructions: impl IntoIterator<Item = Instruction>) -> Result<Self> {
        let mut builder = CfgBuilder::new();
        for inst in instructions {
            builder.visit(inst)?;
        }
        let cfg = builder.finish()?;
        log::trace!(
            "built CFG with {} blocks, {} instructions",
            cfg.num_blocks(),
            cfg.num_instructions()
        );
        Ok(cfg)
    }

    /// Assembles a graph from explicit blocks and edges.
    ///
    /// `blocks` are given in program order and `edges` name blocks by their
    /// position. Unlike [`try_build`](Self::try_build) no structure is inferred,
    /// which makes this the way to construct shapes the builder never emits.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] for an edge naming a block that does
    /// not exist and [`crate::Error::InvalidCfg`] if the result fails
    /// [`check`](Self::check).
    pub fn from_parts(
        blocks: Vec<Vec<Instruction>>,
        edges: impl IntoIterator<Item = (usize, usize, EdgeKind)>,
    ) -> Result<Self> {
        if blocks.is_empty() {
            return Ok(Self::default());
        }
        let mut cfg = Self::empty();
        let mut ip = 0;
        for instructions in blocks {
            let id = cfg.alloc_block();
            cfg.place_block(id, ip);
            ip += instructions.len();
            cfg.block_mut(id).instructions = instructions;
        }
        for (from, to, kind) in edges {
            let (Some(a), Some(b)) = (cfg.id_at(from), cfg.id_at(to)) else {
                return Err(malformed_error!("edge B{} -> B{} names a missing block", from, to));
            };
            cfg.add_edge(a, b, kind);
        }
        cfg.check()?;
        Ok(cfg)
    }

    /// Builds the CFG of an instruction stream that is known to be well nested.
    ///
    /// # Panics
    ///
    /// Panics if the structured control flow is malformed; a producer emitting
    /// such a stream is broken.
    #[must_use]
    pub fn build(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        match Self::try_build(instructions) {
            Ok(cfg) => cfg,
            Err(e) => panic!("{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cfg::{ControlFlowGraph, EdgeKind},
        ir::{Instruction, Opcode, Reg},
        Error,
    };

    fn op(opcode: Opcode) -> Instruction {
        Instruction::new(opcode)
    }

    fn alu(nr: u32) -> Instruction {
        Instruction::new(Opcode::Add)
            .dst(Reg::vgrf(nr))
            .src(Reg::vgrf(nr))
            .src(Reg::imm(1))
    }

    fn kind(cfg: &ControlFlowGraph, from: usize, to: usize) -> Option<EdgeKind> {
        let from = cfg.id_at(from)?;
        let to = cfg.id_at(to)?;
        cfg.block(from).child_kind(to)
    }

    fn lens(cfg: &ControlFlowGraph) -> Vec<usize> {
        cfg.blocks().map(|b| b.len()).collect()
    }

    #[test]
    fn test_from_parts() {
        let cfg = ControlFlowGraph::from_parts(
            vec![vec![alu(0)], vec![alu(1)], vec![alu(2)]],
            [(0, 1, EdgeKind::Logical), (0, 2, EdgeKind::Physical), (1, 2, EdgeKind::Logical)],
        )
        .unwrap();
        assert_eq!(cfg.num_blocks(), 3);
        assert_eq!(cfg.block(cfg.id_at(2).unwrap()).start_ip(), 2);
        assert_eq!(kind(&cfg, 0, 2), Some(EdgeKind::Physical));

        let err = ControlFlowGraph::from_parts(vec![vec![alu(0)]], [(0, 4, EdgeKind::Logical)]);
        assert!(matches!(err, Err(Error::Malformed { .. })));

        let misplaced = ControlFlowGraph::from_parts(
            vec![vec![op(Opcode::If).predicated(false), alu(0)]],
            [],
        );
        assert!(matches!(misplaced, Err(Error::InvalidCfg { .. })));
    }

    #[test]
    fn test_straight_line_is_one_block() {
        let cfg = ControlFlowGraph::build(vec![alu(0), alu(1), alu(2)]);
        assert_eq!(cfg.num_blocks(), 1);
        assert_eq!(lens(&cfg), vec![3]);
        assert!(cfg.block(cfg.entry()).children().is_empty());
        cfg.validate();
    }

    #[test]
    fn test_empty_stream() {
        let cfg = ControlFlowGraph::build(Vec::new());
        assert_eq!(cfg.num_blocks(), 1);
        assert_eq!(cfg.num_instructions(), 0);
        cfg.validate();
    }

    #[test]
    fn test_diamond() {
        let cfg = ControlFlowGraph::build(vec![
            alu(0),
            op(Opcode::If).predicated(false),
            alu(1),
            op(Opcode::Else),
            alu(2),
            op(Opcode::Endif),
            alu(3),
        ]);
        assert_eq!(lens(&cfg), vec![2, 2, 1, 2]);
        assert_eq!(kind(&cfg, 0, 1), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 0, 2), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 1, 2), Some(EdgeKind::Physical));
        assert_eq!(kind(&cfg, 1, 3), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 2, 3), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 0, 3), None);
        cfg.validate();
    }

    #[test]
    fn test_if_without_else() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::If).predicated(false),
            alu(0),
            op(Opcode::Endif),
        ]);
        assert_eq!(lens(&cfg), vec![1, 1, 1]);
        assert_eq!(kind(&cfg, 0, 1), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 1, 2), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 0, 2), Some(EdgeKind::Logical));
        cfg.validate();
    }

    #[test]
    fn test_empty_else_coalesces_edges() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::If).predicated(false),
            alu(0),
            op(Opcode::Else),
            op(Opcode::Endif),
        ]);
        // The ENDIF reuses the still-empty else-block, so the physical
        // then->else edge and the logical ELSE->ENDIF edge coincide.
        assert_eq!(lens(&cfg), vec![1, 2, 1]);
        assert_eq!(kind(&cfg, 1, 2), Some(EdgeKind::Logical));
        assert_eq!(cfg.block(cfg.id_at(1).unwrap()).children().len(), 1);
        cfg.validate();
    }

    #[test]
    fn test_trivial_loop() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            alu(0),
            op(Opcode::While).predicated(false),
        ]);
        assert_eq!(lens(&cfg), vec![1, 2, 0]);
        let do_block = cfg.block(cfg.id_at(0).unwrap());
        assert_eq!(do_block.children().len(), 2);
        assert_eq!(kind(&cfg, 0, 1), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 0, 2), Some(EdgeKind::Physical));
        assert_eq!(kind(&cfg, 1, 0), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 1, 1), None);
        cfg.validate();
    }

    #[test]
    fn test_unconditional_while_targets_body() {
        let cfg = ControlFlowGraph::build(vec![
            alu(0),
            op(Opcode::Do),
            alu(1),
            op(Opcode::Break).predicated(false),
            alu(2),
            op(Opcode::While),
            alu(3),
        ]);
        // b0{add} b1{do} b2{add,break} b3{add,while} b4{add}
        assert_eq!(lens(&cfg), vec![1, 1, 2, 2, 1]);
        assert_eq!(kind(&cfg, 0, 1), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 2, 1), Some(EdgeKind::Physical));
        assert_eq!(kind(&cfg, 2, 4), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 2, 3), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 3, 2), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 1, 4), Some(EdgeKind::Physical));
        cfg.validate();
    }

    #[test]
    fn test_unpredicated_break_falls_through_physically() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            op(Opcode::Break),
            alu(0),
            op(Opcode::While),
        ]);
        assert_eq!(kind(&cfg, 1, 2), Some(EdgeKind::Physical));
        cfg.validate();
    }

    #[test]
    fn test_continue_targets_body() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            alu(0),
            op(Opcode::Continue).predicated(false),
            alu(1),
            op(Opcode::While).predicated(false),
        ]);
        // b0{do} b1{add,continue} b2{add,while} b3{}
        assert_eq!(kind(&cfg, 1, 1), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 1, 2), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 2, 0), Some(EdgeKind::Logical));
        cfg.validate();
    }

    #[test]
    fn test_nested_loops_restore_context() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            op(Opcode::Do),
            op(Opcode::Break).predicated(false),
            op(Opcode::While).predicated(false),
            op(Opcode::Break).predicated(false),
            op(Opcode::While).predicated(false),
        ]);
        // b0{do} b1{do} b2{break} b3{while} b4{break} b5{while} b6{}
        assert_eq!(lens(&cfg), vec![1, 1, 1, 1, 1, 1, 0]);
        assert_eq!(kind(&cfg, 2, 1), Some(EdgeKind::Physical));
        assert_eq!(kind(&cfg, 2, 4), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 4, 0), Some(EdgeKind::Physical));
        assert_eq!(kind(&cfg, 4, 6), Some(EdgeKind::Logical));
        assert_eq!(kind(&cfg, 0, 6), Some(EdgeKind::Physical));
        assert_eq!(kind(&cfg, 1, 4), Some(EdgeKind::Physical));
        cfg.validate();
    }

    #[test]
    fn test_start_ips_follow_instruction_count() {
        let cfg = ControlFlowGraph::build(vec![
            alu(0),
            op(Opcode::If).predicated(false),
            alu(1),
            op(Opcode::Endif),
        ]);
        let starts: Vec<_> = cfg.blocks().map(|b| b.start_ip()).collect();
        assert_eq!(starts, vec![0, 2, 3]);
        assert_eq!(cfg.block(cfg.entry()).end_ip(), Some(1));
    }

    #[test]
    fn test_malformed_streams() {
        let cases = vec![
            vec![op(Opcode::Endif)],
            vec![op(Opcode::Else)],
            vec![op(Opcode::If), op(Opcode::Else), op(Opcode::Else)],
            vec![op(Opcode::If)],
            vec![op(Opcode::Break)],
            vec![op(Opcode::Continue)],
            vec![op(Opcode::While)],
            vec![op(Opcode::Do), alu(0)],
        ];
        for stream in cases {
            let result = ControlFlowGraph::try_build(stream);
            assert!(matches!(result, Err(Error::Malformed { .. })));
        }
    }

    #[test]
    #[should_panic(expected = "without IF")]
    fn test_build_panics_on_malformed() {
        let _ = ControlFlowGraph::build(vec![op(Opcode::Endif)]);
    }
}
