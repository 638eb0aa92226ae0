//! Predicated-break conversion.
//!
//! Rewrites
//!
//! ```text
//! IF (f0.0)
//!     BREAK
//! ENDIF
//! ```
//!
//! into a single `(+f0.0) BREAK`, and likewise for `CONTINUE`. The IF and
//! ENDIF instructions are deleted, the jump block is relinked to its new
//! neighbours with logical edges and merged into the preceding block when
//! legal.
//!
//! If the predicated BREAK then sits directly before an unpredicated WHILE,
//! and the loop contains no CONTINUE, the BREAK is dropped as well and the
//! WHILE takes the inverted predicate: the loop repeats exactly when it would
//! not have been left. A CONTINUE would jump to the WHILE and evaluate the
//! new predicate on stale flags, so the fold is skipped for such loops.

use crate::{
    cfg::{BlockId, ControlFlowGraph, DependencyClass, EdgeKind},
    compiler::{EventKind, EventLog},
    ir::Opcode,
    passes::{self, CfgPass},
    utils::BitSet,
    Result,
};

/// Loop depth up to which CONTINUE tracking is exact. Deeper loops are
/// assumed to contain a CONTINUE.
pub const MAX_LOOP_NESTING: usize = 128;

/// Per-depth record of loops that contain a CONTINUE.
struct LoopTracker {
    depth: usize,
    has_continue: BitSet,
}

impl LoopTracker {
    fn new() -> Self {
        Self {
            depth: 0,
            has_continue: BitSet::new(MAX_LOOP_NESTING),
        }
    }

    fn enter_loop(&mut self) {
        self.depth += 1;
        if self.depth < MAX_LOOP_NESTING {
            self.has_continue.remove(self.depth);
        }
    }

    fn exit_loop(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn set_continue(&mut self) {
        if self.depth < MAX_LOOP_NESTING {
            self.has_continue.insert(self.depth);
        }
    }

    fn loop_has_continue(&self) -> bool {
        self.depth >= MAX_LOOP_NESTING || self.has_continue.contains(self.depth)
    }
}

/// Converts `IF { BREAK | CONTINUE } ENDIF` into predicated jumps.
///
/// # Examples
///
/// ```rust
/// use simdcfg::{
///     cfg::ControlFlowGraph,
///     compiler::EventLog,
///     ir::{Instruction, Opcode, Reg},
///     passes::{CfgPass, PredicatedBreakPass},
/// };
///
/// let mut cfg = ControlFlowGraph::build(vec![
///     Instruction::new(Opcode::Do),
///     Instruction::new(Opcode::Add).dst(Reg::vgrf(0)).src(Reg::vgrf(0)).src(Reg::imm(1)),
///     Instruction::new(Opcode::If).predicated(false),
///     Instruction::new(Opcode::Break),
///     Instruction::new(Opcode::Endif),
///     Instruction::new(Opcode::While),
/// ]);
///
/// assert!(PredicatedBreakPass.run(&mut cfg, &EventLog::new())?);
/// let ops: Vec<_> = cfg.instructions().map(|i| i.opcode).collect();
/// assert_eq!(ops, vec![Opcode::Do, Opcode::Add, Opcode::While]);
/// assert!(cfg.instructions().last().unwrap().predicate_inverse);
/// # Ok::<(), simdcfg::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicatedBreakPass;

impl PredicatedBreakPass {
    /// Matches the pattern around the single-instruction block `jump` and
    /// returns `(if_block, endif_block, earlier, later)`.
    ///
    /// `earlier` and `later` are the blocks that will surround the jump once
    /// IF and ENDIF are gone: the IF and ENDIF blocks themselves unless they
    /// consist of nothing else.
    fn match_pattern(
        cfg: &ControlFlowGraph,
        jump: BlockId,
    ) -> Option<(BlockId, BlockId, BlockId, BlockId)> {
        let block = cfg.get(jump)?;
        if block.len() != 1 {
            return None;
        }
        let jump_inst = block.end()?;
        if !matches!(jump_inst.opcode, Opcode::Break | Opcode::Continue) || jump_inst.is_predicated() {
            return None;
        }

        let if_block = cfg.prev(jump)?;
        let if_inst = cfg.block(if_block).end()?;
        if if_inst.opcode != Opcode::If || !if_inst.is_predicated() || if_inst.cond_mod.is_some() {
            return None;
        }
        let endif_block = cfg.next(jump)?;
        if cfg.block(endif_block).start()?.opcode != Opcode::Endif {
            return None;
        }

        let earlier = if cfg.block(if_block).len() == 1 {
            cfg.prev(if_block)?
        } else {
            if_block
        };
        let later = if cfg.block(endif_block).len() == 1 {
            cfg.next(endif_block)?
        } else {
            endif_block
        };
        Some((if_block, endif_block, earlier, later))
    }

    /// Applies the rewrite and returns the block now holding the jump.
    fn convert(
        &self,
        cfg: &mut ControlFlowGraph,
        events: &EventLog,
        jump: BlockId,
        (if_block, endif_block, earlier, later): (BlockId, BlockId, BlockId, BlockId),
    ) -> BlockId {
        let if_inst = cfg.block(if_block).end().cloned();
        if let (Some(if_inst), Some(jump_inst)) = (if_inst, cfg.instruction_mut(jump, 0)) {
            jump_inst.copy_predicate(&if_inst);
        }
        events
            .record(EventKind::BreakPredicated)
            .at(cfg.block(jump).num(), cfg.block(jump).start_ip())
            .pass(self.name());

        let if_index = cfg.block(if_block).len() - 1;
        passes::remove_instruction(cfg, events, self.name(), if_block, if_index);
        passes::remove_instruction(cfg, events, self.name(), endif_block, 0);
        events
            .record(EventKind::InstructionRemoved)
            .block(cfg.block(jump).num())
            .pass(self.name())
            .message("IF/ENDIF around jump");

        if !cfg.block(earlier).ends_with_control_flow() {
            cfg.unlink_children(earlier);
            cfg.add_edge(earlier, jump, EdgeKind::Logical);
        }
        if !cfg.block(later).starts_with_control_flow() {
            cfg.unlink_parents(later);
        }
        cfg.add_edge(jump, later, EdgeKind::Logical);

        if cfg.merge(earlier, jump) {
            events
                .record(EventKind::BlocksMerged)
                .block(cfg.block(earlier).num())
                .pass(self.name());
            earlier
        } else {
            jump
        }
    }

    /// Folds a predicated BREAK ending `block` into an unpredicated WHILE
    /// starting the next block. Returns `true` if the WHILE block was merged
    /// into `block`.
    fn fold_into_while(&self, cfg: &mut ControlFlowGraph, events: &EventLog, block: BlockId) -> bool {
        let Some(while_block) = cfg.next(block) else {
            return false;
        };
        let is_break = cfg
            .block(block)
            .end()
            .is_some_and(|i| i.opcode == Opcode::Break && i.is_predicated());
        let is_plain_while = cfg
            .block(while_block)
            .start()
            .is_some_and(|i| i.opcode == Opcode::While && !i.is_predicated());
        if !is_break || !is_plain_while || cfg.block(block).len() < 2 {
            return false;
        }

        let Some(brk) = cfg.remove_last_instruction(block) else {
            return false;
        };
        if let Some(while_inst) = cfg.instruction_mut(while_block, 0) {
            while_inst.copy_predicate(&brk);
            while_inst.predicate_inverse = !brk.predicate_inverse;
        }
        events
            .record(EventKind::WhilePredicated)
            .at(cfg.block(while_block).num(), cfg.block(while_block).start_ip())
            .pass(self.name());

        let merged = cfg.merge(block, while_block);
        if merged {
            events
                .record(EventKind::BlocksMerged)
                .block(cfg.block(block).num())
                .pass(self.name());
        }
        merged
    }
}

impl CfgPass for PredicatedBreakPass {
    fn name(&self) -> &'static str {
        "predicated-break"
    }

    fn description(&self) -> &'static str {
        "Replace IF/BREAK/ENDIF and IF/CONTINUE/ENDIF with predicated jumps"
    }

    fn run(&self, cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<bool> {
        let mut progress = 0usize;
        let mut loops = LoopTracker::new();

        let mut cursor = Some(cfg.entry());
        while let Some(id) = cursor {
            let block = cfg.block(id);
            let first = block.start().map(|i| i.opcode);
            let last = block.end().map(|i| i.opcode);
            if first == Some(Opcode::Do) {
                loops.enter_loop();
            }
            match last {
                Some(Opcode::Continue) => loops.set_continue(),
                Some(Opcode::While) => loops.exit_loop(),
                _ => {}
            }

            let Some(pattern) = Self::match_pattern(cfg, id) else {
                cursor = cfg.next(id);
                continue;
            };
            let current = self.convert(cfg, events, id, pattern);
            progress += 1;
            log::trace!("predicated-break: converted jump at B{}", cfg.block(current).num());

            if current != id
                && last == Some(Opcode::Break)
                && !loops.loop_has_continue()
                && self.fold_into_while(cfg, events, current)
            {
                // The WHILE block will not be visited on its own any more.
                loops.exit_loop();
            }
            cursor = cfg.next(current);
        }

        if progress > 0 {
            cfg.invalidate(DependencyClass::BLOCKS | DependencyClass::INSTRUCTIONS);
            log::debug!("predicated-break: converted {progress} jumps");
        }
        Ok(progress > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Reg};

    fn op(opcode: Opcode) -> Instruction {
        Instruction::new(opcode)
    }

    fn add(nr: u32) -> Instruction {
        Instruction::new(Opcode::Add)
            .dst(Reg::vgrf(nr))
            .src(Reg::vgrf(nr))
            .src(Reg::imm(1))
    }

    fn opcodes(cfg: &ControlFlowGraph) -> Vec<Opcode> {
        cfg.instructions().map(|i| i.opcode).collect()
    }

    fn run(cfg: &mut ControlFlowGraph, events: &EventLog) -> bool {
        let changed = PredicatedBreakPass.run(cfg, events).unwrap();
        cfg.validate();
        changed
    }

    #[test]
    fn test_break_folds_into_while() {
        let mut cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            add(0),
            op(Opcode::If).predicated(true),
            op(Opcode::Break),
            op(Opcode::Endif),
            op(Opcode::While),
        ]);
        let events = EventLog::new();
        assert!(run(&mut cfg, &events));

        assert_eq!(opcodes(&cfg), vec![Opcode::Do, Opcode::Add, Opcode::While]);
        let while_inst = cfg.instructions().last().unwrap();
        assert!(while_inst.is_predicated());
        assert!(!while_inst.predicate_inverse);
        assert!(events.has(EventKind::BreakPredicated));
        assert!(events.has(EventKind::WhilePredicated));
    }

    #[test]
    fn test_break_stays_when_loop_has_continue() {
        let mut cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            add(0),
            op(Opcode::Continue).predicated(false),
            add(1),
            op(Opcode::If).predicated(false),
            op(Opcode::Break),
            op(Opcode::Endif),
            op(Opcode::While),
        ]);
        let events = EventLog::new();
        assert!(run(&mut cfg, &events));

        assert_eq!(
            opcodes(&cfg),
            vec![Opcode::Do, Opcode::Add, Opcode::Continue, Opcode::Add, Opcode::Break, Opcode::While]
        );
        let brk = cfg.instructions().find(|i| i.opcode == Opcode::Break).unwrap();
        assert!(brk.is_predicated());
        assert!(!events.has(EventKind::WhilePredicated));
    }

    #[test]
    fn test_break_with_work_after_endif() {
        let mut cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            add(0),
            op(Opcode::If).predicated(false),
            op(Opcode::Break),
            op(Opcode::Endif),
            add(1),
            op(Opcode::While),
        ]);
        assert!(run(&mut cfg, &EventLog::new()));
        assert_eq!(
            opcodes(&cfg),
            vec![Opcode::Do, Opcode::Add, Opcode::Break, Opcode::Add, Opcode::While]
        );
        // DO, the merged body head, the tail ending in WHILE and the exit block.
        assert_eq!(cfg.num_blocks(), 4);
    }

    #[test]
    fn test_continue_is_predicated() {
        let mut cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            add(0),
            op(Opcode::If).predicated(false),
            op(Opcode::Continue),
            op(Opcode::Endif),
            add(1),
            op(Opcode::While).predicated(false),
        ]);
        assert!(run(&mut cfg, &EventLog::new()));
        let cont = cfg.instructions().find(|i| i.opcode == Opcode::Continue).unwrap();
        assert!(cont.is_predicated());
        assert!(!cfg.instructions().any(|i| matches!(i.opcode, Opcode::If | Opcode::Endif)));
    }

    #[test]
    fn test_if_with_more_than_a_jump_is_left_alone() {
        let mut cfg = ControlFlowGraph::build(vec![
            op(Opcode::Do),
            op(Opcode::If).predicated(false),
            add(0),
            op(Opcode::Break),
            op(Opcode::Endif),
            op(Opcode::While),
        ]);
        let before = cfg.dump();
        assert!(!run(&mut cfg, &EventLog::new()));
        assert_eq!(cfg.dump(), before);
    }

    #[test]
    fn test_deep_nesting_counts_as_continue() {
        let mut tracker = LoopTracker::new();
        tracker.enter_loop();
        assert!(!tracker.loop_has_continue());
        tracker.set_continue();
        assert!(tracker.loop_has_continue());
        tracker.enter_loop();
        assert!(!tracker.loop_has_continue());
        tracker.exit_loop();
        assert!(tracker.loop_has_continue());

        for _ in 0..MAX_LOOP_NESTING {
            tracker.enter_loop();
        }
        assert!(tracker.loop_has_continue());
    }
}
