//! Dead-control-flow elimination.
//!
//! Removes control flow that guards nothing:
//!
//! - `ELSE` directly followed by `ENDIF`: the empty else-branch goes away
//! - `IF` directly followed by `ENDIF`: both go away and the surrounding
//!   blocks are merged when legal
//! - `IF` directly followed by `ELSE`: the empty then-branch goes away and the
//!   IF's predicate is inverted so it guards the former else-branch
//!
//! One scan in program order reaches the fixpoint: no rewrite creates a new
//! opportunity at an earlier block.

use crate::{
    cfg::{ControlFlowGraph, DependencyClass},
    compiler::{EventKind, EventLog},
    ir::Opcode,
    passes::{self, CfgPass},
    Result,
};

/// Eliminates empty IF/ELSE/ENDIF constructs.
///
/// # Examples
///
/// ```rust
/// use simdcfg::{
///     cfg::ControlFlowGraph,
///     compiler::EventLog,
///     ir::{Instruction, Opcode, Reg},
///     passes::{CfgPass, DeadControlFlowPass},
/// };
///
/// let mut cfg = ControlFlowGraph::build(vec![
///     Instruction::new(Opcode::If).predicated(false),
///     Instruction::new(Opcode::Endif),
///     Instruction::new(Opcode::Add).dst(Reg::vgrf(0)).src(Reg::vgrf(0)).src(Reg::imm(1)),
/// ]);
/// let events = EventLog::new();
///
/// assert!(DeadControlFlowPass.run(&mut cfg, &events)?);
/// assert_eq!(cfg.num_blocks(), 1);
/// assert_eq!(cfg.num_instructions(), 1);
/// # Ok::<(), simdcfg::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DeadControlFlowPass;

impl CfgPass for DeadControlFlowPass {
    fn name(&self) -> &'static str {
        "dead-control-flow"
    }

    fn description(&self) -> &'static str {
        "Remove IF/ELSE/ENDIF constructs with empty branches"
    }

    fn run(&self, cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<bool> {
        let mut removed = 0usize;

        // Block handles stay valid across removals, so iterate a snapshot and
        // skip the ones that disappeared.
        let ids: Vec<_> = cfg.block_ids().collect();
        for id in ids {
            let Some(block) = cfg.get(id) else {
                continue;
            };
            let Some(prev) = cfg.prev(id) else {
                continue;
            };
            let (Some(first), Some(prev_last)) = (
                block.start().map(|i| i.opcode),
                cfg.block(prev).end().map(|i| i.opcode),
            ) else {
                continue;
            };
            let (num, start_ip) = (block.num(), block.start_ip());

            match (prev_last, first) {
                (Opcode::Else, Opcode::Endif) => {
                    let else_index = cfg.block(prev).len() - 1;
                    passes::remove_instruction(cfg, events, self.name(), prev, else_index);
                    removed += 1;
                    events
                        .record(EventKind::InstructionRemoved)
                        .at(num, start_ip.saturating_sub(1))
                        .pass(self.name())
                        .message("ELSE with empty else-branch");
                }
                (Opcode::If, Opcode::Endif) => {
                    let earlier = if cfg.block(prev).len() == 1 {
                        cfg.prev(prev)
                    } else {
                        Some(prev)
                    };
                    let later = if cfg.block(id).len() == 1 {
                        cfg.next(id)
                    } else {
                        Some(id)
                    };

                    let if_index = cfg.block(prev).len() - 1;
                    passes::remove_instruction(cfg, events, self.name(), prev, if_index);
                    passes::remove_instruction(cfg, events, self.name(), id, 0);
                    removed += 2;
                    events
                        .record(EventKind::InstructionRemoved)
                        .at(num, start_ip)
                        .pass(self.name())
                        .message("IF/ENDIF with empty body");

                    if let (Some(earlier), Some(later)) = (earlier, later) {
                        if cfg.merge(earlier, later) {
                            events
                                .record(EventKind::BlocksMerged)
                                .block(cfg.block(earlier).num())
                                .pass(self.name());
                        }
                    }
                }
                (Opcode::If, Opcode::Else) => {
                    let if_index = cfg.block(prev).len() - 1;
                    if let Some(if_inst) = cfg.instruction_mut(prev, if_index) {
                        if_inst.predicate_inverse = !if_inst.predicate_inverse;
                    }
                    events
                        .record(EventKind::PredicateInverted)
                        .at(cfg.block(prev).num(), start_ip.saturating_sub(1))
                        .pass(self.name());
                    passes::remove_instruction(cfg, events, self.name(), id, 0);
                    removed += 1;
                    events
                        .record(EventKind::InstructionRemoved)
                        .at(num, start_ip)
                        .pass(self.name())
                        .message("ELSE with empty then-branch");
                }
                _ => continue,
            }
            log::trace!("dead-control-flow: rewrote {prev_last}/{first} at ip {start_ip}");
        }

        if removed > 0 {
            cfg.invalidate(DependencyClass::BLOCKS | DependencyClass::INSTRUCTIONS);
            log::debug!("dead-control-flow: removed {removed} instructions");
        }
        Ok(removed > 0)
    }
}
