//! List scheduling of the instructions inside each basic block.
//!
//! Every block is scheduled independently. Its instructions become the nodes
//! of a dependency DAG; a node is *available* once all of its parents have
//! been scheduled and is then picked by the heuristic of the active
//! [`ScheduleMode`]. A simulated clock advances by each chosen instruction's
//! issue time and stalls until the chosen node is unblocked, which yields the
//! cycle estimate reported in [`ScheduleStats`].
//!
//! # Modes
//!
//! - [`ScheduleMode::Pre`] / [`ScheduleMode::Post`]: latency heuristic. Prefers
//!   the node that unblocks the block's earliest exit, then the one that can
//!   issue first.
//! - [`ScheduleMode::PreNonLifo`] / [`ScheduleMode::PreLifo`]: register-pressure
//!   heuristic. Prefers nodes that free registers, then (LIFO only) nodes that
//!   became available most recently, then the longest critical path.
//! - [`ScheduleMode::None`]: keeps program order but still simulates clock and
//!   pressure.
//!
//! Before register allocation [`InstructionScheduler::schedule_pre_ra`] tries
//! the configured modes in turn and keeps the first schedule whose simulated
//! pressure fits the register budget.
//!
//! # Examples
//!
//! ```rust
//! use simdcfg::{
//!     cfg::ControlFlowGraph,
//!     compiler::SchedulerConfig,
//!     ir::{Instruction, MessageKind, Opcode, Reg, Sfid, VgrfAlloc},
//!     scheduler::{InstructionScheduler, ScheduleMode},
//! };
//!
//! let mut cfg = ControlFlowGraph::build(vec![
//!     Instruction::new(Opcode::Send)
//!         .dst(Reg::vgrf(1))
//!         .src(Reg::vgrf(0))
//!         .message(Sfid::Sampler, MessageKind::Sample),
//!     Instruction::new(Opcode::Add).dst(Reg::vgrf(2)).src(Reg::vgrf(1)).src(Reg::imm(1)),
//!     Instruction::new(Opcode::Mov).dst(Reg::vgrf(3)).src(Reg::imm(0)),
//! ]);
//! let alloc = VgrfAlloc::new();
//! let scheduler = InstructionScheduler::new(SchedulerConfig::default(), &alloc);
//!
//! let stats = scheduler.run(&mut cfg, ScheduleMode::Post)?;
//! let order: Vec<_> = cfg.instructions().map(|i| i.opcode).collect();
//! assert_eq!(order, vec![Opcode::Send, Opcode::Mov, Opcode::Add]);
//! assert_eq!(stats.blocks_reordered, 1);
//! # Ok::<(), simdcfg::Error>(())
//! ```

mod deps;
mod heuristic;
pub mod latency;
mod node;
mod pressure;

use std::collections::VecDeque;

use crate::{
    analysis::RegisterLiveness,
    cfg::{ControlFlowGraph, DependencyClass},
    compiler::{EventKind, EventLog, SchedulerConfig},
    ir::{Instruction, VgrfAlloc},
    scheduler::{
        heuristic::Candidate,
        node::{Dependent, DependencyGraph},
        pressure::RegisterPressure,
    },
    Error, Result,
};

/// Heuristic used to pick the next instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum ScheduleMode {
    /// Latency heuristic on virtual registers.
    #[default]
    Pre,
    /// Register-pressure heuristic without recency preference.
    PreNonLifo,
    /// Register-pressure heuristic preferring the most recently available node.
    PreLifo,
    /// Latency heuristic on physical registers, using real latencies.
    Post,
    /// Program order, simulated only.
    None,
}

impl ScheduleMode {
    /// Returns `true` for the modes that run after register allocation.
    #[must_use]
    pub fn is_post_reg_alloc(self) -> bool {
        self == Self::Post
    }
}

/// Summary of one scheduling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Mode the schedule was produced with.
    pub mode: ScheduleMode,
    /// Simulated cycles, summed over all blocks.
    pub cycles: u64,
    /// Highest simulated register pressure in any block (0 after allocation).
    pub max_pressure: u32,
    /// Number of blocks whose instruction order changed.
    pub blocks_reordered: usize,
}

/// Result of scheduling one block.
struct BlockSchedule {
    order: Vec<usize>,
    cycles: u32,
    max_pressure: u32,
}

impl BlockSchedule {
    fn is_reordered(&self) -> bool {
        self.order.iter().enumerate().any(|(pos, &n)| pos != n)
    }
}

/// Reorders instructions within blocks.
///
/// The scheduler borrows the shader's virtual register sizes for pressure
/// tracking and optionally an [`EventLog`] that receives one
/// [`EventKind::BlockScheduled`] event per reordered block.
#[derive(Debug, Clone)]
pub struct InstructionScheduler<'a> {
    config: SchedulerConfig,
    alloc: &'a VgrfAlloc,
    events: Option<&'a EventLog>,
}

impl<'a> InstructionScheduler<'a> {
    /// Creates a scheduler for a shader with virtual registers `alloc`.
    #[must_use]
    pub fn new(config: SchedulerConfig, alloc: &'a VgrfAlloc) -> Self {
        Self {
            config,
            alloc,
            events: None,
        }
    }

    /// Records scheduling events into `events`.
    #[must_use]
    pub fn with_events(mut self, events: &'a EventLog) -> Self {
        self.events = Some(events);
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Schedules every block of `cfg` with `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DependencyCycle`] if a block's dependency graph cannot
    /// be scheduled completely.
    pub fn run(&self, cfg: &mut ControlFlowGraph, mode: ScheduleMode) -> Result<ScheduleStats> {
        self.schedule_cfg(cfg, mode, self.events)
    }

    /// Picks and applies the pre-allocation schedule.
    ///
    /// Each mode of [`SchedulerConfig::pre_ra_modes`] is tried on a copy of the
    /// graph. The first schedule whose maximum simulated pressure fits
    /// [`SchedulerConfig::register_budget`] is kept; if none fits, the one
    /// with the lowest pressure is. [`ScheduleMode::Post`] entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DependencyCycle`] if a block cannot be scheduled.
    pub fn schedule_pre_ra(&self, cfg: &mut ControlFlowGraph) -> Result<ScheduleStats> {
        let mut best: Option<(ControlFlowGraph, ScheduleStats, EventLog)> = None;

        for &mode in &self.config.pre_ra_modes {
            if mode.is_post_reg_alloc() {
                continue;
            }
            let mut trial = cfg.clone();
            let events = EventLog::new();
            let stats = self.schedule_cfg(&mut trial, mode, Some(&events))?;
            log::debug!(
                "pre-RA mode {mode}: pressure {} (budget {}), {} cycles",
                stats.max_pressure,
                self.config.register_budget,
                stats.cycles
            );

            if stats.max_pressure <= self.config.register_budget {
                best = Some((trial, stats, events));
                break;
            }
            if best
                .as_ref()
                .map_or(true, |(_, b, _)| stats.max_pressure < b.max_pressure)
            {
                best = Some((trial, stats, events));
            }
        }

        let Some((scheduled, stats, events)) = best else {
            return self.run(cfg, ScheduleMode::None);
        };
        if stats.max_pressure > self.config.register_budget {
            log::debug!(
                "no pre-RA mode fits the budget, keeping {} with pressure {}",
                stats.mode,
                stats.max_pressure
            );
        }
        *cfg = scheduled;
        if let Some(log) = self.events {
            log.merge(events);
        }
        Ok(stats)
    }

    fn schedule_cfg(
        &self,
        cfg: &mut ControlFlowGraph,
        mode: ScheduleMode,
        events: Option<&EventLog>,
    ) -> Result<ScheduleStats> {
        let liveness = (!mode.is_post_reg_alloc())
            .then(|| RegisterLiveness::compute(cfg, self.alloc, self.config.hw_reg_count));
        let mut stats = ScheduleStats {
            mode,
            ..ScheduleStats::default()
        };

        let ids: Vec<_> = cfg.block_ids().collect();
        for id in ids {
            let block = cfg.block(id);
            let num = block.num();
            let result = self.schedule_block(num, block.instructions(), mode, liveness.as_ref())?;
            log::debug!(
                "B{num} [{mode}]: {} instructions, {} cycles, pressure {}",
                result.order.len(),
                result.cycles,
                result.max_pressure
            );
            stats.cycles += u64::from(result.cycles);
            stats.max_pressure = stats.max_pressure.max(result.max_pressure);

            if result.is_reordered() {
                let insts = cfg.instructions_mut(id);
                let reordered: Vec<Instruction> =
                    result.order.iter().map(|&n| insts[n].clone()).collect();
                insts.clone_from_slice(&reordered);
                stats.blocks_reordered += 1;
                if let Some(events) = events {
                    events
                        .record(EventKind::BlockScheduled)
                        .block(num)
                        .message(format!("{mode}: {} cycles", result.cycles));
                }
            }
        }

        if stats.blocks_reordered > 0 {
            cfg.invalidate(DependencyClass::INSTRUCTION_IDENTITY);
        }
        Ok(stats)
    }

    fn schedule_block(
        &self,
        num: usize,
        insts: &[Instruction],
        mode: ScheduleMode,
        liveness: Option<&RegisterLiveness>,
    ) -> Result<BlockSchedule> {
        let post = mode.is_post_reg_alloc();
        let total = insts.len();
        let mut g = DependencyGraph::new(insts, &self.config.device, post);
        deps::calculate_deps(&mut g, insts, self.alloc, post);
        g.compute_delays();
        g.compute_exits();

        let mut pressure = liveness.map(|live| {
            RegisterPressure::new(self.alloc, live, self.config.hw_reg_count, num, insts)
        });
        let mut available: VecDeque<usize> =
            (0..total).filter(|&n| g.nodes[n].parent_count == 0).collect();
        let mut order = Vec::with_capacity(total);
        let mut time = 0u32;
        let mut generation = 0u32;

        while order.len() < total {
            let candidates = available.iter().map(|&node| Candidate {
                node,
                benefit: pressure.as_ref().map_or(0, |p| p.benefit(&insts[node])),
            });
            let chosen = heuristic::choose(mode, &g, candidates)
                .and_then(|pos| available.remove(pos))
                .ok_or(Error::DependencyCycle {
                    block: num,
                    scheduled: order.len(),
                    total,
                })?;
            order.push(chosen);
            if let Some(pressure) = pressure.as_mut() {
                pressure.schedule(&insts[chosen]);
            }

            time = time.max(g.nodes[chosen].unblocked_time) + g.nodes[chosen].issue_time;
            log::trace!("B{num}: t={time} {}", insts[chosen]);

            for i in 0..g.nodes[chosen].children.len() {
                let Dependent { node, latency } = g.nodes[chosen].children[i];
                let child = &mut g.nodes[node];
                child.unblocked_time = child.unblocked_time.max(time.saturating_add(latency));
                child.cand_generation = generation;
                child.parent_count -= 1;
                if child.parent_count == 0 {
                    available.push_front(node);
                }
            }
            generation += 1;

            // Before Gfx6 a math instruction occupies the shared math unit.
            if self.config.device.ver < 6 && insts[chosen].opcode.is_math() {
                let busy_until = time.saturating_add(g.nodes[chosen].latency);
                for &n in &available {
                    if insts[n].opcode.is_math() {
                        let node = &mut g.nodes[n];
                        node.unblocked_time = node.unblocked_time.max(busy_until);
                    }
                }
            }
        }

        Ok(BlockSchedule {
            order,
            cycles: time,
            max_pressure: pressure.map_or(0, |p| p.max()),
        })
    }
}
