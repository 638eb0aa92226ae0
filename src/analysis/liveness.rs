//! Block-level register liveness for the pre-allocation scheduler.
//!
//! Virtual registers are tracked as whole units; fixed GRFs (thread payload,
//! push constants) only by their last read.
//!
//! # Algorithm
//!
//! A backward dataflow over all successor edges, logical and physical alike:
//!
//! - `USE[B]` = registers read in B before being fully written
//! - `DEF[B]` = registers fully written in B before any read
//! - `OUT[B]` = ∪{IN[S] | S is a successor of B}
//! - `IN[B]` = USE[B] ∪ (OUT[B] - DEF[B])
//!
//! A write is full when it is unpredicated and covers the whole register.
//! After the fixpoint every register gets a live range `[start, end]` of
//! instruction indices, and the block sets are widened to every boundary the
//! range crosses: live-in when the range starts before the block's first
//! instruction and reaches it, live-out when it reaches the last instruction
//! and extends past it. The widening keeps registers that are only partially
//! written in a loop live across the whole loop.

use crate::{
    cfg::ControlFlowGraph,
    ir::{RegFile, VgrfAlloc, REG_SIZE},
    utils::BitSet,
};

/// Live-in/live-out sets and register pressure at block entry.
///
/// All per-block accessors are indexed by block sequence number and panic for
/// numbers out of range.
///
/// # Examples
///
/// ```rust
/// use simdcfg::{
///     analysis::RegisterLiveness,
///     cfg::ControlFlowGraph,
///     ir::{Instruction, Opcode, Reg, VgrfAlloc},
/// };
///
/// let mut alloc = VgrfAlloc::new();
/// let x = alloc.allocate(1);
/// let cfg = ControlFlowGraph::build(vec![
///     Instruction::new(Opcode::Mov).dst(Reg::vgrf(x)).src(Reg::imm(1)),
///     Instruction::new(Opcode::If).predicated(false),
///     Instruction::new(Opcode::Add).dst(Reg::vgrf(x)).src(Reg::vgrf(x)).src(Reg::imm(1)),
///     Instruction::new(Opcode::Endif),
/// ]);
/// let live = RegisterLiveness::compute(&cfg, &alloc, 0);
///
/// assert!(live.livein(1).contains(x as usize));
/// assert_eq!(live.pressure_in(1), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RegisterLiveness {
    generation: u64,
    num_vgrfs: usize,
    livein: Vec<BitSet>,
    liveout: Vec<BitSet>,
    vgrf_start: Vec<Option<usize>>,
    vgrf_end: Vec<Option<usize>>,
    hw_last_use: Vec<Option<usize>>,
    hw_liveout: Vec<BitSet>,
    pressure_in: Vec<u32>,
}

fn extend(range: &mut (Option<usize>, Option<usize>), ip: usize) {
    range.0 = Some(range.0.map_or(ip, |s| s.min(ip)));
    range.1 = Some(range.1.map_or(ip, |e| e.max(ip)));
}

impl RegisterLiveness {
    /// Computes liveness for `cfg`.
    ///
    /// `alloc` supplies virtual register sizes; `hw_reg_count` bounds the fixed
    /// GRFs whose last use is tracked.
    #[must_use]
    pub fn compute(cfg: &ControlFlowGraph, alloc: &VgrfAlloc, hw_reg_count: usize) -> Self {
        let num_vgrfs = cfg
            .instructions()
            .flat_map(|i| std::iter::once(&i.dst).chain(i.srcs.iter()))
            .filter(|r| r.file == RegFile::Vgrf)
            .map(|r| r.nr as usize + 1)
            .max()
            .unwrap_or(0)
            .max(alloc.len());
        let n = cfg.num_blocks();

        let mut uses = vec![BitSet::new(num_vgrfs); n];
        let mut defs = vec![BitSet::new(num_vgrfs); n];
        let mut ranges = vec![(None, None); num_vgrfs];
        let mut hw_last_use: Vec<Option<usize>> = vec![None; hw_reg_count];

        for block in cfg.blocks() {
            let (uses, defs) = (&mut uses[block.num()], &mut defs[block.num()]);
            for (i, inst) in block.instructions().iter().enumerate() {
                let ip = block.start_ip() + i;
                for src in &inst.srcs {
                    match src.file {
                        RegFile::Vgrf => {
                            let v = src.nr as usize;
                            if !defs.contains(v) {
                                uses.insert(v);
                            }
                            extend(&mut ranges[v], ip);
                        }
                        RegFile::FixedGrf => {
                            let first = (src.nr + src.offset / REG_SIZE) as usize;
                            for r in first..first + src.regs_spanned() as usize {
                                if let Some(last) = hw_last_use.get_mut(r) {
                                    *last = Some(last.map_or(ip, |l| l.max(ip)));
                                }
                            }
                        }
                        _ => {}
                    }
                }
                if inst.dst.file == RegFile::Vgrf {
                    let v = inst.dst.nr as usize;
                    let full = !inst.is_predicated()
                        && inst.dst.offset == 0
                        && inst.dst.size >= alloc.size(inst.dst.nr) * REG_SIZE;
                    if full && !uses.contains(v) {
                        defs.insert(v);
                    }
                    extend(&mut ranges[v], ip);
                }
            }
        }

        let mut livein = vec![BitSet::new(num_vgrfs); n];
        let mut liveout = vec![BitSet::new(num_vgrfs); n];
        let mut changed = true;
        while changed {
            changed = false;
            for block in cfg.blocks().collect::<Vec<_>>().into_iter().rev() {
                let b = block.num();
                let mut out = BitSet::new(num_vgrfs);
                for child in block.children() {
                    if let Some(c) = cfg.get(child.block) {
                        out.union_with(&livein[c.num()]);
                    }
                }
                let mut inn = out.clone();
                inn.difference_with(&defs[b]);
                inn.union_with(&uses[b]);
                changed |= liveout[b] != out || livein[b] != inn;
                liveout[b] = out;
                livein[b] = inn;
            }
        }

        for block in cfg.blocks() {
            let b = block.num();
            for v in livein[b].iter() {
                extend(&mut ranges[v], block.start_ip());
            }
            if let Some(end) = block.end_ip() {
                for v in liveout[b].iter() {
                    extend(&mut ranges[v], end);
                }
            }
        }

        let mut hw_liveout = vec![BitSet::new(hw_reg_count); n];
        let mut pressure_in = vec![0u32; n];
        for block in cfg.blocks() {
            let b = block.num();
            let start = block.start_ip();
            for (v, &(lo, hi)) in ranges.iter().enumerate() {
                let (Some(lo), Some(hi)) = (lo, hi) else {
                    continue;
                };
                if lo < start && hi >= start {
                    livein[b].insert(v);
                }
                if let Some(end) = block.end_ip() {
                    if lo <= end && hi > end {
                        liveout[b].insert(v);
                    }
                }
            }
            pressure_in[b] = livein[b]
                .iter()
                .map(|v| alloc.size(v as u32))
                .sum();
            for (r, last) in hw_last_use.iter().enumerate() {
                let Some(last) = *last else {
                    continue;
                };
                if start <= last {
                    pressure_in[b] += 1;
                }
                if block.end_ip().is_some_and(|end| end < last) {
                    hw_liveout[b].insert(r);
                }
            }
        }

        Self {
            generation: cfg.generation(),
            num_vgrfs,
            livein,
            liveout,
            vgrf_start: ranges.iter().map(|r| r.0).collect(),
            vgrf_end: ranges.iter().map(|r| r.1).collect(),
            hw_last_use,
            hw_liveout,
            pressure_in,
        }
    }

    /// Graph generation the sets were computed for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of virtual registers tracked.
    #[must_use]
    pub fn num_vgrfs(&self) -> usize {
        self.num_vgrfs
    }

    /// Virtual registers live at entry to block `num`.
    #[must_use]
    pub fn livein(&self, num: usize) -> &BitSet {
        &self.livein[num]
    }

    /// Virtual registers live at exit from block `num`.
    #[must_use]
    pub fn liveout(&self, num: usize) -> &BitSet {
        &self.liveout[num]
    }

    /// Live range of virtual register `vgrf` as inclusive instruction indices.
    #[must_use]
    pub fn vgrf_range(&self, vgrf: usize) -> Option<(usize, usize)> {
        self.vgrf_start
            .get(vgrf)
            .copied()
            .flatten()
            .zip(self.vgrf_end.get(vgrf).copied().flatten())
    }

    /// Index of the last instruction reading fixed GRF `reg`.
    #[must_use]
    pub fn hw_last_use(&self, reg: usize) -> Option<usize> {
        self.hw_last_use.get(reg).copied().flatten()
    }

    /// Fixed GRFs still read after block `num`.
    #[must_use]
    pub fn hw_liveout(&self, num: usize) -> &BitSet {
        &self.hw_liveout[num]
    }

    /// Registers occupied at entry to block `num`: live-in virtual registers
    /// by size plus fixed GRFs read at or after the block's first instruction.
    #[must_use]
    pub fn pressure_in(&self, num: usize) -> u32 {
        self.pressure_in[num]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instruction, Opcode, Reg};

    fn op(opcode: Opcode) -> Instruction {
        Instruction::new(opcode)
    }

    fn add(dst: u32, a: Reg, b: Reg) -> Instruction {
        Instruction::new(Opcode::Add).dst(Reg::vgrf(dst)).src(a).src(b)
    }

    fn alloc(n: u32) -> VgrfAlloc {
        let mut alloc = VgrfAlloc::new();
        for _ in 0..n {
            alloc.allocate(1);
        }
        alloc
    }

    #[test]
    fn test_straight_line_has_no_boundaries() {
        let cfg = ControlFlowGraph::build(vec![
            add(0, Reg::imm(1), Reg::imm(2)),
            add(1, Reg::vgrf(0), Reg::imm(2)),
        ]);
        let live = RegisterLiveness::compute(&cfg, &alloc(2), 0);
        assert!(live.livein(0).is_empty());
        assert_eq!(live.vgrf_range(0), Some((0, 1)));
        assert_eq!(live.vgrf_range(1), Some((1, 1)));
        assert!(live.liveout(0).is_empty());
    }

    #[test]
    fn test_value_live_across_loop() {
        let cfg = ControlFlowGraph::build(vec![
            add(0, Reg::imm(0), Reg::imm(0)),
            op(Opcode::Do),
            add(0, Reg::vgrf(0), Reg::imm(1)),
            op(Opcode::While).predicated(false),
            add(1, Reg::vgrf(0), Reg::imm(0)),
        ]);
        // b0{add} b1{do} b2{add,while} b3{add}
        let live = RegisterLiveness::compute(&cfg, &alloc(2), 0);
        for b in 1..=3 {
            assert!(live.livein(b).contains(0), "v0 live into B{b}");
        }
        assert!(live.liveout(2).contains(0));
        assert!(!live.livein(0).contains(0));
        assert_eq!(live.pressure_in(2), 1);
    }

    #[test]
    fn test_predicated_write_does_not_kill() {
        let cfg = ControlFlowGraph::build(vec![
            op(Opcode::If).predicated(false),
            add(0, Reg::imm(1), Reg::imm(1)).predicated(false),
            op(Opcode::Endif),
            add(1, Reg::vgrf(0), Reg::imm(0)),
        ]);
        let live = RegisterLiveness::compute(&cfg, &alloc(2), 0);
        // The partial write in B1 leaves v0 live on entry to the whole program.
        assert!(live.livein(0).contains(0));
        assert!(live.livein(1).contains(0));
    }

    #[test]
    fn test_fixed_grf_last_use() {
        let cfg = ControlFlowGraph::build(vec![
            add(0, Reg::grf(2), Reg::imm(0)),
            op(Opcode::If).predicated(false),
            add(1, Reg::grf(3), Reg::grf(2)),
            op(Opcode::Endif),
        ]);
        let live = RegisterLiveness::compute(&cfg, &alloc(2), 8);
        assert_eq!(live.hw_last_use(2), Some(2));
        assert_eq!(live.hw_last_use(3), Some(2));
        assert_eq!(live.hw_last_use(4), None);
        assert!(live.hw_liveout(0).contains(2));
        assert!(!live.hw_liveout(1).contains(2));
        assert_eq!(live.pressure_in(1), 2);
        assert_eq!(live.pressure_in(2), 0);
    }

    #[test]
    fn test_sizes_weight_pressure() {
        let mut alloc = VgrfAlloc::new();
        let wide = alloc.allocate(4);
        let cfg = ControlFlowGraph::build(vec![
            Instruction::new(Opcode::Mov)
                .dst(Reg::vgrf(wide).with_size(4 * REG_SIZE))
                .src(Reg::imm(0)),
            op(Opcode::If).predicated(false),
            add(wide, Reg::vgrf(wide), Reg::imm(1)),
            op(Opcode::Endif),
        ]);
        let live = RegisterLiveness::compute(&cfg, &alloc, 0);
        assert_eq!(live.pressure_in(1), 4);
    }
}
