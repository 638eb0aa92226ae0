//! Register pressure simulation for the pre-allocation heuristics.

use crate::{
    analysis::RegisterLiveness,
    ir::{Instruction, RegFile, VgrfAlloc, REG_SIZE},
};

/// Tracks how many registers are live while a block is being scheduled.
///
/// A source frees its register when it is the last remaining read in the
/// block and the register is not live out; a destination occupies a new
/// register when the register is neither live in nor written earlier in the
/// block. Duplicate sources of one instruction count once.
#[derive(Debug)]
pub(crate) struct RegisterPressure<'a> {
    alloc: &'a VgrfAlloc,
    liveness: &'a RegisterLiveness,
    block: usize,
    reads_remaining: Vec<u32>,
    written: Vec<bool>,
    hw_reads_remaining: Vec<u32>,
    current: i64,
    max: i64,
}

fn hw_regs(inst: &Instruction, i: usize) -> std::ops::Range<usize> {
    let src = &inst.srcs[i];
    let first = (src.nr + src.offset / REG_SIZE) as usize;
    first..first + inst.regs_read(i) as usize
}

impl<'a> RegisterPressure<'a> {
    pub fn new(
        alloc: &'a VgrfAlloc,
        liveness: &'a RegisterLiveness,
        hw_reg_count: usize,
        block: usize,
        insts: &[Instruction],
    ) -> Self {
        let num_vgrfs = liveness.num_vgrfs();
        let mut pressure = Self {
            alloc,
            liveness,
            block,
            reads_remaining: vec![0; num_vgrfs],
            written: vec![false; num_vgrfs],
            hw_reads_remaining: vec![0; hw_reg_count],
            current: i64::from(liveness.pressure_in(block)),
            max: i64::from(liveness.pressure_in(block)),
        };
        for inst in insts {
            for (i, src) in inst.srcs.iter().enumerate() {
                if inst.is_src_duplicate(i) {
                    continue;
                }
                match src.file {
                    RegFile::Vgrf => {
                        if let Some(count) = pressure.reads_remaining.get_mut(src.nr as usize) {
                            *count += 1;
                        }
                    }
                    RegFile::FixedGrf => {
                        for reg in hw_regs(inst, i) {
                            if let Some(count) = pressure.hw_reads_remaining.get_mut(reg) {
                                *count += 1;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        pressure
    }

    /// Registers freed by scheduling `inst` next, minus registers it occupies.
    pub fn benefit(&self, inst: &Instruction) -> i64 {
        let mut benefit = 0i64;
        let dst = &inst.dst;
        if dst.file == RegFile::Vgrf {
            let v = dst.nr as usize;
            let live = self.liveness.livein(self.block).contains(v);
            if !live && !self.written.get(v).copied().unwrap_or(true) {
                benefit -= i64::from(self.alloc.size(dst.nr));
            }
        }

        let liveout = self.liveness.liveout(self.block);
        let hw_liveout = self.liveness.hw_liveout(self.block);
        for (i, src) in inst.srcs.iter().enumerate() {
            if inst.is_src_duplicate(i) {
                continue;
            }
            match src.file {
                RegFile::Vgrf => {
                    let v = src.nr as usize;
                    if !liveout.contains(v) && self.reads_remaining.get(v) == Some(&1) {
                        benefit += i64::from(self.alloc.size(src.nr));
                    }
                }
                RegFile::FixedGrf => {
                    for reg in hw_regs(inst, i) {
                        if reg < hw_liveout.len()
                            && !hw_liveout.contains(reg)
                            && self.hw_reads_remaining.get(reg) == Some(&1)
                        {
                            benefit += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        benefit
    }

    /// Accounts for `inst` having been scheduled.
    pub fn schedule(&mut self, inst: &Instruction) {
        self.current -= self.benefit(inst);
        self.max = self.max.max(self.current);

        for (i, src) in inst.srcs.iter().enumerate() {
            if inst.is_src_duplicate(i) {
                continue;
            }
            match src.file {
                RegFile::Vgrf => {
                    if let Some(count) = self.reads_remaining.get_mut(src.nr as usize) {
                        *count = count.saturating_sub(1);
                    }
                }
                RegFile::FixedGrf => {
                    for reg in hw_regs(inst, i) {
                        if let Some(count) = self.hw_reads_remaining.get_mut(reg) {
                            *count = count.saturating_sub(1);
                        }
                    }
                }
                _ => {}
            }
        }
        if inst.dst.file == RegFile::Vgrf {
            if let Some(written) = self.written.get_mut(inst.dst.nr as usize) {
                *written = true;
            }
        }
    }

    /// Highest pressure seen so far in the block.
    pub fn max(&self) -> u32 {
        u32::try_from(self.max.max(0)).unwrap_or(u32::MAX)
    }
}
