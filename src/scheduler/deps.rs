//! Dependency construction.
//!
//! Two passes over the block. Top-down adds read-after-write and
//! write-after-write edges against the last writer of every register slot;
//! bottom-up adds write-after-read edges against the next writer. Register
//! slots are tracked per file:
//!
//! - virtual registers per register, laid out back to back by their
//!   allocated sizes so that no two of them share a slot
//! - fixed GRFs per register after allocation, as a single slot before it
//!   since the allocator may still place virtual registers on top of them
//! - message registers per register, including implicit payloads
//! - flags per byte, the accumulator as one slot
//!
//! Any other architecture register makes the instruction a barrier.

use crate::{
    ir::{Arf, Instruction, Reg, RegFile, VgrfAlloc},
    scheduler::node::DependencyGraph,
};

/// Last node to touch each slot of a register file.
#[derive(Debug, Default)]
struct Tracker {
    slots: Vec<Option<usize>>,
}

impl Tracker {
    fn get(&self, slot: u32) -> Option<usize> {
        self.slots.get(slot as usize).copied().flatten()
    }

    fn set(&mut self, slot: u32, node: usize) {
        let slot = slot as usize;
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(node);
    }
}

#[derive(Debug, Default)]
struct LastAccess {
    vgrf: Tracker,
    grf: Tracker,
    mrf: Tracker,
    fixed_grf: Option<usize>,
    flags: [Option<usize>; 8],
    accumulator: Option<usize>,
}

/// Registers reserved for each virtual register missing from the allocation
/// table.
const UNALLOCATED_VGRF_SPAN: u32 = 16;

/// First tracker slot of every virtual register.
#[derive(Debug)]
struct VgrfLayout {
    starts: Vec<u32>,
    count: u32,
    end: u32,
}

impl VgrfLayout {
    fn new(alloc: &VgrfAlloc) -> Self {
        let count = u32::try_from(alloc.len()).unwrap_or(u32::MAX);
        let mut starts = Vec::with_capacity(alloc.len());
        let mut end = 0u32;
        for nr in 0..count {
            starts.push(end);
            end = end.saturating_add(alloc.size(nr));
        }
        Self { starts, count, end }
    }

    fn start(&self, nr: u32) -> u32 {
        if let Some(&start) = self.starts.get(nr as usize) {
            return start;
        }
        let extra = nr - self.count;
        self.end.saturating_add(extra.saturating_mul(UNALLOCATED_VGRF_SPAN))
    }

    fn slots(&self, reg: &Reg, count: u32) -> impl Iterator<Item = u32> {
        let first = self.start(reg.nr) + reg.reg_offset();
        (0..count).map(move |r| first + r)
    }
}

fn is_barrier_arf(reg: &Reg) -> bool {
    matches!(
        reg.file,
        RegFile::Arf(Arf::Address | Arf::Mask | Arf::Other(_))
    )
}

fn slots(reg: &Reg, count: u32) -> impl Iterator<Item = u32> {
    let first = reg.slot();
    (0..count).map(move |r| first + r)
}

fn flag_bits(mask: u8) -> impl Iterator<Item = usize> {
    (0..8).filter(move |i| mask & (1 << i) != 0)
}

/// Orders `n` after every instruction back to the previous barrier and
/// before every instruction up to the next one.
fn add_barrier_deps(g: &mut DependencyGraph, insts: &[Instruction], n: usize) {
    for prev in (0..n).rev() {
        g.add_dep(Some(prev), Some(n), Some(0));
        if insts[prev].is_scheduling_barrier() {
            break;
        }
    }
    for next in n + 1..insts.len() {
        g.add_dep(Some(n), Some(next), Some(0));
        if insts[next].is_scheduling_barrier() {
            break;
        }
    }
}

/// Instructions depending on the channel enables keep their relative order.
fn add_cross_lane_deps(g: &mut DependencyGraph, insts: &[Instruction], n: usize) {
    for prev in (0..n).rev() {
        if insts[prev].has_cross_lane_access() {
            g.add_dep(Some(prev), Some(n), Some(0));
        }
    }
}

/// Fills `g` with every dependency among `insts`.
pub(crate) fn calculate_deps(
    g: &mut DependencyGraph,
    insts: &[Instruction],
    alloc: &VgrfAlloc,
    post_reg_alloc: bool,
) {
    let layout = VgrfLayout::new(alloc);
    let mut last = LastAccess::default();

    for (n, inst) in insts.iter().enumerate() {
        let me = Some(n);
        if inst.is_scheduling_barrier() {
            add_barrier_deps(g, insts, n);
        }
        if inst.has_cross_lane_access() {
            add_cross_lane_deps(g, insts, n);
        }

        // Read after write.
        for (i, src) in inst.srcs.iter().enumerate() {
            let regs = inst.regs_read(i);
            match src.file {
                RegFile::Vgrf => {
                    for slot in layout.slots(src, regs) {
                        g.add_dep(last.vgrf.get(slot), me, None);
                    }
                }
                RegFile::FixedGrf if post_reg_alloc => {
                    for slot in slots(src, regs) {
                        g.add_dep(last.grf.get(slot), me, None);
                    }
                }
                RegFile::FixedGrf => g.add_dep(last.fixed_grf, me, None),
                _ if src.is_accumulator() => g.add_dep(last.accumulator, me, None),
                _ if is_barrier_arf(src) => add_barrier_deps(g, insts, n),
                _ => {}
            }
        }
        if let Some(base) = inst.base_mrf {
            for i in 0..inst.mlen {
                g.add_dep(last.mrf.get(base + i), me, None);
            }
        }
        for bit in flag_bits(inst.flags_read().bits()) {
            g.add_dep(last.flags[bit], me, None);
        }
        if inst.reads_accumulator_implicitly() {
            g.add_dep(last.accumulator, me, None);
        }

        // Write after write.
        let dst = &inst.dst;
        match dst.file {
            RegFile::Vgrf => {
                for slot in layout.slots(dst, inst.regs_written()) {
                    g.add_dep(last.vgrf.get(slot), me, None);
                    last.vgrf.set(slot, n);
                }
            }
            RegFile::Mrf => {
                let count = if inst.is_compressed() { 2 } else { 1 };
                for reg in dst.nr..dst.nr + count {
                    g.add_dep(last.mrf.get(reg), me, None);
                    last.mrf.set(reg, n);
                }
            }
            RegFile::FixedGrf if post_reg_alloc => {
                for slot in slots(dst, inst.regs_written()) {
                    g.add_dep(last.grf.get(slot), me, None);
                    last.grf.set(slot, n);
                }
            }
            RegFile::FixedGrf => {
                g.add_dep(last.fixed_grf, me, None);
                last.fixed_grf = me;
            }
            _ if dst.is_accumulator() => {
                g.add_dep(last.accumulator, me, None);
                last.accumulator = me;
            }
            _ if is_barrier_arf(dst) => add_barrier_deps(g, insts, n),
            _ => {}
        }
        if let Some(base) = inst.base_mrf.filter(|_| inst.mlen > 0) {
            for i in 0..inst.implied_mrf_writes() {
                g.add_dep(last.mrf.get(base + i), me, None);
                last.mrf.set(base + i, n);
            }
        }
        for bit in flag_bits(inst.flags_written().bits()) {
            g.add_dep(last.flags[bit], me, Some(0));
            last.flags[bit] = me;
        }
        if inst.writes_accumulator_implicitly() && !dst.is_accumulator() {
            g.add_dep(last.accumulator, me, None);
            last.accumulator = me;
        }
    }

    // Write after read: the trackers now hold the next writer of each slot.
    let mut next = LastAccess::default();
    for (n, inst) in insts.iter().enumerate().rev() {
        let me = Some(n);

        for (i, src) in inst.srcs.iter().enumerate() {
            let regs = inst.regs_read(i);
            match src.file {
                RegFile::Vgrf => {
                    for slot in layout.slots(src, regs) {
                        g.add_dep(me, next.vgrf.get(slot), Some(0));
                    }
                }
                RegFile::FixedGrf if post_reg_alloc => {
                    for slot in slots(src, regs) {
                        g.add_dep(me, next.grf.get(slot), Some(0));
                    }
                }
                RegFile::FixedGrf => g.add_dep(me, next.fixed_grf, Some(0)),
                _ if src.is_accumulator() => g.add_dep(me, next.accumulator, Some(0)),
                _ if is_barrier_arf(src) => add_barrier_deps(g, insts, n),
                _ => {}
            }
        }
        if let Some(base) = inst.base_mrf {
            for i in 0..inst.mlen {
                g.add_dep(me, next.mrf.get(base + i), Some(2));
            }
        }
        for bit in flag_bits(inst.flags_read().bits()) {
            g.add_dep(me, next.flags[bit], None);
        }
        if inst.reads_accumulator_implicitly() {
            g.add_dep(me, next.accumulator, Some(0));
        }

        let dst = &inst.dst;
        match dst.file {
            RegFile::Vgrf => {
                for slot in layout.slots(dst, inst.regs_written()) {
                    next.vgrf.set(slot, n);
                }
            }
            RegFile::Mrf => {
                let count = if inst.is_compressed() { 2 } else { 1 };
                for reg in dst.nr..dst.nr + count {
                    next.mrf.set(reg, n);
                }
            }
            RegFile::FixedGrf if post_reg_alloc => {
                for slot in slots(dst, inst.regs_written()) {
                    next.grf.set(slot, n);
                }
            }
            RegFile::FixedGrf => next.fixed_grf = me,
            _ if dst.is_accumulator() => next.accumulator = me,
            _ if is_barrier_arf(dst) => add_barrier_deps(g, insts, n),
            _ => {}
        }
        if let Some(base) = inst.base_mrf.filter(|_| inst.mlen > 0) {
            for i in 0..inst.implied_mrf_writes() {
                next.mrf.set(base + i, n);
            }
        }
        for bit in flag_bits(inst.flags_written().bits()) {
            next.flags[bit] = me;
        }
        if inst.writes_accumulator_implicitly() {
            next.accumulator = me;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::DeviceInfo,
        ir::{CondMod, MessageKind, Opcode, Sfid, REG_SIZE},
    };

    fn deps(insts: &[Instruction], post: bool) -> DependencyGraph {
        deps_with(insts, &VgrfAlloc::new(), post)
    }

    fn deps_with(insts: &[Instruction], alloc: &VgrfAlloc, post: bool) -> DependencyGraph {
        let mut g = DependencyGraph::new(insts, &DeviceInfo::default(), post);
        calculate_deps(&mut g, insts, alloc, post);
        g
    }

    fn mov(dst: Reg, src: Reg) -> Instruction {
        Instruction::new(Opcode::Mov).dst(dst).src(src)
    }

    #[test]
    fn test_read_after_write_uses_writer_latency() {
        let insts = [
            Instruction::new(Opcode::Send)
                .dst(Reg::vgrf(1))
                .src(Reg::vgrf(0))
                .message(Sfid::Sampler, MessageKind::Sample),
            mov(Reg::vgrf(2), Reg::vgrf(1)),
            mov(Reg::vgrf(3), Reg::imm(0)),
        ];
        let g = deps(&insts, true);
        assert_eq!(g.edge_latency(0, 1), Some(200));
        assert!(!g.has_dep(0, 2));
        assert!(!g.has_dep(1, 2));
    }

    #[test]
    fn test_write_after_read_and_write() {
        let insts = [
            mov(Reg::vgrf(1), Reg::vgrf(0)),
            mov(Reg::vgrf(0), Reg::imm(1)),
            mov(Reg::vgrf(0), Reg::imm(2)),
        ];
        let g = deps(&insts, true);
        assert_eq!(g.edge_latency(0, 1), Some(0), "WAR");
        assert_eq!(g.edge_latency(1, 2), Some(14), "WAW carries the writer latency");
    }

    #[test]
    fn test_vgrf_slots_do_not_alias_across_offsets() {
        let insts = [
            mov(Reg::vgrf(0), Reg::imm(1)),
            mov(Reg::vgrf(0).with_offset(32), Reg::imm(2)),
            mov(Reg::vgrf(1), Reg::vgrf(0).with_offset(32)),
        ];
        let g = deps(&insts, false);
        assert!(!g.has_dep(0, 1));
        assert!(!g.has_dep(0, 2));
        assert!(g.has_dep(1, 2));
    }

    #[test]
    fn test_wide_vgrf_does_not_alias_its_neighbour() {
        let mut alloc = VgrfAlloc::new();
        alloc.allocate(20);
        alloc.allocate(1);
        let insts = [
            mov(Reg::vgrf(0).with_offset(16 * REG_SIZE), Reg::imm(1)),
            mov(Reg::vgrf(1), Reg::imm(2)),
            mov(Reg::vgrf(2), Reg::vgrf(0).with_offset(16 * REG_SIZE)),
            mov(Reg::vgrf(3), Reg::vgrf(1)),
        ];
        let g = deps_with(&insts, &alloc, false);
        assert!(!g.has_dep(0, 1));
        assert!(g.has_dep(0, 2));
        assert!(!g.has_dep(1, 2));
        assert!(g.has_dep(1, 3));
        assert!(!g.has_dep(0, 3));
    }

    #[test]
    fn test_flags() {
        let insts = [
            Instruction::new(Opcode::Cmp)
                .dst(Reg::null())
                .src(Reg::vgrf(0))
                .src(Reg::imm(0))
                .cond(CondMod::Nz),
            mov(Reg::vgrf(1), Reg::imm(1)).predicated(false),
            Instruction::new(Opcode::Cmp)
                .dst(Reg::null())
                .src(Reg::vgrf(0))
                .src(Reg::imm(4))
                .cond(CondMod::G),
        ];
        let g = deps(&insts, true);
        assert_eq!(g.edge_latency(0, 1), Some(14), "flag RAW");
        assert_eq!(g.edge_latency(0, 2), Some(0), "flag WAW");
        assert_eq!(g.edge_latency(1, 2), Some(14), "flag WAR uses the reader latency");
    }

    #[test]
    fn test_payload_war_latency() {
        let insts = [
            Instruction::new(Opcode::Send)
                .dst(Reg::grf(10))
                .message(Sfid::Urb, MessageKind::Read)
                .payload(2, 1),
            mov(Reg::mrf(2), Reg::grf(11)),
        ];
        let g = deps(&insts, true);
        assert_eq!(g.edge_latency(0, 1), Some(2));

        let math = [
            Instruction::new(Opcode::Rcp).dst(Reg::grf(10)).payload(2, 1),
            mov(Reg::mrf(2), Reg::grf(11)),
        ];
        let g = deps(&math, true);
        assert_eq!(g.edge_latency(0, 1), Some(16), "implied payload write");

        let reads = [
            Instruction::new(Opcode::Send)
                .dst(Reg::grf(10))
                .message(Sfid::Urb, MessageKind::Write)
                .payload(2, 1),
            Instruction::new(Opcode::Nop),
        ];
        let g = deps(&reads, true);
        assert!(g.has_dep(0, 1), "barrier");
    }

    #[test]
    fn test_fixed_grfs_share_one_slot_before_allocation() {
        let insts = [mov(Reg::grf(2), Reg::imm(0)), mov(Reg::vgrf(0), Reg::grf(5))];
        assert!(deps(&insts, false).has_dep(0, 1));
        assert!(!deps(&insts, true).has_dep(0, 1));
    }

    #[test]
    fn test_barrier_orders_neighbours() {
        let insts = [
            mov(Reg::vgrf(0), Reg::imm(0)),
            Instruction::new(Opcode::Barrier),
            mov(Reg::vgrf(1), Reg::imm(1)),
            mov(Reg::vgrf(2), Reg::arf(Arf::Address)),
        ];
        let g = deps(&insts, false);
        assert!(g.has_dep(0, 1));
        assert!(g.has_dep(1, 2));
        assert!(g.has_dep(1, 3));
        assert!(g.has_dep(2, 3), "address register reads act as barriers");
    }

    #[test]
    fn test_cross_lane_order_is_kept() {
        let insts = [
            Instruction::new(Opcode::FindLiveChannel).dst(Reg::vgrf(0)),
            mov(Reg::vgrf(1), Reg::imm(0)),
            Instruction::new(Opcode::Broadcast).dst(Reg::vgrf(2)).src(Reg::vgrf(3)),
        ];
        let g = deps(&insts, false);
        assert!(g.has_dep(0, 2));
        assert!(!g.has_dep(1, 2));
    }

    #[test]
    fn test_implicit_accumulator() {
        let insts = [
            Instruction::new(Opcode::Mul).dst(Reg::vgrf(0)).writes_acc(),
            Instruction::new(Opcode::Mach).dst(Reg::vgrf(1)),
        ];
        let g = deps(&insts, false);
        assert!(g.has_dep(0, 1));
    }
}
