//! Instructions and the per-instruction facts the CFG and scheduler consume.

use std::fmt;

use bitflags::bitflags;

use crate::ir::{Arf, Opcode, Reg, RegFile};

bitflags! {
    /// Flag bytes read or written by an instruction.
    ///
    /// The two 32-bit flag registers are tracked at byte granularity: bit `i`
    /// covers flag byte `i`, so `f0.0` is bits 0-1 and `f1.1` is bits 6-7.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FlagMask: u8 {
        /// `f0.0` low byte
        const F0_0_LO = 1 << 0;
        /// `f0.0` high byte
        const F0_0_HI = 1 << 1;
        /// `f0.1` low byte
        const F0_1_LO = 1 << 2;
        /// `f0.1` high byte
        const F0_1_HI = 1 << 3;
        /// `f1.0` low byte
        const F1_0_LO = 1 << 4;
        /// `f1.0` high byte
        const F1_0_HI = 1 << 5;
        /// `f1.1` low byte
        const F1_1_LO = 1 << 6;
        /// `f1.1` high byte
        const F1_1_HI = 1 << 7;
    }
}

impl FlagMask {
    /// Number of tracked flag bytes.
    pub const BYTES: usize = 8;

    /// Mask covering flag bytes `start..end`, clamped to the tracked range.
    #[must_use]
    pub fn byte_range(start: u32, end: u32) -> Self {
        let end = end.min(Self::BYTES as u32);
        if start >= end {
            return Self::empty();
        }
        let bits = ((1u32 << end) - 1) & !((1u32 << start) - 1);
        Self::from_bits_truncate(bits as u8)
    }
}

/// Predication of an instruction on the flag register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Predicate {
    /// Executes on every enabled channel.
    #[default]
    None,
    /// Per-channel flag bit.
    Normal,
    /// Any channel of the group has its flag bit set.
    Any,
    /// All channels of the group have their flag bit set.
    All,
}

/// Conditional modifier: the comparison whose result is written to the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CondMod {
    /// Zero / equal
    Z,
    /// Not zero / not equal
    Nz,
    /// Greater than
    G,
    /// Greater or equal
    Ge,
    /// Less than
    L,
    /// Less or equal
    Le,
}

/// Shared function a message is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Sfid {
    /// Texture sampler
    Sampler,
    /// Render cache (render target writes, typed surfaces)
    RenderCache,
    /// Legacy data cache (untyped surfaces, scratch)
    DataCache,
    /// Pixel interpolator
    PixelInterpolator,
    /// Unified return buffer
    Urb,
    /// Load/store untyped global memory
    Ugm,
    /// Load/store shared local memory
    Slm,
    /// Load/store typed global memory
    Tgm,
}

/// Operation performed by a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum MessageKind {
    /// Texture sample
    Sample,
    /// Resource size / sample-count query
    ResInfo,
    /// Memory load
    Read,
    /// Memory store
    Write,
    /// Atomic read-modify-write
    Atomic,
    /// Typed surface load
    TypedRead,
    /// Typed surface store
    TypedWrite,
    /// Typed surface atomic
    TypedAtomic,
    /// Block (oword) load
    BlockRead,
    /// Attribute interpolation
    Interpolate,
    /// Render target write
    RenderTargetWrite,
}

/// Message descriptor of a [`Opcode::Send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SendDesc {
    /// Target shared function.
    pub sfid: Sfid,
    /// Operation.
    pub kind: MessageKind,
}

/// One machine-level instruction.
///
/// Fields are public so producers can fill them in directly; the builder-style
/// methods cover the common cases.
///
/// ```rust
/// use simdcfg::ir::{CondMod, Instruction, Opcode, Reg};
///
/// let cmp = Instruction::new(Opcode::Cmp)
///     .dst(Reg::null())
///     .src(Reg::vgrf(0))
///     .src(Reg::imm(0))
///     .cond(CondMod::Nz);
/// let brk = Instruction::new(Opcode::Break).predicated(false);
///
/// assert!(!cmp.flags_written().is_empty());
/// assert_eq!(cmp.flags_written(), brk.flags_read());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Operation.
    pub opcode: Opcode,
    /// Destination region.
    pub dst: Reg,
    /// Source regions.
    pub srcs: Vec<Reg>,
    /// Predication mode.
    pub predicate: Predicate,
    /// Execute where the predicate is false instead.
    pub predicate_inverse: bool,
    /// Conditional modifier writing the flags.
    pub cond_mod: Option<CondMod>,
    /// Flag subregister (`f0.0` = 0 .. `f1.1` = 3) used by predicate and conditional modifier.
    pub flag_subreg: u8,
    /// SIMD width.
    pub exec_size: u8,
    /// First channel of the execution group.
    pub group: u8,
    /// Message descriptor for sends.
    pub send: Option<SendDesc>,
    /// The message has effects beyond its destination (stores, atomics).
    pub side_effects: bool,
    /// First message register of an implicit payload.
    pub base_mrf: Option<u32>,
    /// Payload length in registers.
    pub mlen: u32,
    /// Writes the accumulator as a side result.
    pub writes_accumulator: bool,
    /// DPAS repeat count.
    pub rcount: u8,
}

impl Instruction {
    /// Creates a SIMD8 instruction with no operands.
    #[must_use]
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            dst: Reg::bad(),
            srcs: Vec::new(),
            predicate: Predicate::None,
            predicate_inverse: false,
            cond_mod: None,
            flag_subreg: 0,
            exec_size: 8,
            group: 0,
            send: None,
            side_effects: false,
            base_mrf: None,
            mlen: 0,
            writes_accumulator: false,
            rcount: 0,
        }
    }

    /// Sets the destination.
    #[must_use]
    pub fn dst(mut self, dst: Reg) -> Self {
        self.dst = dst;
        self
    }

    /// Appends a source.
    #[must_use]
    pub fn src(mut self, src: Reg) -> Self {
        self.srcs.push(src);
        self
    }

    /// Predicates on `f0.0`, optionally inverted.
    #[must_use]
    pub fn predicated(mut self, inverse: bool) -> Self {
        self.predicate = Predicate::Normal;
        self.predicate_inverse = inverse;
        self
    }

    /// Sets the conditional modifier.
    #[must_use]
    pub fn cond(mut self, cond: CondMod) -> Self {
        self.cond_mod = Some(cond);
        self
    }

    /// Selects the flag subregister.
    #[must_use]
    pub fn flag_subreg(mut self, subreg: u8) -> Self {
        self.flag_subreg = subreg;
        self
    }

    /// Sets the SIMD width.
    #[must_use]
    pub fn exec(mut self, exec_size: u8) -> Self {
        self.exec_size = exec_size;
        self
    }

    /// Turns the instruction into a message to `sfid`.
    #[must_use]
    pub fn message(mut self, sfid: Sfid, kind: MessageKind) -> Self {
        self.send = Some(SendDesc { sfid, kind });
        self.side_effects |= matches!(
            kind,
            MessageKind::Write
                | MessageKind::Atomic
                | MessageKind::TypedWrite
                | MessageKind::TypedAtomic
                | MessageKind::RenderTargetWrite
        );
        self
    }

    /// Attaches an implicit message-register payload.
    #[must_use]
    pub fn payload(mut self, base_mrf: u32, mlen: u32) -> Self {
        self.base_mrf = Some(base_mrf);
        self.mlen = mlen;
        self
    }

    /// Marks the accumulator as written.
    #[must_use]
    pub fn writes_acc(mut self) -> Self {
        self.writes_accumulator = true;
        self
    }

    /// Sets the DPAS repeat count.
    #[must_use]
    pub fn repeat(mut self, rcount: u8) -> Self {
        self.rcount = rcount;
        self
    }

    /// Returns `true` if the instruction is predicated.
    #[must_use]
    pub fn is_predicated(&self) -> bool {
        self.predicate != Predicate::None
    }

    /// Copies predicate and inversion from `other`.
    pub fn copy_predicate(&mut self, other: &Instruction) {
        self.predicate = other.predicate;
        self.predicate_inverse = other.predicate_inverse;
        self.flag_subreg = other.flag_subreg;
    }

    /// Effects invisible to register dependencies.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        self.opcode.has_side_effects() || self.side_effects
    }

    /// Nothing may be reordered across this instruction.
    #[must_use]
    pub fn is_scheduling_barrier(&self) -> bool {
        self.opcode == Opcode::HaltTarget || self.opcode.is_control_flow() || self.has_side_effects()
    }

    /// The result depends on which channels are enabled.
    #[must_use]
    pub fn has_cross_lane_access(&self) -> bool {
        self.opcode.is_cross_lane()
            || self
                .srcs
                .iter()
                .any(|s| matches!(s.file, RegFile::Arf(Arf::Mask)))
    }

    /// Reads the accumulator without naming it as a source.
    #[must_use]
    pub fn reads_accumulator_implicitly(&self) -> bool {
        self.opcode.reads_accumulator_implicitly()
    }

    /// Writes the accumulator without naming it as the destination.
    #[must_use]
    pub fn writes_accumulator_implicitly(&self) -> bool {
        self.writes_accumulator || self.opcode.writes_accumulator_implicitly()
    }

    /// Register slots read by source `i`.
    #[must_use]
    pub fn regs_read(&self, i: usize) -> u32 {
        self.srcs.get(i).map_or(0, Reg::regs_spanned)
    }

    /// Register slots written by the destination.
    #[must_use]
    pub fn regs_written(&self) -> u32 {
        self.dst.regs_spanned()
    }

    /// Executes as two register-wide halves.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.exec_size >= 16
    }

    /// Source `i` repeats an earlier source operand.
    #[must_use]
    pub fn is_src_duplicate(&self, i: usize) -> bool {
        self.srcs[..i].contains(&self.srcs[i])
    }

    /// Message registers written as an implicit payload.
    #[must_use]
    pub fn implied_mrf_writes(&self) -> u32 {
        if self.mlen == 0 || self.base_mrf.is_none() {
            return 0;
        }
        let halves = u32::from(self.exec_size).div_ceil(8);
        if self.opcode.is_binary_math() {
            2 * halves
        } else if self.opcode.is_math() {
            halves
        } else if self.opcode.is_tex() {
            1
        } else {
            0
        }
    }

    fn flag_channel_mask(&self) -> FlagMask {
        let start = u32::from(self.flag_subreg) * 16 + u32::from(self.group);
        let end = start + u32::from(self.exec_size);
        FlagMask::byte_range(start / 8, end.div_ceil(8))
    }

    /// Flag bytes read through the predicate or flag-register sources.
    #[must_use]
    pub fn flags_read(&self) -> FlagMask {
        let mut mask = if self.is_predicated() {
            self.flag_channel_mask()
        } else {
            FlagMask::empty()
        };
        for src in &self.srcs {
            mask |= src.flag_bytes();
        }
        mask
    }

    /// Flag bytes written through the conditional modifier or a flag-register destination.
    #[must_use]
    pub fn flags_written(&self) -> FlagMask {
        let mut mask = FlagMask::empty();
        if self.cond_mod.is_some()
            && !matches!(self.opcode, Opcode::Sel | Opcode::If | Opcode::While)
        {
            mask |= self.flag_channel_mask();
        }
        mask | self.dst.flag_bytes()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_predicated() {
            let sign = if self.predicate_inverse { '-' } else { '+' };
            write!(
                f,
                "({sign}f{}.{}",
                self.flag_subreg / 2,
                self.flag_subreg % 2
            )?;
            match self.predicate {
                Predicate::Any => f.write_str(".any")?,
                Predicate::All => f.write_str(".all")?,
                _ => {}
            }
            f.write_str(") ")?;
        }
        write!(f, "{}", self.opcode)?;
        if let Some(cond) = self.cond_mod {
            write!(f, ".{cond}")?;
        }
        write!(f, "({})", self.exec_size)?;

        let mut operands = std::iter::once(&self.dst)
            .filter(|d| d.file != RegFile::Bad)
            .chain(self.srcs.iter())
            .peekable();
        if operands.peek().is_some() {
            f.write_str(" ")?;
        }
        for (i, reg) in operands.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{reg}")?;
        }
        if let Some(send) = self.send {
            write!(f, " {{{} {}}}", send.sfid, send.kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range() {
        assert_eq!(FlagMask::byte_range(0, 2), FlagMask::F0_0_LO | FlagMask::F0_0_HI);
        assert_eq!(FlagMask::byte_range(6, 12), FlagMask::F1_1_LO | FlagMask::F1_1_HI);
        assert!(FlagMask::byte_range(3, 3).is_empty());
    }

    #[test]
    fn test_predicate_reads_flag_subreg() {
        let simd8 = Instruction::new(Opcode::Mov).predicated(false);
        assert_eq!(simd8.flags_read(), FlagMask::F0_0_LO);

        let simd16 = Instruction::new(Opcode::Mov).exec(16).predicated(false);
        assert_eq!(simd16.flags_read(), FlagMask::F0_0_LO | FlagMask::F0_0_HI);

        let f1 = Instruction::new(Opcode::Mov).predicated(true).flag_subreg(2);
        assert_eq!(f1.flags_read(), FlagMask::F1_0_LO);
        assert!(f1.flags_written().is_empty());
    }

    #[test]
    fn test_sel_condmod_does_not_write_flags() {
        let sel = Instruction::new(Opcode::Sel)
            .dst(Reg::vgrf(0))
            .src(Reg::vgrf(1))
            .src(Reg::vgrf(2))
            .cond(CondMod::L);
        assert!(sel.flags_written().is_empty());

        let cmp = Instruction::new(Opcode::Cmp).dst(Reg::null()).cond(CondMod::L);
        assert_eq!(cmp.flags_written(), FlagMask::F0_0_LO);
    }

    #[test]
    fn test_barrier_classification() {
        assert!(Instruction::new(Opcode::If).is_scheduling_barrier());
        assert!(Instruction::new(Opcode::HaltTarget).is_scheduling_barrier());
        assert!(Instruction::new(Opcode::Barrier).is_scheduling_barrier());
        assert!(!Instruction::new(Opcode::Add).is_scheduling_barrier());

        let store = Instruction::new(Opcode::Send).message(Sfid::DataCache, MessageKind::Write);
        assert!(store.is_scheduling_barrier());
        let load = Instruction::new(Opcode::Send).message(Sfid::DataCache, MessageKind::Read);
        assert!(!load.is_scheduling_barrier());
    }

    #[test]
    fn test_implied_mrf_writes() {
        let pow = Instruction::new(Opcode::Pow).exec(16).payload(2, 4);
        assert_eq!(pow.implied_mrf_writes(), 4);
        let rcp = Instruction::new(Opcode::Rcp).payload(2, 1);
        assert_eq!(rcp.implied_mrf_writes(), 1);
        assert_eq!(Instruction::new(Opcode::Rcp).implied_mrf_writes(), 0);
    }

    #[test]
    fn test_duplicate_sources() {
        let mul = Instruction::new(Opcode::Mul)
            .dst(Reg::vgrf(0))
            .src(Reg::vgrf(1))
            .src(Reg::vgrf(1));
        assert!(!mul.is_src_duplicate(0));
        assert!(mul.is_src_duplicate(1));
    }

    #[test]
    fn test_display() {
        let add = Instruction::new(Opcode::Add)
            .dst(Reg::vgrf(3))
            .src(Reg::vgrf(1))
            .src(Reg::imm(2))
            .predicated(true);
        assert_eq!(add.to_string(), "(-f0.0) add(8) vgrf3, vgrf1, 2u");
        assert_eq!(Instruction::new(Opcode::Endif).to_string(), "endif(8)");

        let cmp = Instruction::new(Opcode::Cmp)
            .dst(Reg::null())
            .src(Reg::vgrf(0))
            .src(Reg::imm(0))
            .cond(CondMod::Ge)
            .exec(16);
        assert_eq!(cmp.to_string(), "cmp.ge(16) null, vgrf0, 0u");

        let tex = Instruction::new(Opcode::Send)
            .dst(Reg::vgrf(4))
            .src(Reg::vgrf(5))
            .message(Sfid::Sampler, MessageKind::Sample);
        assert_eq!(tex.to_string(), "send(8) vgrf4, vgrf5 {Sampler Sample}");
    }
}
