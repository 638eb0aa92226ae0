//! Register operands.

use std::fmt;

use crate::ir::FlagMask;

/// Size in bytes of one general register.
pub const REG_SIZE: u32 = 32;

/// Architecture register selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arf {
    /// The null register; writes are discarded and reads are undefined.
    Null,
    /// Accumulator `acc<n>`.
    Accumulator(u8),
    /// Flag register `f<n>`.
    Flag(u8),
    /// Address register.
    Address,
    /// Channel enable mask.
    Mask,
    /// Any other architecture register; always scheduled as a barrier.
    Other(u8),
}

/// The register file an operand lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegFile {
    /// Unset operand slot.
    Bad,
    /// Virtual register, before register allocation.
    Vgrf,
    /// Physical general register.
    FixedGrf,
    /// Message register (message payloads on older hardware).
    Mrf,
    /// Architecture register.
    Arf(Arf),
    /// Immediate value, stored in `nr`.
    Imm,
    /// Push-constant uniform.
    Uniform,
}

/// A register region: file, register number, byte offset and byte size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg {
    /// Register file.
    pub file: RegFile,
    /// Register number (or immediate value for [`RegFile::Imm`]).
    pub nr: u32,
    /// Byte offset from the start of the register.
    pub offset: u32,
    /// Number of bytes accessed.
    pub size: u32,
}

impl Default for Reg {
    fn default() -> Self {
        Self::bad()
    }
}

impl Reg {
    const fn with_file(file: RegFile, nr: u32, size: u32) -> Self {
        Self {
            file,
            nr,
            offset: 0,
            size,
        }
    }

    /// An unset operand.
    #[must_use]
    pub const fn bad() -> Self {
        Self::with_file(RegFile::Bad, 0, 0)
    }

    /// Virtual register `nr`, one register wide.
    #[must_use]
    pub const fn vgrf(nr: u32) -> Self {
        Self::with_file(RegFile::Vgrf, nr, REG_SIZE)
    }

    /// Physical register `g<nr>`, one register wide.
    #[must_use]
    pub const fn grf(nr: u32) -> Self {
        Self::with_file(RegFile::FixedGrf, nr, REG_SIZE)
    }

    /// Message register `m<nr>`.
    #[must_use]
    pub const fn mrf(nr: u32) -> Self {
        Self::with_file(RegFile::Mrf, nr, REG_SIZE)
    }

    /// Immediate operand.
    #[must_use]
    pub const fn imm(value: u32) -> Self {
        Self::with_file(RegFile::Imm, value, 4)
    }

    /// Uniform slot `nr`.
    #[must_use]
    pub const fn uniform(nr: u32) -> Self {
        Self::with_file(RegFile::Uniform, nr, 4)
    }

    /// Architecture register.
    #[must_use]
    pub const fn arf(arf: Arf) -> Self {
        let size = match arf {
            Arf::Null => 0,
            Arf::Flag(_) => 4,
            _ => REG_SIZE,
        };
        Self::with_file(RegFile::Arf(arf), 0, size)
    }

    /// The null register.
    #[must_use]
    pub const fn null() -> Self {
        Self::arf(Arf::Null)
    }

    /// Accumulator `acc0`.
    #[must_use]
    pub const fn acc() -> Self {
        Self::arf(Arf::Accumulator(0))
    }

    /// Flag register `f<n>`.
    #[must_use]
    pub const fn flag(n: u8) -> Self {
        Self::arf(Arf::Flag(n))
    }

    /// Returns this region moved `offset` bytes into the register.
    #[must_use]
    pub const fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    /// Returns this region with an access size of `size` bytes.
    #[must_use]
    pub const fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Unset or null operands carry no data.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.file, RegFile::Bad | RegFile::Arf(Arf::Null))
    }

    /// Accumulator operand.
    #[must_use]
    pub fn is_accumulator(&self) -> bool {
        matches!(self.file, RegFile::Arf(Arf::Accumulator(_)))
    }

    /// Register-sized slots touched by this region.
    #[must_use]
    pub fn regs_spanned(&self) -> u32 {
        if self.size == 0 {
            0
        } else {
            (self.offset % REG_SIZE + self.size).div_ceil(REG_SIZE)
        }
    }

    /// Whole registers between the start of the register and the region.
    #[must_use]
    pub fn reg_offset(&self) -> u32 {
        self.offset / REG_SIZE
    }

    /// Index of the first physical register touched: `nr + offset / REG_SIZE`.
    /// Virtual registers are laid out against their [`VgrfAlloc`] instead.
    #[must_use]
    pub fn slot(&self) -> u32 {
        self.nr + self.reg_offset()
    }

    /// Flag bytes covered by an explicit flag-register operand.
    #[must_use]
    pub fn flag_bytes(&self) -> FlagMask {
        match self.file {
            RegFile::Arf(Arf::Flag(n)) => {
                let start = u32::from(n) * 4 + self.offset;
                FlagMask::byte_range(start, start + self.size.max(1))
            }
            _ => FlagMask::empty(),
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file {
            RegFile::Bad => f.write_str("(bad)"),
            RegFile::Vgrf => {
                write!(f, "vgrf{}", self.nr)?;
                if self.offset != 0 {
                    write!(f, "+{}", self.offset)?;
                }
                Ok(())
            }
            RegFile::FixedGrf => {
                write!(f, "g{}", self.nr + self.offset / REG_SIZE)?;
                if self.offset % REG_SIZE != 0 {
                    write!(f, ".{}", self.offset % REG_SIZE)?;
                }
                Ok(())
            }
            RegFile::Mrf => write!(f, "m{}", self.nr),
            RegFile::Arf(arf) => match arf {
                Arf::Null => f.write_str("null"),
                Arf::Accumulator(n) => write!(f, "acc{n}"),
                Arf::Flag(n) => write!(f, "f{n}"),
                Arf::Address => f.write_str("a0"),
                Arf::Mask => f.write_str("mask0"),
                Arf::Other(n) => write!(f, "arf{n}"),
            },
            RegFile::Imm => write!(f, "{}u", self.nr),
            RegFile::Uniform => write!(f, "u{}", self.nr),
        }
    }
}

/// Sizes of the virtual registers of a shader, in registers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VgrfAlloc {
    sizes: Vec<u32>,
}

impl VgrfAlloc {
    /// Creates an empty allocation table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a virtual register `size` registers wide and returns its number.
    pub fn allocate(&mut self, size: u32) -> u32 {
        self.sizes.push(size.max(1));
        u32::try_from(self.sizes.len() - 1).unwrap_or(u32::MAX)
    }

    /// Number of virtual registers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Returns `true` if no virtual register was allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Size of virtual register `nr`, or 1 for registers outside the table.
    #[must_use]
    pub fn size(&self, nr: u32) -> u32 {
        self.sizes.get(nr as usize).copied().unwrap_or(1)
    }
}
