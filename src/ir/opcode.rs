//! Opcode table and opcode classification.
//!
//! The classification predicates here decide where the CFG builder cuts blocks
//! ([`Opcode::starts_block`], [`Opcode::ends_block`]), which instructions act as
//! scheduling barriers, and which ones touch other SIMD lanes.

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

/// Machine-level opcode of an [`crate::ir::Instruction`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Opcode {
    // ALU
    /// Register move
    Mov,
    /// Addition
    Add,
    /// Multiplication
    Mul,
    /// Fused multiply-add
    Mad,
    /// Linear interpolation
    Lrp,
    /// Predicated select
    Sel,
    /// Comparison, writes flags through its conditional modifier
    Cmp,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Bitwise not
    Not,
    /// Shift left
    Shl,
    /// Shift right
    Shr,
    /// Multiply-accumulate, reads the accumulator implicitly
    Mac,
    /// High half of a multiply, reads and writes the accumulator implicitly
    Mach,
    /// Add with carry into the accumulator
    Addc,
    /// Subtract with borrow into the accumulator
    Subb,

    // Extended math
    /// Reciprocal
    Rcp,
    /// Reciprocal square root
    Rsq,
    /// Square root
    Sqrt,
    /// Base-2 exponential
    Exp2,
    /// Base-2 logarithm
    Log2,
    /// Sine
    Sin,
    /// Cosine
    Cos,
    /// Power
    Pow,
    /// Integer division quotient
    IntQuotient,
    /// Integer division remainder
    IntRemainder,

    // Sampler
    /// Texture sample
    Tex,
    /// Texture sample with explicit LOD
    Txl,
    /// Texel fetch
    Txf,
    /// Texture size query
    Txs,

    /// Generic message to a shared function, see [`crate::ir::Sfid`]
    Send,
    /// Systolic dot-product-accumulate
    Dpas,

    // Cross-lane access
    /// Broadcast one channel to all channels
    Broadcast,
    /// Arbitrary channel permutation
    Shuffle,
    /// Permutation within groups of four channels
    QuadSwizzle,
    /// Index of the first enabled channel
    FindLiveChannel,
    /// Mask of enabled channels
    LoadLiveChannels,

    // Side effects
    /// Thread-group barrier
    Barrier,
    /// Memory fence
    MemoryFence,

    // Lane control
    /// Disables the current channels until the matching halt target
    Halt,
    /// Re-enables channels disabled by earlier halts
    HaltTarget,

    // Structured control flow
    /// Opens a divergent conditional
    If,
    /// Starts the alternative of a conditional
    Else,
    /// Closes a conditional and reconverges
    Endif,
    /// Opens a loop
    Do,
    /// Closes a loop; jumps back while its predicate holds
    While,
    /// Leaves the innermost loop
    Break,
    /// Jumps to the next iteration of the innermost loop
    Continue,

    /// No operation
    Nop,
}

impl Opcode {
    /// Returns `true` for opcodes that alter control flow, including lane control.
    #[must_use]
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            Self::If
                | Self::Else
                | Self::Endif
                | Self::Do
                | Self::While
                | Self::Break
                | Self::Continue
                | Self::Halt
        )
    }

    /// Opcodes that can only appear as the first instruction of a block.
    #[must_use]
    pub fn starts_block(self) -> bool {
        matches!(self, Self::Do | Self::Endif)
    }

    /// Opcodes that can only appear as the last instruction of a block.
    #[must_use]
    pub fn ends_block(self) -> bool {
        matches!(
            self,
            Self::If | Self::Else | Self::Continue | Self::Break | Self::Do | Self::While
        )
    }

    /// Extended math unit instructions.
    #[must_use]
    pub fn is_math(self) -> bool {
        matches!(
            self,
            Self::Rcp
                | Self::Rsq
                | Self::Sqrt
                | Self::Exp2
                | Self::Log2
                | Self::Sin
                | Self::Cos
                | Self::Pow
                | Self::IntQuotient
                | Self::IntRemainder
        )
    }

    /// Math functions taking two operands.
    #[must_use]
    pub fn is_binary_math(self) -> bool {
        matches!(self, Self::Pow | Self::IntQuotient | Self::IntRemainder)
    }

    /// Sampler messages.
    #[must_use]
    pub fn is_tex(self) -> bool {
        matches!(self, Self::Tex | Self::Txl | Self::Txf | Self::Txs)
    }

    /// Instructions whose result depends on the set of enabled channels.
    #[must_use]
    pub fn is_cross_lane(self) -> bool {
        matches!(
            self,
            Self::Broadcast
                | Self::Shuffle
                | Self::QuadSwizzle
                | Self::FindLiveChannel
                | Self::LoadLiveChannels
        )
    }

    /// Instructions with an effect invisible to register dependencies.
    #[must_use]
    pub fn has_side_effects(self) -> bool {
        matches!(self, Self::Barrier | Self::MemoryFence)
    }

    /// Instructions that accumulate into the accumulator they read.
    #[must_use]
    pub fn reads_accumulator_implicitly(self) -> bool {
        matches!(self, Self::Mac | Self::Mach)
    }

    /// Instructions that leave a side result in the accumulator.
    #[must_use]
    pub fn writes_accumulator_implicitly(self) -> bool {
        matches!(self, Self::Mac | Self::Mach | Self::Addc | Self::Subb)
    }
}
