//! Machine-level instruction representation.
//!
//! This is the input collaborator of the CFG builder and the unit the
//! scheduler reorders: opcodes, register regions, predication, flag masks and
//! message descriptors. Nothing here knows about blocks.
//!
//! # Key Components
//!
//! - [`Opcode`] - Opcode table with block-delimiting and scheduling classifications
//! - [`Reg`] / [`RegFile`] / [`Arf`] - Register regions addressed by file, number and byte range
//! - [`Instruction`] - One instruction with predicate, conditional modifier and payload information
//! - [`FlagMask`] - Flag bytes touched by an instruction
//! - [`VgrfAlloc`] - Sizes of virtual registers, consumed by register-pressure tracking

mod instruction;
mod opcode;
mod reg;

pub use instruction::{CondMod, FlagMask, Instruction, MessageKind, Predicate, SendDesc, Sfid};
pub use opcode::Opcode;
pub use reg::{Arf, Reg, RegFile, VgrfAlloc, REG_SIZE};
