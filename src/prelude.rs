//! # simdcfg Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! and traits of the simdcfg library. Import it to get quick access to the
//! essential types for building, rewriting and scheduling shader CFGs.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all simdcfg operations
pub use crate::Error;

/// The result type used throughout simdcfg
pub use crate::Result;

// ================================================================================================
// Instruction IR
// ================================================================================================

/// Instructions and their operands
pub use crate::ir::{
    Arf, CondMod, FlagMask, Instruction, MessageKind, Opcode, Predicate, Reg, RegFile, Sfid,
    VgrfAlloc,
};

// ================================================================================================
// Control-Flow Graph
// ================================================================================================

/// Graph, blocks and edges
pub use crate::cfg::{BasicBlock, BlockId, BlockLink, ControlFlowGraph, DependencyClass, EdgeKind};

/// Analyses
pub use crate::analysis::{DominanceTree, RegisterLiveness};

// ================================================================================================
// Passes and Scheduling
// ================================================================================================

/// CFG passes
pub use crate::passes::{CfgPass, DeadControlFlowPass, PredicatedBreakPass};

/// Instruction scheduling
pub use crate::scheduler::{InstructionScheduler, ScheduleMode, ScheduleStats};

// ================================================================================================
// Compilation Driver
// ================================================================================================

/// Configuration, events and the pipeline
pub use crate::compiler::{
    CompileOutput, Compiler, DeviceInfo, EventKind, EventLog, PassPipeline, PipelineConfig,
    ScheduleStage, SchedulerConfig, ShaderUnit,
};
