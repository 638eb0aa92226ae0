//! Configuration for the scheduler and the pass pipeline.
//!
//! All settings are plain structs with public fields; construct them with
//! `..Default::default()` and override what differs.

use crate::scheduler::ScheduleMode;

/// Hardware generation the code is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Graphics IP version (4 through 12).
    pub ver: u32,
    /// Haswell variant of Gfx7, with faster math and MAD.
    pub is_haswell: bool,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            ver: 9,
            is_haswell: false,
        }
    }
}

impl DeviceInfo {
    /// Device of generation `ver`.
    #[must_use]
    pub const fn new(ver: u32) -> Self {
        Self {
            ver,
            is_haswell: false,
        }
    }

    /// A Haswell device (Gfx7.5).
    #[must_use]
    pub const fn haswell() -> Self {
        Self {
            ver: 7,
            is_haswell: true,
        }
    }
}

/// Configuration for [`crate::scheduler::InstructionScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Target device (default: Gfx9).
    pub device: DeviceInfo,

    /// Fixed GRFs tracked by the pre-allocation pressure heuristic (default: 128).
    pub hw_reg_count: usize,

    /// Registers available to the allocator; a pre-allocation schedule whose
    /// simulated pressure stays within this budget is accepted (default: 128).
    pub register_budget: u32,

    /// Pre-allocation modes tried in order by
    /// [`schedule_pre_ra`](crate::scheduler::InstructionScheduler::schedule_pre_ra)
    /// (default: `Pre`, `PreNonLifo`, `None`, `PreLifo`).
    pub pre_ra_modes: Vec<ScheduleMode>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            device: DeviceInfo::default(),
            hw_reg_count: 128,
            register_budget: 128,
            pre_ra_modes: vec![
                ScheduleMode::Pre,
                ScheduleMode::PreNonLifo,
                ScheduleMode::None,
                ScheduleMode::PreLifo,
            ],
        }
    }
}

/// Which scheduling run [`crate::compiler::Compiler::compile`] performs after
/// the CFG passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScheduleStage {
    /// Leave instruction order untouched.
    Skip,
    /// Virtual registers: pick the best pre-allocation mode.
    #[default]
    PreRegAlloc,
    /// Physical registers: latency-driven scheduling.
    PostRegAlloc,
}

/// Configuration for [`crate::compiler::PassPipeline`] and
/// [`crate::compiler::Compiler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Run dead-control-flow elimination (default: true).
    pub dead_control_flow: bool,

    /// Run predicated-break conversion (default: true).
    pub predicated_break: bool,

    /// Upper bound on pipeline rounds before giving up on a fixpoint (default: 8).
    pub max_iterations: usize,

    /// Check CFG invariants after every pass that changed something (default:
    /// only in debug builds).
    pub validate: bool,

    /// Scheduler settings.
    pub scheduler: SchedulerConfig,

    /// Scheduling run after the passes (default: pre-allocation).
    pub schedule: ScheduleStage,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dead_control_flow: true,
            predicated_break: true,
            max_iterations: 8,
            validate: cfg!(debug_assertions),
            scheduler: SchedulerConfig::default(),
            schedule: ScheduleStage::default(),
        }
    }
}
