//! Pass pipeline and shader compilation driver.
//!
//! [`PassPipeline`] runs its passes round after round until a round makes no
//! change or the iteration cap is reached. [`Compiler`] wraps a pipeline and
//! the scheduler: it optimizes a [`ShaderUnit`]'s CFG, then schedules it as
//! configured by [`ScheduleStage`]. Independent units compile in parallel
//! through [`Compiler::compile_batch`].

use rayon::prelude::*;

use crate::{
    cfg::ControlFlowGraph,
    compiler::{EventKind, EventLog, PipelineConfig, ScheduleStage},
    ir::{Instruction, VgrfAlloc},
    passes::{CfgPass, DeadControlFlowPass, PredicatedBreakPass},
    scheduler::{InstructionScheduler, ScheduleMode, ScheduleStats},
    Error, Result,
};

/// Ordered list of passes run to a fixpoint.
pub struct PassPipeline {
    passes: Vec<Box<dyn CfgPass>>,
    /// Maximum rounds before stopping.
    max_iterations: usize,
    /// Check CFG invariants after every pass that made progress.
    validate: bool,
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

impl std::fmt::Debug for PassPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassPipeline")
            .field("passes", &self.pass_names().collect::<Vec<_>>())
            .field("max_iterations", &self.max_iterations)
            .field("validate", &self.validate)
            .finish()
    }
}

impl PassPipeline {
    /// Creates an empty pipeline.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Rounds to run before giving up on a fixpoint.
    /// * `validate` - Check the CFG after every pass that changed it.
    #[must_use]
    pub fn new(max_iterations: usize, validate: bool) -> Self {
        Self {
            passes: Vec::new(),
            max_iterations,
            validate,
        }
    }

    /// Creates the pipeline with the passes enabled in `config`.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut pipeline = Self::new(config.max_iterations, config.validate);
        if config.dead_control_flow {
            pipeline.add_pass(Box::new(DeadControlFlowPass));
        }
        if config.predicated_break {
            pipeline.add_pass(Box::new(PredicatedBreakPass));
        }
        pipeline
    }

    /// Appends a pass to the end of each round.
    pub fn add_pass(&mut self, pass: Box<dyn CfgPass>) {
        self.passes.push(pass);
    }

    /// Builder form of [`add_pass`](Self::add_pass).
    #[must_use]
    pub fn with_pass(mut self, pass: impl CfgPass + 'static) -> Self {
        self.add_pass(Box::new(pass));
        self
    }

    /// Names of the passes in execution order.
    pub fn pass_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.passes.iter().map(|p| p.name())
    }

    /// Number of passes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if the pipeline has no passes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Runs all passes until a round changes nothing.
    ///
    /// Returns the number of rounds executed. Hitting the iteration cap is not
    /// an error; it is logged and recorded as an [`EventKind::Warning`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pipeline`] naming the pass that failed, or whose
    /// output failed validation.
    pub fn run(&self, cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<usize> {
        for iteration in 0..self.max_iterations {
            let mut changed = false;

            for pass in &self.passes {
                let name = pass.name();
                events.record(EventKind::PassStarted).pass(name);

                let progress = pass.run(cfg, events).map_err(|source| Error::Pipeline {
                    pass: name,
                    source: Box::new(source),
                })?;
                if progress {
                    log::debug!("round {}: {name} changed the CFG", iteration + 1);
                    if self.validate {
                        cfg.check().map_err(|source| Error::Pipeline {
                            pass: name,
                            source: Box::new(source),
                        })?;
                    }
                    changed = true;
                }

                events
                    .record(EventKind::PassCompleted)
                    .pass(name)
                    .message(if progress { "changed" } else { "unchanged" });
            }

            if !changed {
                return Ok(iteration + 1);
            }
        }

        if !self.passes.is_empty() && self.max_iterations > 0 {
            log::warn!(
                "pass pipeline stopped after {} rounds without reaching a fixpoint",
                self.max_iterations
            );
            events.warn(format!(
                "no fixpoint after {} rounds",
                self.max_iterations
            ));
        }
        Ok(self.max_iterations)
    }
}

/// One shader to compile: its CFG and the sizes of its virtual registers.
#[derive(Debug, Clone)]
pub struct ShaderUnit {
    /// Name used in logs and events.
    pub name: String,
    /// Control-flow graph of the shader.
    pub cfg: ControlFlowGraph,
    /// Virtual register sizes.
    pub alloc: VgrfAlloc,
}

impl ShaderUnit {
    /// Builds the CFG of `instructions`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if the control-flow nesting is broken.
    pub fn new(
        name: impl Into<String>,
        instructions: impl IntoIterator<Item = Instruction>,
        alloc: VgrfAlloc,
    ) -> Result<Self> {
        Ok(Self::from_cfg(
            name,
            ControlFlowGraph::try_build(instructions)?,
            alloc,
        ))
    }

    /// Wraps an existing CFG.
    #[must_use]
    pub fn from_cfg(name: impl Into<String>, cfg: ControlFlowGraph, alloc: VgrfAlloc) -> Self {
        Self {
            name: name.into(),
            cfg,
            alloc,
        }
    }
}

/// Result of compiling one [`ShaderUnit`].
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Name of the unit.
    pub name: String,
    /// Optimized and scheduled CFG.
    pub cfg: ControlFlowGraph,
    /// Pipeline rounds executed.
    pub iterations: usize,
    /// Statistics of the scheduling run, `None` for [`ScheduleStage::Skip`].
    pub schedule: Option<ScheduleStats>,
}

impl CompileOutput {
    /// Flattened instruction stream of the result.
    #[must_use]
    pub fn into_instructions(self) -> Vec<Instruction> {
        self.cfg.into_instructions()
    }
}

/// Optimizes and schedules shader units.
///
/// All units compiled by one `Compiler` share its [`EventLog`].
///
/// # Examples
///
/// ```rust
/// use simdcfg::{
///     compiler::{Compiler, PipelineConfig, ShaderUnit},
///     ir::{Instruction, Opcode, Reg, VgrfAlloc},
/// };
///
/// let mut alloc = VgrfAlloc::new();
/// let v = alloc.allocate(1);
/// let unit = ShaderUnit::new(
///     "fs",
///     vec![
///         Instruction::new(Opcode::If).predicated(false),
///         Instruction::new(Opcode::Endif),
///         Instruction::new(Opcode::Mov).dst(Reg::vgrf(v)).src(Reg::imm(1)),
///     ],
///     alloc,
/// )?;
///
/// let compiler = Compiler::new(PipelineConfig::default());
/// let output = compiler.compile(&unit)?;
/// assert_eq!(output.cfg.num_instructions(), 1);
/// # Ok::<(), simdcfg::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Compiler {
    config: PipelineConfig,
    pipeline: PassPipeline,
    events: EventLog,
}

impl Compiler {
    /// Creates a compiler with the passes enabled in `config`.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            pipeline: PassPipeline::from_config(&config),
            config,
            events: EventLog::new(),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The pass pipeline, for adding custom passes.
    pub fn pipeline_mut(&mut self) -> &mut PassPipeline {
        &mut self.pipeline
    }

    /// Events recorded by every compilation so far.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Moves the recorded events out.
    #[must_use]
    pub fn take_events(&mut self) -> EventLog {
        self.events.take()
    }

    /// Optimizes and schedules a copy of `unit`'s CFG.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pipeline`] if a pass fails and
    /// [`Error::DependencyCycle`] if scheduling fails.
    pub fn compile(&self, unit: &ShaderUnit) -> Result<CompileOutput> {
        let mut cfg = unit.cfg.clone();
        let iterations = self.pipeline.run(&mut cfg, &self.events)?;

        let scheduler = InstructionScheduler::new(self.config.scheduler.clone(), &unit.alloc)
            .with_events(&self.events);
        let schedule = match self.config.schedule {
            ScheduleStage::Skip => None,
            ScheduleStage::PreRegAlloc => Some(scheduler.schedule_pre_ra(&mut cfg)?),
            ScheduleStage::PostRegAlloc => Some(scheduler.run(&mut cfg, ScheduleMode::Post)?),
        };

        if self.config.validate {
            cfg.check()?;
        }
        log::debug!(
            "compiled '{}': {} blocks, {} instructions, {iterations} rounds",
            unit.name,
            cfg.num_blocks(),
            cfg.num_instructions()
        );
        self.events.info(format!("compiled {}", unit.name));

        Ok(CompileOutput {
            name: unit.name.clone(),
            cfg,
            iterations,
            schedule,
        })
    }

    /// Compiles independent units in parallel.
    ///
    /// Results are returned in the order of `units`; one failing unit does not
    /// affect the others.
    pub fn compile_batch(&self, units: &[ShaderUnit]) -> Vec<Result<CompileOutput>> {
        units.par_iter().map(|unit| self.compile(unit)).collect()
    }
}
