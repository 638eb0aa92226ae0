//! CFG-rewriting optimizations.
//!
//! Every pass implements [`CfgPass`]: it mutates a [`ControlFlowGraph`] in
//! place, records what it did into an [`EventLog`] and reports whether it
//! changed anything. Passes invalidate the analyses they affect before
//! returning, so the graph is always consistent between passes.
//!
//! # Available Passes
//!
//! - [`DeadControlFlowPass`] - removes empty IF/ELSE/ENDIF constructs
//! - [`PredicatedBreakPass`] - turns `IF { BREAK | CONTINUE } ENDIF` into a
//!   predicated jump and folds a trailing BREAK into the loop's WHILE
//!
//! Passes are normally driven by [`crate::compiler::PassPipeline`].

mod dead_control_flow;
mod predicated_break;

pub use dead_control_flow::DeadControlFlowPass;
pub use predicated_break::{PredicatedBreakPass, MAX_LOOP_NESTING};

use crate::{
    cfg::{BlockId, ControlFlowGraph},
    compiler::{EventKind, EventLog},
    ir::Instruction,
    Result,
};

/// A transformation over one function's CFG.
///
/// All passes must be thread-safe (Send + Sync) so that independent shaders
/// can be optimized in parallel with the same pass instances.
pub trait CfgPass: Send + Sync {
    /// Unique name for logging and events.
    fn name(&self) -> &'static str;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Runs the pass once over `cfg`.
    ///
    /// Returns `true` if any change was made. Events should be recorded
    /// directly to `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph violates an invariant the pass relies on.
    fn run(&self, cfg: &mut ControlFlowGraph, events: &EventLog) -> Result<bool>;
}

/// Removes instruction `index` of `id` on behalf of `pass`, recording
/// [`EventKind::BlockRemoved`] if the block emptied and was spliced out.
pub(crate) fn remove_instruction(
    cfg: &mut ControlFlowGraph,
    events: &EventLog,
    pass: &'static str,
    id: BlockId,
    index: usize,
) -> Option<Instruction> {
    let num = cfg.get(id)?.num();
    let inst = cfg.remove_instruction(id, index)?;
    if cfg.get(id).is_none() {
        events.record(EventKind::BlockRemoved).block(num).pass(pass);
    }
    Some(inst)
}
