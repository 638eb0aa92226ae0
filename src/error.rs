use thiserror::Error;

use crate::cfg::BlockId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invalid_cfg {
    ($block:expr, $fmt:expr) => {
        crate::Error::InvalidCfg {
            block: $block,
            message: $fmt.to_string(),
        }
    };

    ($block:expr, $fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidCfg {
            block: $block,
            message: format!($fmt, $($arg)*),
        }
    };
}

pub(crate) use invalid_cfg;
pub(crate) use malformed_error;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every variant describes a contract violation: the instruction stream, the CFG or
/// the scheduling DAG is in a state an upstream producer or pass must never create.
/// Outcomes that are merely "not applicable" (a pattern that did not match, a merge
/// that is not legal) are never reported through this type.
///
/// # Error Categories
///
/// ## Construction Errors
/// - [`Error::Malformed`] - The structured control flow of the instruction stream is not well nested
///
/// ## Graph Consistency Errors
/// - [`Error::InvalidCfg`] - The validator found a broken CFG invariant
/// - [`Error::UnknownBlock`] - A block handle no longer refers to a live block
///
/// ## Scheduling Errors
/// - [`Error::DependencyCycle`] - A block's dependency graph could not be fully scheduled
///
/// ## Pipeline Errors
/// - [`Error::Pipeline`] - A pass failed, wrapped with the name of the pass
///
/// # Examples
///
/// ```rust
/// use simdcfg::{cfg::ControlFlowGraph, ir::{Instruction, Opcode}, Error};
///
/// let stream = vec![Instruction::new(Opcode::Endif)];
/// match ControlFlowGraph::try_build(stream) {
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("malformed control flow: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("other error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The instruction stream's structured control flow is malformed.
    ///
    /// Raised by the CFG builder for unmatched ELSE/ENDIF, BREAK/CONTINUE/WHILE
    /// outside of a loop, or IF/DO constructs still open at the end of the stream.
    /// The error includes the source location where the malformation was detected.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A CFG invariant does not hold.
    ///
    /// Produced by [`crate::cfg::ControlFlowGraph::check`] when parent and child
    /// edge lists disagree, an edge target appears twice, block numbering or
    /// instruction indices have gaps, or a control-flow instruction sits in a
    /// position that cannot delimit a block.
    #[error("Invalid CFG at {block}: {message}")]
    InvalidCfg {
        /// The block the violation was found on
        block: BlockId,
        /// Description of the violated invariant
        message: String,
    },

    /// A block handle does not refer to a live block.
    #[error("{0:?} does not refer to a live block")]
    UnknownBlock(BlockId),

    /// The scheduler ran out of available instructions before the block was complete.
    ///
    /// Only possible when the dependency graph of the block contains a cycle,
    /// which the dependency builder never produces for a well-formed block.
    #[error("Dependency cycle in B{block}: scheduled {scheduled} of {total} instructions")]
    DependencyCycle {
        /// Sequence number of the block being scheduled
        block: usize,
        /// Number of instructions scheduled before the scheduler stalled
        scheduled: usize,
        /// Number of instructions in the block
        total: usize,
    },

    /// A pass in the optimization pipeline failed.
    #[error("Pass '{pass}' failed: {source}")]
    Pipeline {
        /// Name of the failing pass
        pass: &'static str,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },
}
