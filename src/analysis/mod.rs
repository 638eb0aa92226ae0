//! Analyses derived from a [`crate::cfg::ControlFlowGraph`].
//!
//! # Architecture
//!
//! - [`DominanceTree`] - immediate dominators by the iterative Cooper/Harvey/Kennedy
//!   algorithm, cached on the graph and recomputed after block-level edits
//! - [`RegisterLiveness`] - per-block live virtual registers and entry pressure,
//!   consumed by the pre-allocation scheduler
//!
//! Both record the graph [`generation`](crate::cfg::ControlFlowGraph::generation)
//! they were computed for. Neither is updated incrementally: any edit that
//! invalidates [`DependencyClass::BLOCKS`](crate::cfg::DependencyClass::BLOCKS)
//! makes them stale.
//!
//! # Usage
//!
//! ```rust
//! use simdcfg::{cfg::ControlFlowGraph, ir::{Instruction, Opcode}};
//!
//! let cfg = ControlFlowGraph::build(vec![
//!     Instruction::new(Opcode::Do),
//!     Instruction::new(Opcode::While).predicated(false),
//! ]);
//! let dominators = cfg.dominance();
//! assert!(dominators.dominates(0, 2));
//! ```

mod dominance;
mod liveness;

pub use dominance::{DominanceTree, Dominators};
pub use liveness::RegisterLiveness;
