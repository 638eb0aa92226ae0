// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # simdcfg
//!
//! Control-flow and scheduling middle-end for SIMD shader compiler backends.
//!
//! `simdcfg` takes a flat, linearly ordered list of machine-level shader
//! instructions, including structured control flow (`IF`/`ELSE`/`ENDIF`,
//! `DO`/`WHILE`, `BREAK`, `CONTINUE`), and turns it into a control-flow graph
//! of basic blocks. The graph can be rewritten locally, analysed for dominance
//! and liveness, optimized by CFG passes, and finally the instructions of each
//! block are list-scheduled to hide latency or to keep register pressure low.
//!
//! ## Features
//!
//! - **Arena-based CFG** - stable block handles, symmetric logical/physical edges
//! - **Checked mutation** - every structural change keeps sequence numbers and
//!   instruction indices contiguous; `check()` verifies all invariants
//! - **Cached dominance** - Cooper/Harvey/Kennedy, invalidated by generation
//! - **CFG passes** - dead IF/ELSE/ENDIF removal, predicated BREAK/CONTINUE
//! - **List scheduler** - dependency DAG, per-generation latency tables,
//!   latency and register-pressure heuristics
//! - **Parallel batch compilation** - independent shaders on the rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use simdcfg::prelude::*;
//!
//! let mut cfg = ControlFlowGraph::build(vec![
//!     Instruction::new(Opcode::Do),
//!     Instruction::new(Opcode::Add).dst(Reg::vgrf(0)).src(Reg::vgrf(0)).src(Reg::imm(1)),
//!     Instruction::new(Opcode::If).predicated(true),
//!     Instruction::new(Opcode::Break),
//!     Instruction::new(Opcode::Endif),
//!     Instruction::new(Opcode::While),
//! ]);
//!
//! let events = EventLog::new();
//! assert!(PredicatedBreakPass.run(&mut cfg, &events)?);
//! cfg.check()?;
//!
//! // The conditional exit became the loop condition.
//! let ops: Vec<_> = cfg.instructions().map(|i| i.opcode).collect();
//! assert_eq!(ops, vec![Opcode::Do, Opcode::Add, Opcode::While]);
//! assert!(events.has(EventKind::WhilePredicated));
//! # Ok::<(), simdcfg::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - opcodes, registers, flag masks and instructions
//! - [`cfg`] - blocks, edges, builder, mutation, validation and dumps
//! - [`analysis`] - dominance tree and register liveness
//! - [`passes`] - the [`passes::CfgPass`] trait and the built-in rewrites
//! - [`scheduler`] - the per-block instruction scheduler
//! - [`compiler`] - configuration, events, pass pipeline and batch driver
//! - [`Error`] and [`Result`] - error handling
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: `debug` for pass progress and
//! per-block schedule summaries, `trace` for individual rewrites and
//! scheduling choices, `warn` when a pipeline stops without a fixpoint. No
//! logger is installed by the library.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use simdcfg::prelude::*;
///
/// let cfg = ControlFlowGraph::build(vec![Instruction::new(Opcode::Nop)]);
/// assert_eq!(cfg.num_instructions(), 1);
/// ```
pub mod prelude;

/// Small shared data structures: bit sets and DOT label escaping.
pub mod utils;

/// The instruction IR consumed by the graph and the scheduler.
///
/// Instructions are built fluently:
///
/// ```rust
/// use simdcfg::ir::{CondMod, Instruction, Opcode, Reg};
///
/// let cmp = Instruction::new(Opcode::Cmp)
///     .dst(Reg::null())
///     .src(Reg::vgrf(0))
///     .src(Reg::imm(0))
///     .cond(CondMod::Nz);
/// assert!(!cmp.flags_written().is_empty());
/// ```
pub mod ir;

/// Control-flow graph of basic blocks.
///
/// # Key Types
///
/// - [`cfg::ControlFlowGraph`] - the arena-owned graph
/// - [`cfg::BasicBlock`] - a maximal straight-line instruction run
/// - [`cfg::BlockId`] - stable handle of a block
/// - [`cfg::EdgeKind`] - logical (possible flow) or physical (adjacency) edge
pub mod cfg;

/// Analyses over a [`cfg::ControlFlowGraph`].
pub mod analysis;

/// CFG-rewriting passes.
pub mod passes;

/// Per-block instruction scheduling.
pub mod scheduler;

/// Configuration, event tracking and the compilation pipeline.
pub mod compiler;

/// `simdcfg` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is
/// always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `simdcfg` Error type
///
/// # Examples
///
/// ```rust
/// use simdcfg::{cfg::ControlFlowGraph, ir::{Instruction, Opcode}, Error};
///
/// match ControlFlowGraph::try_build(vec![Instruction::new(Opcode::Else)]) {
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {message}"),
///     Err(e) => println!("Error: {e}"),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;
