//! Control-flow graph of a structured SIMD instruction stream.
//!
//! A [`ControlFlowGraph`] is built in one linear scan from a flat stream of
//! instructions whose control flow is expressed with `IF`/`ELSE`/`ENDIF` and
//! `DO`/`BREAK`/`CONTINUE`/`WHILE`. Every edge carries an [`EdgeKind`]:
//! logical edges model the per-channel program, physical edges model only what
//! the SIMD thread as a whole can do once channels have diverged. Analyses that
//! reason about the values of a single channel follow logical edges, while
//! register allocation and liveness must also follow physical ones.
//!
//! # Architecture
//!
//! - [`BlockId`], [`EdgeKind`], [`BlockLink`] - stable block handles and typed edges
//! - [`BasicBlock`] - instruction storage with parent/child link lists
//! - builder - [`ControlFlowGraph::try_build`] and [`ControlFlowGraph::build`]
//! - mutation - [`ControlFlowGraph::remove_block`], [`ControlFlowGraph::merge`]
//!   and the edge primitives, all keeping both link lists symmetric
//! - validation - [`ControlFlowGraph::check`] and [`ControlFlowGraph::validate`]
//! - rendering - [`ControlFlowGraph::dump`] and [`ControlFlowGraph::to_dot`]
//!
//! # Invariants
//!
//! Between passes the graph always satisfies what [`ControlFlowGraph::check`]
//! verifies: block numbers and instruction indices are contiguous in program
//! order, every edge is stored on both of its ends with the same kind, and
//! block-delimiting control flow only appears at the matching block boundary.
//!
//! # Examples
//!
//! ```rust
//! use simdcfg::{
//!     cfg::{ControlFlowGraph, EdgeKind},
//!     ir::{Instruction, Opcode, Reg},
//! };
//!
//! let cfg = ControlFlowGraph::build(vec![
//!     Instruction::new(Opcode::Do),
//!     Instruction::new(Opcode::Add).dst(Reg::vgrf(0)).src(Reg::vgrf(0)).src(Reg::imm(1)),
//!     Instruction::new(Opcode::While).predicated(false),
//! ]);
//!
//! let do_block = cfg.entry();
//! let body = cfg.next(do_block).unwrap();
//! assert_eq!(cfg.block(body).child_kind(do_block), Some(EdgeKind::Logical));
//! println!("{}", cfg.dump());
//! ```

mod block;
mod builder;
mod dump;
mod edge;
mod graph;
mod mutate;
mod validate;

pub use block::BasicBlock;
pub use edge::{BlockId, BlockLink, EdgeKind};
pub use graph::{ControlFlowGraph, DependencyClass};
