//! Compilation driver: configuration, event tracking and the pass pipeline.
//!
//! This module ties the lower layers together:
//!
//! - [`crate::cfg`] - graph construction and mutation
//! - [`crate::passes`] - CFG rewrites
//! - [`crate::scheduler`] - instruction scheduling
//! - [`compiler`](self) - runs passes to a fixpoint, then schedules
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Compiler                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ShaderUnit                 CFG + virtual register sizes     │
//! │                                                              │
//! │  PassPipeline               fixpoint over CfgPass list       │
//! │    ├─ DeadControlFlowPass    (empty IF/ELSE/ENDIF)           │
//! │    └─ PredicatedBreakPass    (IF BREAK ENDIF, WHILE fold)    │
//! │    Each round: run every pass, validate on change            │
//! │                                                              │
//! │  InstructionScheduler       per-block list scheduling        │
//! │    ├─ PreRegAlloc            best mode within budget         │
//! │    └─ PostRegAlloc           latency heuristic               │
//! │                                                              │
//! │  EventLog                   change tracking, shared across   │
//! │                             parallel batch compilation       │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod events;
mod pipeline;

pub use config::{DeviceInfo, PipelineConfig, ScheduleStage, SchedulerConfig};
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use pipeline::{CompileOutput, Compiler, PassPipeline, ShaderUnit};
