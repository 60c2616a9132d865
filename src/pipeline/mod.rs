//! Fan-out/fan-in dispatch pipeline.
//!
//! The orchestrator feeds [`WorkItem`]s into a pool of execution workers, each
//! running one external command; finished items are forwarded to a combine
//! stage that appends their outputs to a single stream.
//!
//! # Module Organization
//!
//! - `orchestrator` - wiring, backpressure, shutdown sequencing, abort handling
//! - `stages/` - `ExecutionStage` and `CombineStage`
//! - `work_item` - the unit of work handed in by producers

pub mod orchestrator;
pub mod stages;
pub mod work_item;

pub use orchestrator::{Orchestrator, PipelineConfig, RunState, RunSummary, sweep_orphans};
pub use stages::{CombineStage, CombineStats, ExecutionStage, MergeOrder};
pub use work_item::{Ticket, WorkItem};
