//! Core reusable components for dispatching external work.
//!
//! Nothing in here knows about LASTZ: the queue, the abort signal and the
//! process runner are shared by every stage of the dispatch pipeline.

pub mod abort;
pub mod process;
pub mod queue;
