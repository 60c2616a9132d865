//! Pipeline stages
//!
//! Both stages implement [`crate::core::queue::Stage`] and run inside a
//! [`crate::core::queue::WorkerPool`]:
//!
//! ```text
//! ExecutionStage (N workers) → CombineStage (1 worker) → merged output
//! ```

pub mod combine;
pub mod execution;

pub use combine::{CombineStage, CombineStats, MergeOrder};
pub use execution::ExecutionStage;
