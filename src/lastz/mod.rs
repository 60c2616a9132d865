//! LASTZ-specific collaborators of the dispatch pipeline: option translation,
//! reference partitioning and version detection.

pub mod opt; // LastzOpt and argument translation
pub mod partition; // Reference -> work items
pub mod run;
pub mod version;

pub use opt::{AlignmentFilter, LastzOpt, OptionSet, OutputFormat, RefSource, Seed};
pub use partition::{CommandTemplate, Partitioner};
pub use run::{AlignJob, main_align};
