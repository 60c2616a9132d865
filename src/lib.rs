pub mod core; // Worker pools, abort signalling, process supervision
pub mod defaults;
pub mod error;
pub mod io; // Reference readers (FASTA, 2bit)
pub mod lastz;
pub mod pipeline; // Execution -> combine dispatch pipeline

pub use error::PipelineError;
