// src/lastz/run.rs
//
// Align subcommand driver: version banner, metadata precheck, partitioning
// and the dispatch pipeline.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::PathBuf;

use crate::lastz::opt::LastzOpt;
use crate::lastz::partition::{CommandTemplate, Partitioner};
use crate::lastz::version::{self, UNKNOWN_VERSION};
use crate::pipeline::{Orchestrator, PipelineConfig, RunSummary};

pub const MISSING_METADATA: &str = "The reference dataset is missing metadata: the number of reference sequences must be known and at least 1.";

/// Everything one `align` invocation needs.
#[derive(Debug, Clone)]
pub struct AlignJob {
    pub reference: PathBuf,
    pub query: PathBuf,
    pub output: PathBuf,
    pub lastz: String,
    pub tmp_dir: PathBuf,
    /// Sequence count recorded for a FASTA reference.
    pub ref_sequences: Option<i64>,
    pub opt: LastzOpt,
    pub pipeline: PipelineConfig,
}

impl AlignJob {
    /// FASTA references must come with a positive sequence count.
    fn expected_items(&self) -> Result<Option<usize>> {
        if !self.opt.ref_source.is_fasta() {
            return Ok(None);
        }
        match self.ref_sequences {
            Some(n) if n >= 1 => Ok(Some(n as usize)),
            _ => anyhow::bail!(MISSING_METADATA),
        }
    }
}

pub fn main_align(job: &AlignJob) -> Result<RunSummary> {
    match version::detect_version(&job.lastz) {
        Some(line) => println!("{}", line),
        None => println!("{}", UNKNOWN_VERSION),
    }

    let mut config = job.pipeline.clone();
    config.expected_items = job.expected_items()?;

    let template = CommandTemplate::new(&job.lastz, &job.opt, &job.query.to_string_lossy());
    let partitioner = Partitioner::open(job.opt.ref_source, &job.reference, template, &job.tmp_dir)?;

    let output = File::create(&job.output)
        .with_context(|| format!("Error creating output file {}", job.output.display()))?;

    log::info!(
        "Aligning {} against {} with {} worker(s)",
        job.query.display(),
        job.reference.display(),
        config.execution.workers
    );

    let mut orchestrator = Orchestrator::new(config);
    let summary = orchestrator.run(Box::new(output), partitioner)?;

    log::info!(
        "Merged {} of {} job(s), {} bytes written to {}",
        summary.combined,
        summary.submitted,
        summary.bytes_written,
        job.output.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lastz::opt::RefSource;

    fn job(source: RefSource, ref_sequences: Option<i64>) -> AlignJob {
        AlignJob {
            reference: PathBuf::from("ref.fa"),
            query: PathBuf::from("reads.fa"),
            output: PathBuf::from("out.sam"),
            lastz: "lastz".to_string(),
            tmp_dir: std::env::temp_dir(),
            ref_sequences,
            opt: LastzOpt {
                ref_source: source,
                ..LastzOpt::default()
            },
            pipeline: PipelineConfig::default(),
        }
    }

    #[test]
    fn test_fasta_reference_requires_sequence_count() {
        for count in [None, Some(0), Some(-3)] {
            let err = job(RefSource::History, count).expected_items().unwrap_err();
            assert_eq!(err.to_string(), MISSING_METADATA);
        }
        assert_eq!(
            job(RefSource::SelfRef, Some(7)).expected_items().unwrap(),
            Some(7)
        );
    }

    #[test]
    fn test_cached_reference_skips_count_check() {
        assert_eq!(job(RefSource::Cached, None).expected_items().unwrap(), None);
    }
}
