//! Pipeline orchestrator
//!
//! Wires the execution pool to the combine pool, feeds work items with
//! blocking backpressure and sequences shutdown:
//!
//! ```text
//! Dispatching → Draining(Execution) → Draining(Combine) → Done
//!      └──────────────┴──────────────────────┴──────────→ Aborted
//! ```
//!
//! Shutdown is an explicit barrier: every execution worker is joined before
//! the combine stage receives its stop token, so nothing can be forwarded to
//! a closed merge stage on the success path.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::core::abort::AbortSignal;
use crate::core::queue::{PoolConfig, PutMode, WorkerPool};
use crate::defaults;
use crate::error::PipelineError;
use crate::pipeline::stages::{CombineStage, ExecutionStage, MergeOrder};
use crate::pipeline::work_item::{Ticket, WorkItem};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// External-command workers; the capacity bounds queued commands.
    pub execution: PoolConfig,
    /// Merge workers; one keeps the append order deterministic.
    pub combine: PoolConfig,
    pub merge_order: MergeOrder,
    /// Read size used when copying partial outputs.
    pub chunk_size: usize,
    /// How often a waiting worker checks for an abort.
    pub poll_interval: Duration,
    /// Work-item count promised by upstream metadata.
    pub expected_items: Option<usize>,
    /// Delete leftover temporaries after a failed run.
    pub sweep_on_abort: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            execution: PoolConfig::bounded(1, defaults::QUEUE_SLOTS),
            combine: PoolConfig::unbounded(defaults::COMBINE_WORKERS),
            merge_order: MergeOrder::default(),
            chunk_size: defaults::COPY_CHUNK_SIZE,
            poll_interval: defaults::PROCESS_POLL_INTERVAL,
            expected_items: None,
            sweep_on_abort: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_threads(threads: usize) -> Self {
        let mut config = Self::default();
        config.execution.workers = threads;
        config
    }

    /// Apply the same post-job pause to both pools.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.execution.throttle = throttle;
        self.combine.throttle = throttle;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Dispatching,
    DrainingExecution,
    DrainingCombine,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items accepted by the execution queue.
    pub submitted: u64,
    /// Items whose output reached the merged stream.
    pub combined: u64,
    pub bytes_written: u64,
}

pub struct Orchestrator {
    config: PipelineConfig,
    state: RunState,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn enter(&mut self, state: RunState) {
        log::debug!("Pipeline state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Dispatch every produced item and merge the results into `output`.
    ///
    /// A producer error, a failed job or a count mismatch aborts the run; the
    /// first such error is returned and no summary is produced.
    pub fn run<I>(
        &mut self,
        output: Box<dyn Write + Send>,
        items: I,
    ) -> Result<RunSummary, PipelineError>
    where
        I: IntoIterator<Item = Result<WorkItem, PipelineError>>,
    {
        if let Some(expected) = self.config.expected_items {
            if expected < 1 {
                self.enter(RunState::Aborted);
                return Err(PipelineError::Precheck(format!(
                    "metadata promises {} work items; at least one is required",
                    expected
                )));
            }
        }
        if self.config.combine.workers > 1 {
            log::warn!(
                "Combine stage has {} workers: partial outputs stay whole, but their order is no longer the dequeue order",
                self.config.combine.workers
            );
        }

        let abort = Arc::new(AbortSignal::new());
        let combine = WorkerPool::new(
            "combine",
            &self.config.combine,
            CombineStage::new(output, self.config.merge_order, self.config.chunk_size)
                .with_abort(Arc::clone(&abort)),
            Arc::clone(&abort),
        )?;
        let execution = match WorkerPool::new(
            "execute",
            &self.config.execution,
            ExecutionStage::new(
                combine.sender(),
                Arc::clone(&abort),
                self.config.poll_interval,
            ),
            Arc::clone(&abort),
        ) {
            Ok(pool) => pool,
            Err(e) => {
                combine.send_stop();
                let _ = combine.join();
                return Err(e);
            }
        };

        self.enter(RunState::Dispatching);
        let mut produced = 0usize;
        let mut submitted = 0u64;
        let mut temporaries: Vec<PathBuf> = Vec::new();

        // Check before pulling: producing an item may already create its
        // temporaries.
        let mut items = items.into_iter();
        while !abort.is_triggered() {
            let item = match items.next() {
                Some(Ok(item)) => item,
                Some(Err(e)) => {
                    abort.trigger(e);
                    break;
                }
                None => break,
            };
            produced += 1;
            temporaries.extend(item.cleanup().iter().cloned());

            // The only backpressure point: stalls while the queue is full.
            let ticket = Ticket {
                index: submitted,
                item,
            };
            if let Err(rejected) = execution.put(ticket, PutMode::Block) {
                log::debug!(
                    "Execution queue closed, dropping job {}",
                    rejected.into_inner().index
                );
                break;
            }
            submitted += 1;
        }

        if !abort.is_triggered() {
            if let Some(expected) = self.config.expected_items {
                if expected != produced {
                    abort.trigger(PipelineError::Precheck(format!(
                        "expected {} work items from metadata, but {} were produced",
                        expected, produced
                    )));
                }
            }
        }

        self.enter(RunState::DrainingExecution);
        execution.send_stop();
        let execution_joined = execution.join();

        self.enter(RunState::DrainingCombine);
        combine.send_stop();
        let combine_joined = combine.join();

        let failure = if let Some(err) = abort.take_error() {
            Some(err)
        } else if let Err(err) = execution_joined {
            Some(err)
        } else {
            combine_joined.as_ref().err().map(|_| PipelineError::WorkerPanicked {
                stage: "combine".to_string(),
            })
        };

        if let Some(err) = failure {
            self.enter(RunState::Aborted);
            if self.config.sweep_on_abort {
                let removed = sweep_orphans(&temporaries);
                log::info!("Removed {} temporary file(s) left by the aborted run", removed);
            } else {
                log::warn!("Run aborted; temporary files of unmerged jobs are left in place");
            }
            return Err(err);
        }

        let stats = match combine_joined {
            Ok(stage) => stage.stats(),
            Err(err) => return Err(err),
        };
        if stats.items != submitted {
            log::warn!(
                "Submitted {} job(s) but merged {}",
                submitted,
                stats.items
            );
        }

        self.enter(RunState::Done);
        Ok(RunSummary {
            submitted,
            combined: stats.items,
            bytes_written: stats.bytes,
        })
    }
}

/// Delete whichever of `paths` still exist; returns how many were removed.
pub fn sweep_orphans(paths: &[PathBuf]) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Could not remove {}: {}", path.display(), e),
        }
    }
    removed
}
