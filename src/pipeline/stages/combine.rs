//! Combine stage: serial append of partial outputs into the final stream.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::core::abort::AbortSignal;
use crate::core::queue::Stage;
use crate::error::PipelineError;
use crate::pipeline::work_item::{Ticket, WorkItem};

/// Order in which partial outputs land in the merged file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergeOrder {
    /// As jobs finish.
    #[default]
    Completion,
    /// As jobs were submitted; early finishers wait in a reorder buffer.
    Submission,
}

impl std::str::FromStr for MergeOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(MergeOrder::Completion),
            "submission" => Ok(MergeOrder::Submission),
            _ => Err(format!(
                "Invalid merge order '{}': expected completion or submission",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CombineStats {
    pub items: u64,
    pub bytes: u64,
}

struct MergeState {
    output: Option<Box<dyn Write + Send>>,
    buf: Vec<u8>,
    pending: BTreeMap<u64, WorkItem>,
    next_index: u64,
    stats: CombineStats,
}

impl MergeState {
    fn consume(&mut self, item: &WorkItem) -> Result<(), PipelineError> {
        let output = self.output.as_mut().ok_or_else(|| PipelineError::StageClosed {
            stage: "combine".to_string(),
        })?;

        let path = item.output();
        let mut input = File::open(path)
            .map_err(|e| PipelineError::io(format!("opening partial output {}", path.display()), e))?;

        let mut copied = 0u64;
        loop {
            let n = match input.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(PipelineError::io(
                        format!("reading partial output {}", path.display()),
                        e,
                    ));
                }
            };
            output
                .write_all(&self.buf[..n])
                .map_err(|e| PipelineError::io("appending to merged output", e))?;
            copied += n as u64;
        }
        drop(input);

        for tmp in item.cleanup() {
            match fs::remove_file(tmp) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::warn!("Temporary file already gone: {}", tmp.display());
                }
                Err(e) => {
                    return Err(PipelineError::io(
                        format!("removing temporary file {}", tmp.display()),
                        e,
                    ));
                }
            }
        }

        self.stats.items += 1;
        self.stats.bytes += copied;
        Ok(())
    }
}

/// Appends each item's output file to the merged stream, then deletes the
/// item's temporary files.
///
/// The output is guarded by a lock held for a whole item, so even with more
/// than one worker no two partial outputs interleave.
pub struct CombineStage {
    state: Mutex<MergeState>,
    order: MergeOrder,
    abort: Option<Arc<AbortSignal>>,
}

impl CombineStage {
    pub fn new(output: Box<dyn Write + Send>, order: MergeOrder, chunk_size: usize) -> Self {
        Self {
            state: Mutex::new(MergeState {
                output: Some(output),
                buf: vec![0u8; chunk_size.max(1)],
                pending: BTreeMap::new(),
                next_index: 0,
                stats: CombineStats::default(),
            }),
            order,
            abort: None,
        }
    }

    /// Stop appending once `abort` is raised. Items still held in the reorder
    /// buffer are dropped unmerged and their temporaries left for the sweep.
    pub fn with_abort(mut self, abort: Arc<AbortSignal>) -> Self {
        self.abort = Some(abort);
        self
    }

    fn aborted(&self) -> bool {
        self.abort.as_ref().is_some_and(|a| a.is_triggered())
    }

    pub fn stats(&self) -> CombineStats {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .output
            .is_none()
    }

    /// Items held back waiting for an earlier submission index.
    pub fn buffered(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }
}

impl Stage for CombineStage {
    type Item = Ticket;

    fn process(&self, ticket: Ticket) -> Result<(), PipelineError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        match self.order {
            MergeOrder::Completion => state.consume(&ticket.item),
            MergeOrder::Submission => {
                state.pending.insert(ticket.index, ticket.item);
                while !self.aborted() {
                    let Some(item) = state.pending.remove(&state.next_index) else {
                        break;
                    };
                    state.consume(&item)?;
                    state.next_index += 1;
                }
                Ok(())
            }
        }
    }

    fn finish(&self) -> Result<(), PipelineError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = &mut *guard;

        if !state.pending.is_empty() && self.aborted() {
            log::debug!(
                "Run aborted; dropping {} buffered item(s) without merging",
                state.pending.len()
            );
            state.pending.clear();
        }

        if !state.pending.is_empty() && state.output.is_some() {
            // A gap in submission indices: never hold output back forever.
            log::warn!(
                "{} item(s) still waiting for index {} at shutdown; appending in index order",
                state.pending.len(),
                state.next_index
            );
            let pending = std::mem::take(&mut state.pending);
            for (_, item) in pending {
                state.consume(&item)?;
            }
        }

        if let Some(mut output) = state.output.take() {
            output
                .flush()
                .map_err(|e| PipelineError::io("flushing merged output", e))?;
            log::debug!(
                "Merged output closed: {} item(s), {} bytes",
                state.stats.items,
                state.stats.bytes
            );
        }
        Ok(())
    }
}
