//! Execution stage: one external process per work item.

use std::sync::Arc;
use std::time::Duration;

use crate::core::abort::AbortSignal;
use crate::core::process::run_shell;
use crate::core::queue::{Stage, StageSender};
use crate::error::PipelineError;
use crate::pipeline::work_item::Ticket;

pub struct ExecutionStage {
    combine: StageSender<Ticket>,
    abort: Arc<AbortSignal>,
    poll_interval: Duration,
}

impl ExecutionStage {
    /// `combine` is the merge stage's input; successful items go there
    /// unchanged.
    pub fn new(combine: StageSender<Ticket>, abort: Arc<AbortSignal>, poll_interval: Duration) -> Self {
        Self {
            combine,
            abort,
            poll_interval,
        }
    }
}

impl Stage for ExecutionStage {
    type Item = Ticket;

    fn process(&self, ticket: Ticket) -> Result<(), PipelineError> {
        let command = ticket.item.command();
        log::debug!("job {}: {}", ticket.index, command);

        let outcome = run_shell(command, &self.abort, self.poll_interval)?;
        if !outcome.succeeded() {
            return Err(PipelineError::Execution {
                command: command.to_string(),
                stderr: outcome.stderr,
            });
        }
        if !outcome.status.success() {
            log::warn!(
                "job {} exited with {} but wrote no diagnostics; keeping its output",
                ticket.index,
                outcome.status
            );
        }

        self.combine.put(ticket)
    }
}
