//! Error type shared by the dispatch pipeline and its collaborators.

use std::fmt;
use std::io;

/// Fatal conditions that end a run.
///
/// Every variant is terminal: the pipeline never retries and never reports
/// partial success. Backpressure on a full queue is not an error and has no
/// variant here.
#[derive(Debug)]
pub enum PipelineError {
    /// An external command wrote to its diagnostic stream.
    Execution { command: String, stderr: String },
    /// The external command could not be started at all.
    Spawn { command: String, source: io::Error },
    /// The command was interrupted because another job aborted the run.
    Cancelled { command: String },
    /// Externally supplied metadata disagrees with the produced work.
    Precheck(String),
    /// File or stream failure, with a short description of what was attempted.
    Io { context: String, source: io::Error },
    /// A downstream stage stopped accepting work.
    StageClosed { stage: String },
    /// A worker thread panicked instead of returning.
    WorkerPanicked { stage: String },
    InvalidConfig(String),
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Errors that are a consequence of an abort rather than its cause.
    pub fn is_abort_fallout(&self) -> bool {
        matches!(
            self,
            PipelineError::Cancelled { .. } | PipelineError::StageClosed { .. }
        )
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The diagnostic text is the whole payload; the tool already
            // formats it for humans.
            PipelineError::Execution { stderr, .. } => write!(f, "{}", stderr.trim_end()),
            PipelineError::Spawn { command, source } => {
                write!(f, "failed to start `{}`: {}", command, source)
            }
            PipelineError::Cancelled { command } => {
                write!(f, "command interrupted by abort: {}", command)
            }
            PipelineError::Precheck(msg) => write!(f, "{}", msg),
            PipelineError::Io { context, source } => write!(f, "{}: {}", context, source),
            PipelineError::StageClosed { stage } => {
                write!(f, "{} stage is no longer accepting work", stage)
            }
            PipelineError::WorkerPanicked { stage } => {
                write!(f, "a {} worker thread panicked", stage)
            }
            PipelineError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Spawn { source, .. } | PipelineError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
