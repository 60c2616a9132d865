use std::path::{Path, PathBuf};

/// One unit of partitioned input: a shell command, the file it writes, and
/// the temporary files it owns until the combine stage consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    command: String,
    output: PathBuf,
    cleanup: Vec<PathBuf>,
}

impl WorkItem {
    pub fn new(command: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
            cleanup: Vec::new(),
        }
    }

    /// Paths deleted, in order, once the output has been merged.
    pub fn with_cleanup<I>(mut self, paths: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathBuf>,
    {
        self.cleanup.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn cleanup(&self) -> &[PathBuf] {
        &self.cleanup
    }
}

/// A work item tagged with its submission index.
#[derive(Debug)]
pub struct Ticket {
    pub index: u64,
    pub item: WorkItem,
}
