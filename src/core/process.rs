//! External command execution with stderr capture and abort-driven kill.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use super::abort::AbortSignal;
use crate::defaults;
use crate::error::PipelineError;

#[derive(Debug)]
pub struct CommandOutcome {
    pub status: ExitStatus,
    /// Everything the command wrote to its diagnostic stream.
    pub stderr: String,
}

impl CommandOutcome {
    /// Success is decided by the diagnostic stream alone; the exit status is
    /// informational.
    pub fn succeeded(&self) -> bool {
        self.stderr.is_empty()
    }
}

/// Run `command` through the shell and wait for it.
///
/// While waiting, the run's abort signal is checked every `poll`; once it is
/// raised the command's whole process group is killed and
/// [`PipelineError::Cancelled`] is returned.
pub fn run_shell(
    command: &str,
    abort: &AbortSignal,
    poll: Duration,
) -> Result<CommandOutcome, PipelineError> {
    let mut cmd = Command::new(defaults::SHELL);
    cmd.arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // Own group, so a kill also reaches whatever the shell started.
        cmd.process_group(0);
    }

    let mut child = cmd.spawn().map_err(|source| PipelineError::Spawn {
        command: command.to_string(),
        source,
    })?;

    let Some(mut stderr) = child.stderr.take() else {
        terminate(&mut child);
        return Err(PipelineError::Spawn {
            command: command.to_string(),
            source: std::io::Error::other("stderr was not captured"),
        });
    };

    // Drain stderr concurrently so a chatty command cannot fill the pipe and
    // stall before exit.
    let reader = thread::Builder::new()
        .name("stderr-reader".to_string())
        .spawn(move || {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).map(|_| buf)
        });
    let reader = match reader {
        Ok(handle) => handle,
        Err(e) => {
            terminate(&mut child);
            return Err(PipelineError::io("spawning stderr reader", e));
        }
    };

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                terminate(&mut child);
                return Err(PipelineError::io(format!("waiting for `{}`", command), e));
            }
        }
        if abort.is_triggered() {
            log::debug!("Killing in-flight command: {}", command);
            terminate(&mut child);
            let _ = reader.join();
            return Err(PipelineError::Cancelled {
                command: command.to_string(),
            });
        }
        thread::sleep(poll);
    };

    let stderr = match reader.join() {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            return Err(PipelineError::io(
                format!("reading stderr of `{}`", command),
                e,
            ));
        }
        Err(_) => {
            return Err(PipelineError::WorkerPanicked {
                stage: "stderr-reader".to_string(),
            });
        }
    };

    Ok(CommandOutcome {
        status,
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let pgid = child.id() as libc::pid_t;
    // SAFETY: kill(2) with a negative pid only signals the group we created
    // for this child; no memory is touched.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
