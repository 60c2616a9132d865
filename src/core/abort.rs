//! Run-wide abort coordination.
//!
//! The first failure recorded here wins: it is kept for the orchestrator to
//! surface, the cancelled flag is raised for every worker and in-flight
//! process, and a stop token is broadcast to each registered pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::PipelineError;

/// A queue that can be told to stop all of its workers.
pub trait StopBroadcast: Send + Sync {
    /// Enqueue one stop token per worker without blocking.
    ///
    /// Returns how many tokens were accepted. A full queue accepts fewer;
    /// those workers still stop when they next dequeue and see the cancelled
    /// flag.
    fn broadcast_stop(&self) -> usize;

    fn stage_name(&self) -> &str;
}

#[derive(Default)]
pub struct AbortSignal {
    cancelled: AtomicBool,
    first_error: Mutex<Option<PipelineError>>,
    targets: Mutex<Vec<Box<dyn StopBroadcast>>>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, target: Box<dyn StopBroadcast>) {
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target);
    }

    /// Record `err` and stop every registered stage.
    ///
    /// Returns `true` when this call was the one that aborted the run.
    pub fn trigger(&self, err: PipelineError) -> bool {
        self.cancelled.store(true, Ordering::SeqCst);

        let first = {
            let mut slot = self
                .first_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(err);
                true
            } else {
                log::debug!("Suppressing secondary error after abort: {}", err);
                false
            }
        };

        if first {
            log::debug!("Run aborted, broadcasting stop tokens");
            let targets = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
            for target in targets.iter() {
                let sent = target.broadcast_stop();
                log::debug!("{}: {} stop token(s) enqueued", target.stage_name(), sent);
            }
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Take the error that aborted the run, if any.
    pub fn take_error(&self) -> Option<PipelineError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
