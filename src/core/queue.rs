//! Bounded work queue drained by a fixed pool of worker threads.
//!
//! Every pool owns one channel of [`Message`]s. Workers loop on the channel,
//! hand each work item to their [`Stage`], and exit on [`Message::Stop`]. The
//! last worker to exit runs the stage's `finish` hook, so shutdown work such
//! as closing an output file happens exactly once.
//!
//! ```text
//!   put(item, Block) ──► [ Work | Work | Stop | Stop ] ──► worker-0 ─┐
//!                                                     └─► worker-1 ─┴─► Stage::process
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};

use super::abort::{AbortSignal, StopBroadcast};
use crate::defaults;
use crate::error::PipelineError;

/// Element type of every pool queue.
pub enum Message<T> {
    Work(T),
    /// Consumed by exactly one worker, which then exits.
    Stop,
}

/// The job-specific half of a worker pool.
pub trait Stage: Send + Sync + 'static {
    type Item: Send + 'static;

    /// Run one work item. An error aborts the whole run.
    fn process(&self, item: Self::Item) -> Result<(), PipelineError>;

    /// Called once, by the last worker to exit.
    fn finish(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    /// `None` makes the queue unbounded.
    pub capacity: Option<usize>,
    /// Pause after each completed job before the worker dequeues again.
    pub throttle: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            capacity: Some(defaults::QUEUE_SLOTS),
            throttle: defaults::JOB_THROTTLE,
        }
    }
}

impl PoolConfig {
    pub fn bounded(workers: usize, capacity: usize) -> Self {
        Self {
            workers,
            capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn unbounded(workers: usize) -> Self {
        Self {
            workers,
            capacity: None,
            ..Self::default()
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    fn validate(&self, name: &str) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "{} pool needs at least one worker",
                name
            )));
        }
        // A zero-capacity channel is a rendezvous, which would make every put
        // block even with idle workers.
        if self.capacity == Some(0) {
            return Err(PipelineError::InvalidConfig(format!(
                "{} queue capacity must be at least 1",
                name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Stall until the queue has room.
    Block,
    /// Hand the item back if the queue is full.
    NoWait,
}

/// A rejected put. The item is always returned to the caller.
pub enum PutError<T> {
    Full(T),
    /// Every worker has exited.
    Closed(T),
}

impl<T> PutError<T> {
    pub fn into_inner(self) -> T {
        match self {
            PutError::Full(item) | PutError::Closed(item) => item,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, PutError::Full(_))
    }
}

impl<T> fmt::Debug for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => f.write_str("Full(..)"),
            PutError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutError::Full(_) => f.write_str("queue is full"),
            PutError::Closed(_) => f.write_str("queue has no running workers"),
        }
    }
}

impl<T> std::error::Error for PutError<T> {}

fn enqueue<T>(tx: &Sender<Message<T>>, item: T, mode: PutMode) -> Result<(), PutError<T>> {
    let work = Message::Work(item);
    let result = match mode {
        PutMode::Block => tx.send(work).map_err(|e| (false, e.into_inner())),
        PutMode::NoWait => tx.try_send(work).map_err(|e| match e {
            TrySendError::Full(msg) => (true, msg),
            TrySendError::Disconnected(msg) => (false, msg),
        }),
    };
    match result {
        Ok(()) => Ok(()),
        Err((full, Message::Work(item))) => {
            if full {
                Err(PutError::Full(item))
            } else {
                Err(PutError::Closed(item))
            }
        }
        Err((_, Message::Stop)) => unreachable!("enqueue only sends work messages"),
    }
}

/// Upstream handle to a pool's input, injected into the previous stage.
pub struct StageSender<T> {
    stage: String,
    tx: Sender<Message<T>>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            tx: self.tx.clone(),
        }
    }
}

impl<T> StageSender<T> {
    /// Blocking put; a closed downstream is a pipeline error.
    pub fn put(&self, item: T) -> Result<(), PipelineError> {
        enqueue(&self.tx, item, PutMode::Block).map_err(|_| PipelineError::StageClosed {
            stage: self.stage.clone(),
        })
    }
}

/// Stop-token broadcaster registered with the run's [`AbortSignal`].
pub struct StopHandle<T> {
    stage: String,
    tx: Sender<Message<T>>,
    workers: usize,
}

impl<T: Send> StopBroadcast for StopHandle<T> {
    fn broadcast_stop(&self) -> usize {
        let mut sent = 0;
        for _ in 0..self.workers {
            if self.tx.try_send(Message::Stop).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }

    fn stage_name(&self) -> &str {
        &self.stage
    }
}

struct Worker<S: Stage> {
    pool: String,
    rx: Receiver<Message<S::Item>>,
    stage: Arc<S>,
    abort: Arc<AbortSignal>,
    live: Arc<AtomicUsize>,
    throttle: Duration,
}

impl<S: Stage> Worker<S> {
    fn run(self) {
        let Worker {
            pool,
            rx,
            stage,
            abort,
            live,
            throttle,
        } = self;

        let mut completed = 0u64;
        loop {
            let item = match rx.recv() {
                Ok(Message::Work(item)) => item,
                Ok(Message::Stop) => break,
                // Every sender is gone, nothing more can arrive.
                Err(_) => break,
            };
            if abort.is_triggered() {
                log::debug!("{}: run aborted, discarding queued work", pool);
                break;
            }
            if let Err(e) = stage.process(item) {
                if e.is_abort_fallout() {
                    log::debug!("{}: {}", pool, e);
                } else {
                    log::debug!("{}: job failed, aborting run", pool);
                }
                abort.trigger(e);
                break;
            }
            completed += 1;
            if !throttle.is_zero() {
                thread::sleep(throttle);
            }
        }

        // Release the receiver first so blocked producers see a closed queue
        // once the last worker is gone.
        drop(rx);
        log::trace!("{}: worker exiting after {} job(s)", pool, completed);

        if live.fetch_sub(1, Ordering::SeqCst) == 1 {
            if let Err(e) = stage.finish() {
                abort.trigger(e);
            }
        }
    }
}

/// A fixed set of threads draining one queue into a [`Stage`].
pub struct WorkerPool<S: Stage> {
    name: String,
    tx: Sender<Message<S::Item>>,
    handles: Vec<JoinHandle<()>>,
    workers: usize,
    live: Arc<AtomicUsize>,
    stage: Arc<S>,
}

impl<S: Stage> WorkerPool<S> {
    /// Spawn `config.workers` threads and register the pool with `abort`.
    pub fn new(
        name: &str,
        config: &PoolConfig,
        stage: S,
        abort: Arc<AbortSignal>,
    ) -> Result<Self, PipelineError> {
        config.validate(name)?;

        let (tx, rx) = match config.capacity {
            Some(slots) => bounded(slots),
            None => unbounded(),
        };
        let stage = Arc::new(stage);
        let live = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::with_capacity(config.workers);

        for i in 0..config.workers {
            let worker = Worker {
                pool: name.to_string(),
                rx: rx.clone(),
                stage: Arc::clone(&stage),
                abort: Arc::clone(&abort),
                live: Arc::clone(&live),
                throttle: config.throttle,
            };
            live.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    live.fetch_sub(1, Ordering::SeqCst);
                    for _ in 0..handles.len() {
                        let _ = tx.send(Message::Stop);
                    }
                    return Err(PipelineError::io(
                        format!("spawning {} worker {}", name, i),
                        e,
                    ));
                }
            }
        }

        log::debug!(
            "{}: {} worker(s), capacity {}, throttle {:?}",
            name,
            config.workers,
            config
                .capacity
                .map_or_else(|| "unbounded".to_string(), |c| c.to_string()),
            config.throttle
        );

        abort.register(Box::new(StopHandle {
            stage: name.to_string(),
            tx: tx.clone(),
            workers: config.workers,
        }));

        Ok(Self {
            name: name.to_string(),
            tx,
            handles,
            workers: config.workers,
            live,
            stage,
        })
    }

    pub fn put(&self, item: S::Item, mode: PutMode) -> Result<(), PutError<S::Item>> {
        enqueue(&self.tx, item, mode)
    }

    pub fn sender(&self) -> StageSender<S::Item> {
        StageSender {
            stage: self.name.clone(),
            tx: self.tx.clone(),
        }
    }

    /// Enqueue exactly one stop token per worker, blocking while full.
    ///
    /// Returns how many were accepted; fewer than `worker_count()` means the
    /// workers had already exited.
    pub fn send_stop(&self) -> usize {
        let mut sent = 0;
        for _ in 0..self.workers {
            if self.tx.send(Message::Stop).is_err() {
                break;
            }
            sent += 1;
        }
        sent
    }

    /// Enqueue a single stop token.
    pub fn send_one_stop(&self) -> bool {
        self.tx.send(Message::Stop).is_ok()
    }

    /// Wait for every worker thread to exit.
    pub fn join(mut self) -> Result<Arc<S>, PipelineError> {
        let mut panicked = false;
        for handle in std::mem::take(&mut self.handles) {
            if handle.join().is_err() {
                panicked = true;
            }
        }
        if panicked {
            return Err(PipelineError::WorkerPanicked {
                stage: self.name.clone(),
            });
        }
        Ok(Arc::clone(&self.stage))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Messages currently buffered, stop tokens included.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }

    pub fn stage(&self) -> &Arc<S> {
        &self.stage
    }
}

impl<S: Stage> Drop for WorkerPool<S> {
    fn drop(&mut self) {
        // Dropped without join (early return): ask workers to leave, but never
        // block here.
        for _ in 0..self.handles.len() {
            if self.tx.try_send(Message::Stop).is_err() {
                break;
            }
        }
    }
}
