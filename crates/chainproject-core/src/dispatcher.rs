//! `Dispatcher`: per-partition ordered workers in front of the engine.
//!
//! Every partition key `(chainId, contract)` gets its own Tokio task fed by
//! a bounded queue, so events of one configuration are applied strictly in
//! arrival order while independent configurations run in parallel.
//!
//! Per event, a worker:
//! 1. drops it if it is at or before the partition's checkpoint (replay);
//! 2. applies it, retrying `StoreUnavailable` with exponential backoff;
//! 3. on any other failure (or an exhausted retry budget) records a
//!    [`DeadLetter`] and halts the partition. A halted worker stops taking
//!    events off its queue until an operator calls [`Dispatcher::resume`],
//!    so once the queue is full `dispatch` waits for that partition.
//!
//! Operator commands (resume, flush) travel on a separate control channel
//! and are never stuck behind queued events.
//!
//! Shutdown lets the in-flight apply of every worker complete, flushes
//! checkpoints and refuses new events.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointManager, CheckpointStore};
use crate::config::EngineConfig;
use crate::engine::{ApplyOutcome, ProjectionEngine};
use crate::error::ProjectionError;
use crate::event::{Event, PartitionKey, Position};
use crate::retry::RetryPolicy;

/// Operator decision for a halted partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Apply the dead-lettered event again.
    Retry,
    /// Drop the dead-lettered event and continue with the next one.
    Skip,
}

/// An event that could not be applied.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub partition: PartitionKey,
    pub event: Event,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Counters snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub applied: u64,
    pub unrouted: u64,
    pub skipped_replays: u64,
    pub skipped_dead_letters: u64,
    pub retries: u64,
    pub dead_lettered: u64,
    pub dropped_on_shutdown: u64,
    pub partitions: usize,
    pub halted_partitions: usize,
}

enum Control {
    Resume(Resume),
    Flush(oneshot::Sender<()>),
}

struct Shared {
    engine: Arc<ProjectionEngine>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    config: EngineConfig,
    retry: RetryPolicy,
    stats: Mutex<DispatcherStats>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    halted: Mutex<HashSet<PartitionKey>>,
    shutting_down: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    tx: mpsc::Sender<Event>,
    control: mpsc::UnboundedSender<Control>,
    handle: JoinHandle<()>,
}

pub struct Dispatcher {
    shared: Arc<Shared>,
    workers: Mutex<HashMap<PartitionKey, Worker>>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<ProjectionEngine>,
        checkpoints: Option<Arc<dyn CheckpointStore>>,
        config: EngineConfig,
    ) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            shared: Arc::new(Shared {
                engine,
                checkpoints,
                config,
                retry,
                stats: Mutex::new(DispatcherStats::default()),
                dead_letters: Mutex::new(Vec::new()),
                halted: Mutex::new(HashSet::new()),
                shutting_down: AtomicBool::new(false),
            }),
            workers: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<ProjectionEngine> {
        &self.shared.engine
    }

    /// Queue an event on its partition. Waits while the partition queue is
    /// full, which includes a halted partition whose queue has filled up.
    pub async fn dispatch(&self, event: Event) -> Result<(), ProjectionError> {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            return Err(ProjectionError::Aborted {
                reason: "dispatcher is shutting down".into(),
            });
        }
        let tx = self.sender(event.partition_key());
        tx.send(event)
            .await
            .map_err(|_| ProjectionError::Aborted {
                reason: "partition worker stopped".into(),
            })
    }

    /// Resolve a halted partition.
    pub async fn resume(&self, partition: &PartitionKey, decision: Resume) -> Result<(), ProjectionError> {
        let control = lock(&self.workers)
            .get(partition)
            .map(|w| w.control.clone())
            .ok_or_else(|| ProjectionError::Other(format!("unknown partition {partition}")))?;
        control
            .send(Control::Resume(decision))
            .map_err(|_| ProjectionError::Aborted {
                reason: "partition worker stopped".into(),
            })
    }

    /// Wait until every event queued so far has been handled and saved
    /// checkpoints are current. Events queued behind a halted partition stay
    /// queued.
    pub async fn flush(&self) {
        let controls: Vec<_> = lock(&self.workers).values().map(|w| w.control.clone()).collect();
        join_all(controls.into_iter().map(|control| async move {
            let (done_tx, done_rx) = oneshot::channel();
            if control.send(Control::Flush(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
        }))
        .await;
    }

    /// Stop accepting events, let in-flight applies complete and flush
    /// checkpoints. Events still queued are dropped; they will be delivered
    /// again from the last checkpoint.
    pub async fn shutdown(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        let workers: Vec<(PartitionKey, Worker)> = lock(&self.workers).drain().collect();
        info!(id = %self.shared.config.id, partitions = workers.len(), "dispatcher shutting down");
        join_all(workers.into_iter().map(|(partition, worker)| async move {
            drop(worker.tx);
            drop(worker.control);
            if let Err(e) = worker.handle.await {
                error!(%partition, error = %e, "partition worker panicked");
            }
        }))
        .await;
    }

    pub fn stats(&self) -> DispatcherStats {
        let mut stats = lock(&self.shared.stats).clone();
        stats.partitions = lock(&self.workers).len();
        stats.halted_partitions = lock(&self.shared.halted).len();
        stats
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        lock(&self.shared.dead_letters).clone()
    }

    pub fn halted_partitions(&self) -> Vec<PartitionKey> {
        let mut keys: Vec<_> = lock(&self.shared.halted).iter().cloned().collect();
        keys.sort();
        keys
    }

    fn sender(&self, partition: PartitionKey) -> mpsc::Sender<Event> {
        let mut workers = lock(&self.workers);
        let worker = workers.entry(partition.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::channel(self.shared.config.queue_capacity.max(1));
            let (control, control_rx) = mpsc::unbounded_channel();
            debug!(%partition, "starting partition worker");
            let handle = tokio::spawn(PartitionWorker::new(self.shared.clone(), partition).run(rx, control_rx));
            Worker { tx, control, handle }
        });
        worker.tx.clone()
    }
}

// ─── Partition worker ─────────────────────────────────────────────────────────

struct PartitionWorker {
    shared: Arc<Shared>,
    partition: PartitionKey,
    checkpoint: Option<CheckpointManager>,
    last: Option<Position>,
    /// The dead-lettered event; set while the partition is halted.
    failed: Option<Event>,
}

impl PartitionWorker {
    fn new(shared: Arc<Shared>, partition: PartitionKey) -> Self {
        let checkpoint = shared.checkpoints.clone().map(|store| {
            CheckpointManager::new(
                store,
                shared.config.id.clone(),
                partition.clone(),
                shared.config.checkpoint_interval,
            )
        });
        Self {
            shared,
            partition,
            checkpoint,
            last: None,
            failed: None,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Event>, mut control: mpsc::UnboundedReceiver<Control>) {
        self.load_checkpoint().await;

        loop {
            tokio::select! {
                biased;
                cmd = control.recv() => match cmd {
                    Some(Control::Resume(decision)) => self.resume(decision).await,
                    Some(Control::Flush(done)) => {
                        self.drain(&mut rx).await;
                        self.flush_checkpoint().await;
                        let _ = done.send(());
                    }
                    None => break,
                },
                event = rx.recv(), if self.failed.is_none() => match event {
                    Some(event) => self.accept(event).await,
                    None => break,
                },
            }
        }

        rx.close();
        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            lock(&self.shared.stats).dropped_on_shutdown += dropped;
        }
        self.flush_checkpoint().await;
        debug!(partition = %self.partition, "partition worker stopped");
    }

    /// Handle everything already queued, stopping early if the partition halts.
    async fn drain(&mut self, rx: &mut mpsc::Receiver<Event>) {
        while self.failed.is_none() {
            let Ok(event) = rx.try_recv() else { break };
            self.accept(event).await;
        }
    }

    async fn accept(&mut self, event: Event) {
        if self.shared.shutting_down.load(Ordering::SeqCst) {
            lock(&self.shared.stats).dropped_on_shutdown += 1;
            return;
        }
        self.process(event).await;
    }

    async fn load_checkpoint(&mut self) {
        let Some(mgr) = &self.checkpoint else { return };
        match mgr.load().await {
            Ok(Some(cp)) => {
                info!(partition = %self.partition, position = %cp.position(), "resuming from checkpoint");
                self.last = Some(cp.position());
            }
            Ok(None) => {}
            Err(e) => warn!(partition = %self.partition, error = %e, "could not load checkpoint"),
        }
    }

    async fn process(&mut self, event: Event) {
        let position = event.position();
        if self.shared.config.skip_replayed && self.last.is_some_and(|last| position <= last) {
            debug!(partition = %self.partition, %position, "skipping replayed event");
            lock(&self.shared.stats).skipped_replays += 1;
            return;
        }

        let mut attempt = 0;
        loop {
            match self.shared.engine.apply(&event).await {
                Ok(outcome) => {
                    {
                        let mut stats = lock(&self.shared.stats);
                        match outcome {
                            ApplyOutcome::Applied { .. } => stats.applied += 1,
                            ApplyOutcome::Unrouted => stats.unrouted += 1,
                        }
                    }
                    self.advance(position).await;
                    return;
                }
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    match self.shared.retry.next_delay(attempt) {
                        Some(delay) => {
                            warn!(
                                partition = %self.partition,
                                event = %event.name,
                                %position,
                                attempt,
                                error = %e,
                                "transient failure, retrying in {}ms",
                                delay.as_millis()
                            );
                            lock(&self.shared.stats).retries += 1;
                            tokio::time::sleep(delay).await;
                        }
                        None => return self.halt(event, e),
                    }
                }
                Err(e) => return self.halt(event, e),
            }
        }
    }

    fn halt(&mut self, event: Event, err: ProjectionError) {
        error!(
            partition = %self.partition,
            event = %event.name,
            position = %event.position(),
            error = %err,
            "event dead-lettered, partition halted"
        );
        lock(&self.shared.dead_letters).push(DeadLetter {
            partition: self.partition.clone(),
            event: event.clone(),
            error: err.to_string(),
            at: Utc::now(),
        });
        lock(&self.shared.stats).dead_lettered += 1;
        lock(&self.shared.halted).insert(self.partition.clone());
        self.failed = Some(event);
    }

    async fn resume(&mut self, decision: Resume) {
        let Some(failed) = self.failed.take() else {
            debug!(partition = %self.partition, "resume ignored, partition is running");
            return;
        };
        lock(&self.shared.halted).remove(&self.partition);
        info!(partition = %self.partition, ?decision, "resuming partition");

        match decision {
            Resume::Retry => self.process(failed).await,
            Resume::Skip => {
                lock(&self.shared.stats).skipped_dead_letters += 1;
                self.advance(failed.position()).await;
            }
        }
    }

    async fn advance(&mut self, position: Position) {
        self.last = Some(position);
        if let Some(mgr) = &mut self.checkpoint {
            if let Err(e) = mgr.maybe_save(position).await {
                warn!(partition = %self.partition, error = %e, "checkpoint save failed");
            }
        }
    }

    async fn flush_checkpoint(&mut self) {
        if let Some(mgr) = &mut self.checkpoint {
            if let Err(e) = mgr.flush().await {
                warn!(partition = %self.partition, error = %e, "checkpoint flush failed");
            }
        }
    }
}
