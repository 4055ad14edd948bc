//! The threaded collapse pipeline.
//!
//! ```text
//! ┌─────────┐  Q1  ┌──────────┐  Q2  ┌───────────┐  Q3  ┌───────────┐  Q4  ┌──────────┐
//! │ Keying  │─────>│ Grouping │─────>│ Consensus │─────>│ Reconcile │─────>│ Assembly │
//! │ (1 thr) │      │ (1 thr)  │      │ (N, rayon)│      │ (1 thr)   │      │ (caller) │
//! └─────────┘      └──────────┘      └───────────┘      └───────────┘      └──────────┘
//! ```
//!
//! Queues are bounded `crossbeam-channel`s carrying batches. Every stage but consensus is a
//! single thread, and consensus collects its parallel map in input order, so output order
//! matches [`run_serial`](crate::collapse::run_serial) exactly.
//!
//! The first failing stage records its error in the shared [`PipelineState`] and cancels
//! the run; the other stages notice at their next queue operation and stop. A send that
//! cannot complete within the stall timeout fails with [`CollapseError::Stalled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};
use log::debug;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::collapse::{KeyingStage, Stages, finish_family};
use crate::config::CollapseConfig;
use crate::consensus::{ConsensusBuilder, ConsensusPair, OverlapReconciler, ReconciledPair};
use crate::errors::{CollapseError, Result};
use crate::grouper::{DuplicateGrouper, Family, KeyedPair};
use crate::metrics::CollapseMetrics;
use crate::output::{OutputAssembler, PairWriter};
use crate::progress::ProgressTracker;
use crate::read_pair::ReadPair;
use crate::reference::ReferenceReader;

/// How often blocked queue operations re-check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Threading and queueing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Consensus worker threads
    pub threads: usize,
    /// Batches each queue holds before its producer blocks
    pub queue_capacity: usize,
    /// Items per batch
    pub batch_size: usize,
    /// How long a producer may wait on a full queue before the run fails
    pub stall_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { threads: 2, queue_capacity: 64, batch_size: 256, stall_timeout: Duration::from_secs(300) }
    }
}

/// Cancellation flag and first-error slot shared by all stages.
#[derive(Debug, Default)]
pub struct PipelineState {
    cancelled: AtomicBool,
    error: Mutex<Option<CollapseError>>,
}

impl PipelineState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the run without recording an error.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Records `error` unless one is already held, then cancels the run.
    pub fn set_error(&self, error: CollapseError) {
        let mut guard = self.error.lock();
        if guard.is_none() {
            *guard = Some(error);
        }
        drop(guard);
        self.cancel();
    }

    pub fn take_error(&self) -> Option<CollapseError> {
        self.error.lock().take()
    }
}

/// The sending half of a queue, aware of cancellation and stalls.
struct Outbox<'a, T> {
    tx: Sender<T>,
    stage: &'static str,
    state: &'a PipelineState,
    stall_timeout: Duration,
}

impl<'a, T> Outbox<'a, T> {
    fn new(tx: Sender<T>, stage: &'static str, state: &'a PipelineState, stall_timeout: Duration) -> Self {
        Self { tx, stage, state, stall_timeout }
    }

    fn send(&self, mut item: T) -> Result<()> {
        let deadline = Instant::now() + self.stall_timeout;
        loop {
            if self.state.is_cancelled() {
                return Err(CollapseError::Cancelled);
            }
            match self.tx.send_timeout(item, POLL_INTERVAL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(back)) => {
                    if Instant::now() >= deadline {
                        return Err(CollapseError::Stalled {
                            stage: self.stage,
                            seconds: self.stall_timeout.as_secs(),
                        });
                    }
                    item = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => return Err(CollapseError::Cancelled),
            }
        }
    }
}

impl<U> Outbox<'_, Vec<U>> {
    /// Sends `items` in batches of at most `batch_size`.
    fn send_batched(&self, mut items: Vec<U>, batch_size: usize) -> Result<()> {
        while !items.is_empty() {
            let rest = items.split_off(batch_size.min(items.len()));
            self.send(items)?;
            items = rest;
        }
        Ok(())
    }
}

/// Waits for the next item, or `None` once the producer has finished.
fn receive<T>(rx: &Receiver<T>, state: &PipelineState) -> Result<Option<T>> {
    loop {
        if state.is_cancelled() {
            return Err(CollapseError::Cancelled);
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(item) => return Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Ok(None),
        }
    }
}

/// Records a failed stage's error while the stage still holds its queue ends.
fn settle(state: &PipelineState, result: Result<CollapseMetrics>) -> CollapseMetrics {
    result.unwrap_or_else(|e| {
        state.set_error(e);
        CollapseMetrics::new()
    })
}

/// Runs the stages on worker threads. See the module documentation.
///
/// Returns the run's metrics, not yet finalized.
pub fn run_pipeline<I, W>(
    config: &CollapseConfig,
    reference: Option<ReferenceReader>,
    options: &PipelineOptions,
    pairs: I,
    output: &mut OutputAssembler<W>,
    progress: &ProgressTracker,
) -> Result<CollapseMetrics>
where
    I: IntoIterator<Item = Result<ReadPair>>,
    I::IntoIter: Send,
    W: PairWriter,
{
    let Stages { keying, grouper, builder, reconciler } = Stages::new(config, reference)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.threads.max(1))
        .thread_name(|i| format!("consensus-{i}"))
        .build()
        .map_err(|e| CollapseError::Pipeline(format!("Failed to build consensus thread pool: {e}")))?;

    let state = PipelineState::new();
    let capacity = options.queue_capacity.max(1);
    let batch_size = options.batch_size.max(1);
    let timeout = options.stall_timeout;
    let (keyed_tx, keyed_rx) = bounded::<Vec<KeyedPair>>(capacity);
    let (family_tx, family_rx) = bounded::<Vec<Family>>(capacity);
    let (consensus_tx, consensus_rx) = bounded::<Vec<ConsensusPair>>(capacity);
    let (reconciled_tx, reconciled_rx) = bounded::<Vec<ReconciledPair>>(capacity);

    let pairs = pairs.into_iter();
    let (state, builder, pool) = (&state, &builder, &pool);
    let metrics = thread::scope(|scope| {
        let handles = [
            (
                "keying",
                scope.spawn(move || {
                    let out = Outbox::new(keyed_tx, "keying", state, timeout);
                    settle(state, run_keying(keying, pairs, &out, batch_size, progress))
                }),
            ),
            (
                "grouping",
                scope.spawn(move || {
                    let out = Outbox::new(family_tx, "grouping", state, timeout);
                    settle(state, run_grouping(grouper, &keyed_rx, &out, batch_size, state))
                }),
            ),
            (
                "consensus",
                scope.spawn(move || {
                    let out = Outbox::new(consensus_tx, "consensus", state, timeout);
                    settle(state, run_consensus(builder, pool, &family_rx, &out, state))
                }),
            ),
            (
                "reconciliation",
                scope.spawn(move || {
                    let out = Outbox::new(reconciled_tx, "reconciliation", state, timeout);
                    settle(state, run_reconciliation(&reconciler, &consensus_rx, &out, state))
                }),
            ),
        ];

        let assembled = (|| -> Result<()> {
            while let Some(batch) = receive(&reconciled_rx, state)? {
                for pair in &batch {
                    output.write(pair)?;
                }
            }
            Ok(())
        })();
        if let Err(e) = assembled {
            state.set_error(e);
        }
        drop(reconciled_rx);

        let mut metrics = CollapseMetrics::new();
        for (stage, handle) in handles {
            match handle.join() {
                Ok(stage_metrics) => metrics.merge(&stage_metrics),
                Err(panic) => state.set_error(CollapseError::Pipeline(format!(
                    "{stage} stage panicked: {}",
                    panic_message(panic.as_ref())
                ))),
            }
        }
        metrics
    });

    match state.take_error() {
        Some(error) => Err(error),
        None => Ok(metrics),
    }
}

fn run_keying<I>(
    mut keying: KeyingStage,
    pairs: I,
    out: &Outbox<'_, Vec<KeyedPair>>,
    batch_size: usize,
    progress: &ProgressTracker,
) -> Result<CollapseMetrics>
where
    I: Iterator<Item = Result<ReadPair>>,
{
    let mut batch = Vec::with_capacity(batch_size);
    for pair in pairs {
        let pair = pair?;
        let (ref_id, start) = pair.coordinate();
        progress.record(1, || format!("{ref_id}:{start}"));
        if let Some(keyed) = keying.key(pair)? {
            batch.push(keyed);
        }
        if batch.len() >= batch_size {
            out.send(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
        }
    }
    if !batch.is_empty() {
        out.send(batch)?;
    }
    debug!("Keying stage finished");
    Ok(keying.into_metrics())
}

fn run_grouping(
    mut grouper: DuplicateGrouper,
    rx: &Receiver<Vec<KeyedPair>>,
    out: &Outbox<'_, Vec<Family>>,
    batch_size: usize,
    state: &PipelineState,
) -> Result<CollapseMetrics> {
    let mut batch: Vec<Family> = Vec::with_capacity(batch_size);
    while let Some(keyed) = receive(rx, state)? {
        for pair in keyed {
            batch.extend(grouper.push(pair)?);
            if batch.len() >= batch_size {
                out.send(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
            }
        }
    }
    batch.extend(grouper.finish());
    out.send_batched(batch, batch_size)?;
    debug!("Grouping stage finished");
    Ok(CollapseMetrics::new())
}

fn run_consensus(
    builder: &ConsensusBuilder,
    pool: &rayon::ThreadPool,
    rx: &Receiver<Vec<Family>>,
    out: &Outbox<'_, Vec<ConsensusPair>>,
    state: &PipelineState,
) -> Result<CollapseMetrics> {
    while let Some(families) = receive(rx, state)? {
        let built: Vec<ConsensusPair> =
            pool.install(|| families.par_iter().map(|family| builder.build(family)).collect());
        out.send(built)?;
    }
    debug!("Consensus stage finished");
    Ok(CollapseMetrics::new())
}

fn run_reconciliation(
    reconciler: &OverlapReconciler,
    rx: &Receiver<Vec<ConsensusPair>>,
    out: &Outbox<'_, Vec<ReconciledPair>>,
    state: &PipelineState,
) -> Result<CollapseMetrics> {
    let mut metrics = CollapseMetrics::new();
    while let Some(batch) = receive(rx, state)? {
        let reconciled = batch.into_iter().map(|pair| finish_family(reconciler, pair, &mut metrics)).collect();
        out.send(reconciled)?;
    }
    debug!("Reconciliation stage finished");
    Ok(metrics)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
