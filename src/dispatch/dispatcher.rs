use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::collector::{CollectedOutcomes, ResultCollector};
use super::outcome::{FailureReason, JobOutcome};
use super::retry::RetryPolicy;
use crate::synthesis::{AudioArtifact, SynthesisError, SynthesisWorker, VoiceConfig};
use crate::text::Chunk;

/// What happens to in-flight synthesis when the run is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CancelPolicy {
    /// Let running attempts finish; their results are kept.
    Drain,
    /// Force-terminate running attempts `grace_ms` after cancellation.
    Abort { grace_ms: u64 },
}

impl Default for CancelPolicy {
    fn default() -> Self {
        Self::Drain
    }
}

/// Structured progress notifications, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Queued {
        total: usize,
    },
    Dispatched {
        chunk_index: usize,
        attempt: u32,
    },
    RetryScheduled {
        chunk_index: usize,
        attempt: u32,
        delay: Duration,
        error: SynthesisError,
    },
    Finished {
        chunk_index: usize,
        succeeded: bool,
        attempts: u32,
        completed: usize,
        total: usize,
    },
}

/// A queued attempt. `slot` is the chunk's position in the dispatched slice.
#[derive(Debug, Clone, Copy)]
struct WorkItem {
    slot: usize,
    attempts: u32,
}

enum ExecutorEvent {
    Retry {
        item: WorkItem,
        error: SynthesisError,
    },
    Finished(JobOutcome),
}

enum AttemptFailure {
    Synthesis(SynthesisError),
    Cancelled,
}

/// State shared by the executors of one run.
struct RunContext {
    worker: Arc<dyn SynthesisWorker>,
    voice: Arc<VoiceConfig>,
    chunks: Vec<Chunk>,
    queue: Mutex<mpsc::UnboundedReceiver<WorkItem>>,
    events: mpsc::UnboundedSender<ExecutorEvent>,
    retry: RetryPolicy,
    cancel: CancellationToken,
    cancel_policy: CancelPolicy,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl RunContext {
    fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    fn send(&self, event: ExecutorEvent) {
        // The receiver lives until every chunk is terminal.
        let _ = self.events.send(event);
    }

    async fn attempt(&self, chunk: &Chunk) -> Result<AudioArtifact, AttemptFailure> {
        let worker = Arc::clone(&self.worker);
        let voice = Arc::clone(&self.voice);
        let chunk = chunk.clone();
        let mut task = tokio::spawn(async move { worker.synthesize(&chunk, &voice).await });

        let joined = match self.cancel_policy {
            CancelPolicy::Drain => task.await,
            CancelPolicy::Abort { grace_ms } => {
                let deadline = async {
                    self.cancel.cancelled().await;
                    tokio::time::sleep(Duration::from_millis(grace_ms)).await;
                };
                tokio::select! {
                    joined = &mut task => joined,
                    _ = deadline => {
                        task.abort();
                        return Err(AttemptFailure::Cancelled);
                    }
                }
            }
        };

        match joined {
            Ok(result) => result.map_err(AttemptFailure::Synthesis),
            Err(e) if e.is_cancelled() => Err(AttemptFailure::Cancelled),
            Err(e) => Err(AttemptFailure::Synthesis(SynthesisError::permanent(format!(
                "synthesis task panicked: {e}"
            )))),
        }
    }
}

/// Runs synthesis for a list of chunks on a fixed pool of executors.
///
/// Each executor pulls the next queued chunk, invokes the worker, and on a
/// transient failure puts the chunk back on the queue after a backoff delay.
/// Permanent failures and exhausted retries are recorded and skipped; they
/// never stop other chunks.
///
/// ```rust,no_run
/// use std::num::NonZeroUsize;
/// use std::sync::Arc;
/// use narrate_rs::dispatch::{Dispatcher, RetryPolicy};
/// use narrate_rs::synthesis::{ProcessWorker, ProcessWorkerConfig, VoiceConfig};
/// use narrate_rs::text::chunk_text;
///
/// # async fn run() {
/// let worker = ProcessWorker::new(ProcessWorkerConfig::default(), "audio_chunks");
/// let dispatcher = Dispatcher::new(
///     Arc::new(worker),
///     VoiceConfig::default(),
///     NonZeroUsize::new(4).unwrap(),
///     RetryPolicy::default(),
/// );
///
/// let plan = chunk_text("First sentence. Second one.", NonZeroUsize::new(2500).unwrap());
/// let collected = dispatcher.run(&plan.chunks).await;
/// println!("failed chunks: {:?}", collected.failed);
/// # }
/// ```
pub struct Dispatcher {
    worker: Arc<dyn SynthesisWorker>,
    voice: Arc<VoiceConfig>,
    concurrency: NonZeroUsize,
    retry: RetryPolicy,
    cancel: CancellationToken,
    cancel_policy: CancelPolicy,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl Dispatcher {
    pub fn new(
        worker: Arc<dyn SynthesisWorker>,
        voice: VoiceConfig,
        concurrency: NonZeroUsize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            worker,
            voice: Arc::new(voice),
            concurrency,
            retry,
            cancel: CancellationToken::new(),
            cancel_policy: CancelPolicy::default(),
            progress: None,
        }
    }

    /// Stop the run when `token` is cancelled, treating in-flight work per `policy`.
    pub fn with_cancellation(mut self, token: CancellationToken, policy: CancelPolicy) -> Self {
        self.cancel = token;
        self.cancel_policy = policy;
        self
    }

    /// Send [`ProgressEvent`]s to `tx` while running.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Synthesize every chunk and return one terminal outcome per chunk, in
    /// chunk order.
    ///
    /// `chunks` must be indexed `0..N-1` in slice order, as produced by
    /// [`chunk_text`](crate::text::chunk_text).
    pub async fn run(&self, chunks: &[Chunk]) -> CollectedOutcomes {
        let total = chunks.len();
        let mut collector = ResultCollector::new(total);
        if total == 0 {
            return collector.finish_or_cancel();
        }

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(RunContext {
            worker: Arc::clone(&self.worker),
            voice: Arc::clone(&self.voice),
            chunks: chunks.to_vec(),
            queue: Mutex::new(work_rx),
            events: event_tx,
            retry: self.retry,
            cancel: self.cancel.clone(),
            cancel_policy: self.cancel_policy,
            progress: self.progress.clone(),
        });

        for slot in 0..total {
            let _ = work_tx.send(WorkItem { slot, attempts: 0 });
        }
        ctx.emit(ProgressEvent::Queued { total });

        let pool = self.concurrency.get().min(total);
        log::info!("Dispatching {total} chunks to {pool} executors");
        let mut executors = JoinSet::new();
        for id in 0..pool {
            executors.spawn(execute(Arc::clone(&ctx), id));
        }

        let mut completed = 0usize;
        while completed < total {
            let Some(event) = event_rx.recv().await else {
                break;
            };
            match event {
                ExecutorEvent::Retry { item, error } => {
                    let chunk_index = ctx.chunks[item.slot].index();
                    let delay = self.retry.backoff.delay_for(item.attempts);
                    log::warn!(
                        "Chunk {chunk_index} attempt {} failed ({}); retrying in {delay:?}",
                        item.attempts,
                        error.detail
                    );
                    ctx.emit(ProgressEvent::RetryScheduled {
                        chunk_index,
                        attempt: item.attempts,
                        delay,
                        error,
                    });
                    schedule_retry(&ctx, &work_tx, item, delay);
                }
                ExecutorEvent::Finished(outcome) => {
                    completed += 1;
                    match outcome.failure() {
                        None => log::info!(
                            "Chunk {} done ({completed}/{total})",
                            outcome.chunk_index
                        ),
                        Some(reason) => log::error!(
                            "Skipping chunk {} after {} attempt(s): {reason}",
                            outcome.chunk_index,
                            outcome.attempt_count
                        ),
                    }
                    ctx.emit(ProgressEvent::Finished {
                        chunk_index: outcome.chunk_index,
                        succeeded: outcome.is_success(),
                        attempts: outcome.attempt_count,
                        completed,
                        total,
                    });
                    collector.apply(outcome);
                }
            }
        }

        // Closing the queue lets idle executors exit.
        drop(work_tx);
        while let Some(joined) = executors.join_next().await {
            if let Err(e) = joined {
                log::error!("Executor task failed: {e}");
            }
        }

        collector.finish_or_cancel()
    }
}

async fn execute(ctx: Arc<RunContext>, id: usize) {
    loop {
        let next = ctx.queue.lock().await.recv().await;
        let Some(item) = next else {
            break;
        };
        let chunk = &ctx.chunks[item.slot];

        if ctx.cancel.is_cancelled() {
            ctx.send(ExecutorEvent::Finished(JobOutcome::cancelled(
                chunk.index(),
                item.attempts,
            )));
            continue;
        }

        let attempt = item.attempts + 1;
        log::debug!("executor {id}: chunk {} attempt {attempt}", chunk.index());
        ctx.emit(ProgressEvent::Dispatched {
            chunk_index: chunk.index(),
            attempt,
        });

        let event = match ctx.attempt(chunk).await {
            Ok(artifact) => {
                ExecutorEvent::Finished(JobOutcome::succeeded(chunk.index(), artifact, attempt))
            }
            Err(AttemptFailure::Cancelled) => {
                ExecutorEvent::Finished(JobOutcome::cancelled(chunk.index(), attempt))
            }
            Err(AttemptFailure::Synthesis(error)) if !error.is_transient() => ExecutorEvent::Finished(
                JobOutcome::failed(chunk.index(), FailureReason::Rejected(error), attempt),
            ),
            Err(AttemptFailure::Synthesis(_)) if ctx.cancel.is_cancelled() => {
                ExecutorEvent::Finished(JobOutcome::cancelled(chunk.index(), attempt))
            }
            Err(AttemptFailure::Synthesis(error)) if ctx.retry.allows_retry(attempt) => {
                ExecutorEvent::Retry {
                    item: WorkItem {
                        slot: item.slot,
                        attempts: attempt,
                    },
                    error,
                }
            }
            Err(AttemptFailure::Synthesis(error)) => ExecutorEvent::Finished(JobOutcome::failed(
                chunk.index(),
                FailureReason::RetriesExhausted(error),
                attempt,
            )),
        };
        ctx.send(event);
    }
    log::debug!("executor {id}: queue closed");
}

/// Put `item` back on the queue after `delay`, unless the run is cancelled first.
fn schedule_retry(
    ctx: &Arc<RunContext>,
    work_tx: &mpsc::UnboundedSender<WorkItem>,
    item: WorkItem,
    delay: Duration,
) {
    let ctx = Arc::clone(ctx);
    let work_tx = work_tx.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let index = ctx.chunks[item.slot].index();
                ctx.send(ExecutorEvent::Finished(JobOutcome::cancelled(index, item.attempts)));
            }
            _ = tokio::time::sleep(delay) => {
                let _ = work_tx.send(item);
            }
        }
    });
}
