//! Generations of workers and the supervisor that resets them.
//!
//! A [`Generation`] is one cancellable cohort of workers: a scope token, the
//! result channel its workers report into, and an indexed set of slots. The
//! [`Supervisor`] owns the merged input, the retry stream and at most one
//! live generation. A reset cancels the live generation, waits for its
//! workers to stop, and launches a fresh one with `pool_size` new requests.

use std::fmt;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use super::merge::{merge, MergedStream};
use super::stats::PipelineStats;
use super::worker::{result_channel, DecryptionResult, Outcome, ResultSink, ResultStream, Worker};
use crate::decrypt::{Decrypter, DecrypterFactory};
use crate::error::{ApiError, PipelineError};

/// Sequential identifier of a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenerationId(u64);

impl GenerationId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// A worker task occupying one pool slot.
struct Slot {
    decrypter_id: String,
    handle: JoinHandle<Outcome>,
}

/// One cohort of workers sharing a cancellation scope and a result channel.
pub struct Generation {
    id: GenerationId,
    scope: CancellationToken,
    sink: ResultSink,
    results: ResultStream,
    slots: Vec<Option<Slot>>,
}

impl Generation {
    fn open(id: GenerationId, parent: &CancellationToken, pool_size: usize) -> Self {
        let (sink, results) = result_channel(pool_size);
        Self {
            id,
            scope: parent.child_token(),
            sink,
            results,
            slots: (0..pool_size).map(|_| None).collect(),
        }
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    /// Workers of this generation that have not finished yet.
    pub fn active_workers(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| !slot.handle.is_finished())
            .count()
    }

    /// Start `worker` in `slot`, replacing whatever finished there before.
    fn launch(
        &mut self,
        slot: usize,
        worker: Worker,
        decrypter_id: String,
        request: String,
        retry: mpsc::Sender<String>,
    ) {
        let handle = worker.spawn(request, self.scope.clone(), self.sink.clone(), retry);
        trace!(generation = %self.id, slot, decrypter = %decrypter_id, "Worker launched");
        self.slots[slot] = Some(Slot {
            decrypter_id,
            handle,
        });
    }

    /// Cancel the scope, wait for every worker to stop, and return the
    /// results that were delivered but never read.
    async fn shutdown(mut self) -> Vec<DecryptionResult> {
        self.scope.cancel();
        self.sink.close();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot.take() else { continue };
            match slot.handle.await {
                Ok(outcome) => {
                    trace!(generation = %self.id, slot = index, ?outcome, "Worker stopped");
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!(
                        generation = %self.id,
                        slot = index,
                        decrypter = %slot.decrypter_id,
                        error = %e,
                        "Worker task panicked"
                    );
                }
            }
        }

        self.results.drain()
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

/// Whether the supervisor currently owns a running generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running(GenerationId),
}

/// Owns the worker pool: the merged input, the retry stream and the live
/// generation.
pub struct Supervisor {
    input: MergedStream,
    retry_tx: mpsc::Sender<String>,
    factory: Arc<dyn DecrypterFactory>,
    pool_size: usize,
    scope: CancellationToken,
    current: Option<Generation>,
    next_generation: u64,
    stats: Arc<PipelineStats>,
}

impl Supervisor {
    /// Create an idle supervisor pulling fresh passwords from `source`.
    ///
    /// Every generation's scope is a child of `scope`. `pool_size` must be
    /// at least one.
    pub fn new<S>(
        source: S,
        factory: Arc<dyn DecrypterFactory>,
        pool_size: usize,
        scope: CancellationToken,
        stats: Arc<PipelineStats>,
    ) -> Self
    where
        S: Stream<Item = Result<String, ApiError>> + Send + 'static,
    {
        let (retry_tx, retry_rx) = mpsc::channel(pool_size);
        let retries = ReceiverStream::new(retry_rx).map(Ok);

        Self {
            input: merge(retries, source).boxed(),
            retry_tx,
            factory,
            pool_size,
            scope,
            current: None,
            next_generation: 0,
            stats,
        }
    }

    pub fn state(&self) -> SupervisorState {
        match &self.current {
            Some(generation) => SupervisorState::Running(generation.id),
            None => SupervisorState::Idle,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn current_generation(&self) -> Option<GenerationId> {
        self.current.as_ref().map(Generation::id)
    }

    /// Workers of the live generation that are still running.
    pub fn active_workers(&self) -> usize {
        self.current.as_ref().map_or(0, Generation::active_workers)
    }

    /// Pull the next request off the merged stream, waiting until one of the
    /// two sources produces it.
    pub async fn next_request(&mut self) -> Result<String, PipelineError> {
        match self.input.next().await {
            Some(Ok(request)) => Ok(request),
            Some(Err(e)) => Err(PipelineError::Remote(e)),
            None => Err(PipelineError::InputClosed),
        }
    }

    /// Replace the live generation with a fresh one.
    ///
    /// Returns the results the previous generation delivered but the caller
    /// never received.
    pub async fn reset(&mut self) -> Result<Vec<DecryptionResult>, PipelineError> {
        let orphans = self.cancel().await;

        let id = GenerationId::new(self.next_generation);
        self.next_generation += 1;
        let generation = Generation::open(id, &self.scope, self.pool_size);
        let sink = generation.sink.clone();
        self.current = Some(generation);
        self.stats.record_generation();
        info!(
            generation = %id,
            workers = self.pool_size,
            orphans = orphans.len(),
            "Launching generation"
        );

        for slot in 0..self.pool_size {
            let Some(request) = self.pull_while_open(&sink).await? else {
                debug!(generation = %id, launched = slot, "Generation closed while launching");
                break;
            };
            let decrypter = self.factory.create();
            self.launch(slot, decrypter, request);
        }

        Ok(orphans)
    }

    /// Launch a replacement in the slot `finished` vacated, reusing its
    /// decrypter.
    ///
    /// Returns `false` without pulling a request if `finished` belongs to a
    /// generation that is no longer live, or whose result channel a failing
    /// worker has already closed.
    pub async fn refill(&mut self, finished: &DecryptionResult) -> Result<bool, PipelineError> {
        let sink = match self.current.as_ref() {
            Some(g) if g.id == finished.generation && !g.sink.is_closed() => g.sink.clone(),
            _ => return Ok(false),
        };

        let Some(request) = self.pull_while_open(&sink).await? else {
            return Ok(false);
        };
        self.launch(finished.slot, Arc::clone(&finished.decrypter), request);
        Ok(true)
    }

    /// Pull a request for the generation behind `sink`, giving up if that
    /// generation closes first. Dropping the pending pull loses nothing.
    async fn pull_while_open(&mut self, sink: &ResultSink) -> Result<Option<String>, PipelineError> {
        tokio::select! {
            biased;
            _ = sink.closed() => Ok(None),
            request = self.next_request() => request.map(Some),
        }
    }

    /// Next result of the live generation; `None` when there is no live
    /// generation or its result channel has closed and drained.
    pub async fn next_result(&mut self) -> Option<DecryptionResult> {
        match self.current.as_mut() {
            Some(generation) => generation.results.recv().await,
            None => None,
        }
    }

    /// Cancel the live generation, if any, and return its unread results.
    /// Calling it while idle is a no-op.
    pub async fn cancel(&mut self) -> Vec<DecryptionResult> {
        match self.current.take() {
            Some(generation) => {
                let id = generation.id;
                let orphans = generation.shutdown().await;
                debug!(generation = %id, orphans = orphans.len(), "Generation cancelled");
                orphans
            }
            None => Vec::new(),
        }
    }

    fn launch(&mut self, slot: usize, decrypter: Arc<dyn Decrypter>, request: String) {
        let retry = self.retry_tx.clone();
        let stats = Arc::clone(&self.stats);
        if let Some(generation) = self.current.as_mut() {
            let decrypter_id = decrypter.id().to_string();
            let worker = Worker::new(slot, generation.id, decrypter, stats);
            generation.launch(slot, worker, decrypter_id, request, retry);
        }
    }
}
