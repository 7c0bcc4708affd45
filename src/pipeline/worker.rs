//! A single decryption attempt and the channel it reports into.
//!
//! A [`Worker`] takes exactly one request and ends with exactly one outcome:
//! the decrypted result is sent to its generation's [`ResultSink`], or the
//! request goes back onto the retry stream. Cancelling the generation's scope
//! stops the worker at its next suspension point with neither side effect.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::generation::GenerationId;
use super::stats::PipelineStats;
use crate::decrypt::{run_stages, Decrypter};

/// A completed decryption, attributed to the slot and generation that ran it.
pub struct DecryptionResult {
    /// The decrypter that produced the output; reused for the slot's next
    /// request.
    pub decrypter: Arc<dyn Decrypter>,
    /// Pool slot the worker occupied.
    pub slot: usize,
    /// Generation the worker belonged to.
    pub generation: GenerationId,
    /// The encrypted password as received.
    pub input: String,
    /// The decrypted password.
    pub output: String,
}

impl fmt::Debug for DecryptionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionResult")
            .field("decrypter", &self.decrypter.id())
            .field("slot", &self.slot)
            .field("generation", &self.generation)
            .field("input", &self.input)
            .field("output", &self.output)
            .finish()
    }
}

/// Sending half of a generation's result channel.
///
/// Closing the sink is visible to every clone: later sends are refused and
/// the receiving [`ResultStream`] ends once its buffer is empty.
#[derive(Clone)]
pub struct ResultSink {
    tx: mpsc::Sender<DecryptionResult>,
    closed: CancellationToken,
}

/// Receiving half of a generation's result channel.
pub struct ResultStream {
    rx: mpsc::Receiver<DecryptionResult>,
    closed: CancellationToken,
}

/// Open a result channel buffering up to `capacity` results.
pub fn result_channel(capacity: usize) -> (ResultSink, ResultStream) {
    let (tx, rx) = mpsc::channel(capacity);
    let closed = CancellationToken::new();
    (
        ResultSink {
            tx,
            closed: closed.clone(),
        },
        ResultStream { rx, closed },
    )
}

impl ResultSink {
    /// Send a result, handing it back if the channel is closed.
    pub async fn send(&self, result: DecryptionResult) -> Result<(), DecryptionResult> {
        if self.closed.is_cancelled() {
            return Err(result);
        }
        self.tx.send(result).await.map_err(|e| e.0)
    }

    /// Refuse all further sends. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the sink has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl ResultStream {
    /// Next buffered result; `None` once the channel is closed and empty.
    pub async fn recv(&mut self) -> Option<DecryptionResult> {
        tokio::select! {
            biased;
            item = self.rx.recv() => item,
            _ = self.closed.cancelled() => self.rx.try_recv().ok(),
        }
    }

    /// Take every result currently buffered without waiting.
    pub fn drain(&mut self) -> Vec<DecryptionResult> {
        let mut drained = Vec::new();
        while let Ok(result) = self.rx.try_recv() {
            drained.push(result);
        }
        drained
    }
}

/// How a worker finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The result was delivered to the generation's sink.
    Completed,
    /// The request was pushed back onto the retry stream.
    Requeued,
    /// The generation was cancelled first; the request is dropped.
    Cancelled,
    /// The retry stream no longer exists; the request is dropped.
    Abandoned,
}

/// One decryption attempt bound to a pool slot.
pub struct Worker {
    slot: usize,
    generation: GenerationId,
    decrypter: Arc<dyn Decrypter>,
    stats: Arc<PipelineStats>,
}

impl Worker {
    pub fn new(
        slot: usize,
        generation: GenerationId,
        decrypter: Arc<dyn Decrypter>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            slot,
            generation,
            decrypter,
            stats,
        }
    }

    /// Run the attempt as its own task.
    pub fn spawn(
        self,
        request: String,
        scope: CancellationToken,
        results: ResultSink,
        retry: mpsc::Sender<String>,
    ) -> JoinHandle<Outcome> {
        tokio::spawn(self.run(request, scope, results, retry))
    }

    /// Decrypt `request`, racing the attempt against `scope` cancellation.
    pub async fn run(
        self,
        request: String,
        scope: CancellationToken,
        results: ResultSink,
        retry: mpsc::Sender<String>,
    ) -> Outcome {
        trace!(
            generation = %self.generation,
            slot = self.slot,
            decrypter = self.decrypter.id(),
            "Worker started"
        );

        tokio::select! {
            biased;
            _ = scope.cancelled() => {
                debug!(
                    generation = %self.generation,
                    slot = self.slot,
                    password = %request,
                    "Worker cancelled, dropping request"
                );
                Outcome::Cancelled
            }
            outcome = self.attempt(&request, &results, &retry) => outcome,
        }
    }

    async fn attempt(
        &self,
        request: &str,
        results: &ResultSink,
        retry: &mpsc::Sender<String>,
    ) -> Outcome {
        match run_stages(self.decrypter.as_ref(), request).await {
            Ok(output) => {
                let result = DecryptionResult {
                    decrypter: Arc::clone(&self.decrypter),
                    slot: self.slot,
                    generation: self.generation,
                    input: request.to_string(),
                    output,
                };

                match results.send(result).await {
                    Ok(()) => Outcome::Completed,
                    Err(rejected) => {
                        self.stats.record_rejected();
                        debug!(
                            generation = %self.generation,
                            slot = self.slot,
                            "Result channel closed, requeueing decrypted password"
                        );
                        self.requeue(rejected.input, retry).await
                    }
                }
            }
            Err(e) => {
                self.stats.record_transform_failure();
                warn!(
                    generation = %self.generation,
                    slot = self.slot,
                    decrypter = self.decrypter.id(),
                    password = %request,
                    error = %e,
                    "Decryption failed, requeueing"
                );
                results.close();
                self.requeue(request.to_string(), retry).await
            }
        }
    }

    async fn requeue(&self, request: String, retry: &mpsc::Sender<String>) -> Outcome {
        match retry.send(request).await {
            Ok(()) => {
                self.stats.record_requeued();
                Outcome::Requeued
            }
            Err(e) => {
                warn!(
                    generation = %self.generation,
                    slot = self.slot,
                    password = %e.0,
                    "Retry stream closed, dropping request"
                );
                Outcome::Abandoned
            }
        }
    }
}
