//! # Dispatch Pool
//!
//! Bounded attempt queue and the worker tasks draining it.
//!
//! Workers share one receiver behind a mutex; each job is handed to exactly
//! one of them. Storage stays the source of truth: a job only carries the
//! attempt id, and an attempt left `queued` (queue full or closed, process
//! restart) is found again by [`DispatchPool::recover`].

use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::services::worker::{DispatchWorker, ProcessOutcome};
use crate::domain::value_objects::{AttemptId, CorrelationId};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A queued attempt waiting for a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchJob {
    /// The attempt to send.
    pub attempt_id: AttemptId,
    /// Causal chain of the request that queued it.
    pub correlation_id: CorrelationId,
}

impl DispatchJob {
    /// Creates a job.
    #[must_use]
    pub fn new(attempt_id: AttemptId, correlation_id: CorrelationId) -> Self {
        Self {
            attempt_id,
            correlation_id,
        }
    }
}

/// Receiving half of the dispatch queue.
pub type DispatchReceiver = mpsc::Receiver<DispatchJob>;

/// Sending half of the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchQueue {
    tx: mpsc::Sender<DispatchJob>,
}

impl DispatchQueue {
    /// Creates a queue holding at most `capacity` jobs.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, DispatchReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueues a job, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Internal` if the workers are gone.
    pub async fn enqueue(&self, job: DispatchJob) -> ApplicationResult<()> {
        self.tx.send(job).await.map_err(|e| {
            ApplicationError::internal(format!(
                "dispatch queue closed, attempt {} dropped",
                e.0.attempt_id
            ))
        })
    }

    /// Enqueues a job from a detached task after `delay`.
    ///
    /// # Errors
    ///
    /// Returns `ApplicationError::Internal` if the queue is already closed.
    pub fn enqueue_after(&self, job: DispatchJob, delay: Duration) -> ApplicationResult<()> {
        if self.tx.is_closed() {
            return Err(ApplicationError::internal("dispatch queue closed"));
        }
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let attempt_id = job.attempt_id;
            if tx.send(job).await.is_err() {
                debug!(%attempt_id, "dispatch queue closed before delayed job");
            }
        });
        Ok(())
    }

    /// Returns true once every receiver is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Worker tasks draining a dispatch queue.
#[derive(Debug)]
pub struct DispatchPool {
    queue: DispatchQueue,
    worker: Arc<DispatchWorker>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl DispatchPool {
    /// Spawns `worker_count` workers on `receiver`. They stop when `cancel`
    /// fires or the queue closes.
    #[must_use]
    pub fn spawn(
        worker: Arc<DispatchWorker>,
        queue: DispatchQueue,
        receiver: DispatchReceiver,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..worker_count.max(1))
            .map(|n| {
                tokio::spawn(worker_loop(
                    n,
                    Arc::clone(&receiver),
                    Arc::clone(&worker),
                    cancel.clone(),
                ))
            })
            .collect::<Vec<_>>();
        info!(workers = handles.len(), "dispatch pool started");
        Self {
            queue,
            worker,
            cancel,
            handles,
        }
    }

    /// Returns the queue feeding the pool.
    #[inline]
    #[must_use]
    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    /// Re-enqueues up to `limit` attempts still `queued` in storage.
    ///
    /// # Errors
    ///
    /// Returns storage errors, or `ApplicationError::Internal` if the queue
    /// closed meanwhile.
    pub async fn recover(&self, limit: usize) -> ApplicationResult<usize> {
        let queued = self.worker.dispatcher().ledger().queued(limit).await?;
        let count = queued.len();
        for attempt in queued {
            let correlation_id = CorrelationId::generate();
            debug!(attempt_id = %attempt.id(), %correlation_id, "recovering queued attempt");
            self.queue
                .enqueue(DispatchJob::new(attempt.id(), correlation_id))
                .await?;
        }
        if count > 0 {
            info!(count, "queued attempts recovered");
        }
        Ok(count)
    }

    /// Stops the workers and waits for them. A job being processed
    /// finishes first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for result in join_all(self.handles).await {
            if let Err(e) = result {
                warn!(error = %e, "dispatch worker panicked");
            }
        }
        info!("dispatch pool stopped");
    }
}

async fn worker_loop(
    n: usize,
    receiver: Arc<Mutex<DispatchReceiver>>,
    worker: Arc<DispatchWorker>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        match worker.process(&job).await {
            Ok(ProcessOutcome::Skipped) => {
                debug!(worker = n, attempt_id = %job.attempt_id, "job skipped");
            }
            Ok(outcome) => {
                debug!(
                    worker = n,
                    attempt_id = %job.attempt_id,
                    status = ?outcome.attempt().map(|a| a.status()),
                    "job processed"
                );
            }
            Err(e) => {
                warn!(worker = n, attempt_id = %job.attempt_id, error = %e, "job failed");
            }
        }
    }
    debug!(worker = n, "dispatch worker stopped");
}
