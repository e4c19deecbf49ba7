//! Runs auto-mining batches on a background thread.
//!
//! A batch is CPU-bound, so interactive hosts hand it to a [`BatchWorker`]
//! and keep polling. The session still decides what to do with each result.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error};

use crate::pow::PowResult;
use crate::session::{BatchJob, BatchOutcome, MiningSession, SessionStateError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn search thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("search thread has exited")]
    Disconnected,
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
}

/// A finished batch with its wall-clock time.
#[derive(Debug, Clone)]
pub struct CompletedBatch {
    pub job: BatchJob,
    pub result: PowResult,
    pub elapsed: Duration,
}

pub struct BatchWorker {
    jobs: Option<Sender<BatchJob>>,
    results: Receiver<CompletedBatch>,
    handle: Option<JoinHandle<()>>,
}

impl BatchWorker {
    pub fn spawn() -> Result<Self, WorkerError> {
        let (job_tx, job_rx) = mpsc::channel::<BatchJob>();
        let (result_tx, result_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("pow-search".into())
            .spawn(move || {
                for job in job_rx {
                    let started = Instant::now();
                    let result = job.run();
                    let done = CompletedBatch {
                        job,
                        result,
                        elapsed: started.elapsed(),
                    };
                    if result_tx.send(done).is_err() {
                        break;
                    }
                }
                debug!("Search thread exiting");
            })?;

        Ok(BatchWorker {
            jobs: Some(job_tx),
            results: result_rx,
            handle: Some(handle),
        })
    }

    pub fn dispatch(&self, job: BatchJob) -> Result<(), WorkerError> {
        let jobs = self.jobs.as_ref().ok_or(WorkerError::Disconnected)?;
        jobs.send(job).map_err(|_| WorkerError::Disconnected)
    }

    /// A finished batch, if one is ready.
    pub fn try_collect(&self) -> Result<Option<CompletedBatch>, WorkerError> {
        match self.results.try_recv() {
            Ok(done) => Ok(Some(done)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Block until the next batch finishes.
    pub fn collect(&self) -> Result<CompletedBatch, WorkerError> {
        self.results.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// One scheduling tick: apply a finished batch if there is one, then
    /// issue the next if the session is still auto-mining. A batch the
    /// thread cannot accept is abandoned so the session is not left waiting.
    pub fn pump(&self, session: &mut MiningSession) -> Result<Option<BatchOutcome>, WorkerError> {
        let outcome = match self.try_collect()? {
            Some(done) => Some(Self::apply(session, done)),
            None => None,
        };

        if session.is_auto_running() && !session.has_batch_in_flight() {
            let job = session.begin_batch()?;
            if let Err(err) = self.dispatch(job.clone()) {
                session.abandon_batch(&job);
                return Err(err);
            }
        }
        Ok(outcome)
    }

    /// Wait for the in-flight batch, if any, and apply it.
    pub fn drain(&self, session: &mut MiningSession) -> Result<Option<BatchOutcome>, WorkerError> {
        if !session.has_batch_in_flight() {
            return Ok(None);
        }
        let done = self.collect()?;
        Ok(Some(Self::apply(session, done)))
    }

    fn apply(session: &mut MiningSession, done: CompletedBatch) -> BatchOutcome {
        session.observe_batch_time(done.result.hashes_computed, done.elapsed);
        session.complete_batch(&done.job, done.result)
    }
}

impl Drop for BatchWorker {
    fn drop(&mut self) {
        // Closing the job channel ends the thread's loop.
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Search thread panicked");
            }
        }
    }
}
