use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam::channel;
use tracing::{debug, error, info};

use crate::chunk::Batch;
use crate::progress::ProgressAggregator;
use crate::task::{BatchTask, Tally};

/// Result of one batch as seen by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub index: usize,
    pub size: usize,
    pub attempted: u64,
    pub applied: u64,
    /// Set when the whole batch failed; its counts are then zero.
    pub error: Option<String>,
}

/// Everything the dispatcher collected, in completion order.
#[derive(Debug, Default)]
pub struct DispatchSummary {
    pub submitted: usize,
    pub outcomes: Vec<BatchOutcome>,
}

impl DispatchSummary {
    pub fn failed_batches(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }

    pub fn totals(&self) -> Tally {
        let mut tally = Tally::default();
        for outcome in &self.outcomes {
            tally += Tally::new(outcome.attempted, outcome.applied);
        }
        tally
    }
}

/// Fixed-size pool of worker threads that runs one task per batch.
///
/// At most `workers` batches are in flight or queued at once, so the batch
/// source is pulled only as fast as the pool drains it.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    workers: NonZeroUsize,
}

impl Dispatcher {
    pub fn new(workers: NonZeroUsize) -> Self {
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Run `task` over every batch and wait for all of them to finish.
    ///
    /// `on_submitted` fires once the source is exhausted, before the final
    /// drain. Failing or panicking tasks are logged and count as zero.
    pub fn run<T, I, K>(
        &self,
        batches: I,
        task: &K,
        progress: &ProgressAggregator,
        on_submitted: impl FnOnce(usize),
    ) -> DispatchSummary
    where
        T: Send,
        I: IntoIterator<Item = Batch<T>>,
        K: BatchTask<T> + ?Sized,
    {
        let workers = self.workers.get();
        let (job_tx, job_rx) = channel::bounded::<Batch<T>>(workers);
        let (done_tx, done_rx) = channel::unbounded::<BatchOutcome>();
        let mut summary = DispatchSummary::default();

        thread::scope(|s| {
            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let done_tx = done_tx.clone();
                s.spawn(move || {
                    for batch in job_rx.iter() {
                        let outcome = execute(task, batch, worker);
                        progress.record(outcome.applied);
                        if done_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(done_tx);

            for batch in batches {
                if job_tx.send(batch).is_err() {
                    error!("worker pool shut down early");
                    break;
                }
                summary.submitted += 1;
                summary.outcomes.extend(done_rx.try_iter());
            }
            drop(job_tx);
            on_submitted(summary.submitted);

            // Barrier: the channel closes once every worker has exited.
            summary.outcomes.extend(done_rx.iter());
        });

        debug!(
            submitted = summary.submitted,
            completed = summary.outcomes.len(),
            "dispatcher drained"
        );
        summary
    }
}

fn execute<T, K>(task: &K, batch: Batch<T>, worker: usize) -> BatchOutcome
where
    K: BatchTask<T> + ?Sized,
{
    let index = batch.index;
    let size = batch.len();
    debug!(batch = index, size, worker, "batch started");
    let failed = |message: String| BatchOutcome {
        index,
        size,
        attempted: 0,
        applied: 0,
        error: Some(message),
    };
    match panic::catch_unwind(AssertUnwindSafe(|| task.run(batch))) {
        Ok(Ok(tally)) => {
            info!(
                batch = index,
                size,
                attempted = tally.attempted,
                applied = tally.applied,
                "batch completed"
            );
            BatchOutcome {
                index,
                size,
                attempted: tally.attempted,
                applied: tally.applied,
                error: None,
            }
        }
        Ok(Err(e)) => {
            error!(batch = index, size, error = %e, "batch failed");
            failed(e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(batch = index, size, error = %message, "batch panicked");
            failed(format!("panicked: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
