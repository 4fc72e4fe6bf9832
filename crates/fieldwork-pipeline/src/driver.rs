use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bson::Document;
use fieldwork_query::Projection;
use fieldwork_store::{Connection, Connector, Namespace, Store, StoreError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chunk::Chunker;
use crate::dispatch::{DispatchSummary, Dispatcher};
use crate::error::JobError;
use crate::progress::{ProgressAggregator, ProgressSink};
use crate::task::BatchTask;

/// Worker count used when none is configured: one per available core.
pub fn default_workers() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Counting,
    Streaming,
    Draining,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Counting => "counting",
            JobState::Streaming => "streaming",
            JobState::Draining => "draining",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything the driver needs to know about one run.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub name: String,
    pub filter: Document,
    pub projection: Option<Projection>,
    pub batch_size: usize,
    pub workers: usize,
    /// Cap on the number of documents streamed.
    pub limit: Option<u64>,
    /// Scan the working set up front to size progress reporting.
    pub count_total: bool,
}

impl JobConfig {
    pub const DEFAULT_BATCH_SIZE: usize = 500;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: Document::new(),
            projection: None,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            workers: default_workers(),
            limit: None,
            count_total: true,
        }
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Cap on streamed documents. `Some(0)` means no cap.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit.filter(|&l| l > 0);
        self
    }

    pub fn without_count(mut self) -> Self {
        self.count_total = false;
        self
    }

    /// Batch size and worker count, both checked to be non-zero.
    pub fn validate(&self) -> Result<(NonZeroUsize, NonZeroUsize), JobError> {
        let batch_size = NonZeroUsize::new(self.batch_size)
            .ok_or_else(|| JobError::InvalidInput("batch_size must be greater than zero".into()))?;
        let workers = NonZeroUsize::new(self.workers)
            .ok_or_else(|| JobError::InvalidInput("workers must be greater than zero".into()))?;
        Ok((batch_size, workers))
    }
}

/// Terminal summary of a job run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub job: String,
    pub state: JobState,
    /// Matching documents counted before streaming, if counted.
    pub total: Option<u64>,
    /// Operations the store confirmed as applied.
    pub processed: u64,
    pub attempted: u64,
    pub batches: usize,
    pub failed_batches: usize,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub error: Option<String>,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.job, self.state)?;
        match self.total {
            Some(total) => write!(f, ", processed {} of {}", self.processed, total)?,
            None => write!(f, ", processed {}", self.processed)?,
        }
        write!(
            f,
            " in {} batches ({} failed), {:.1}s",
            self.batches,
            self.failed_batches,
            self.elapsed.as_secs_f64()
        )?;
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}

fn transition(job: &str, state: &mut JobState, next: JobState) {
    debug!(job, from = %state, to = %next, "job state changed");
    *state = next;
}

/// Runs a job through `Pending → Counting → Streaming → Draining → Completed`.
///
/// Connection-level errors, unusable configuration and broken cursors move
/// the job to `Failed`. Per-batch failures never do; they only lower the
/// processed count.
pub struct JobDriver {
    config: JobConfig,
    state: JobState,
    started: Instant,
    progress: ProgressAggregator,
    total: Option<u64>,
    processed: u64,
    attempted: u64,
    batches: usize,
    failed_batches: usize,
    error: Option<String>,
}

impl JobDriver {
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            state: JobState::Pending,
            started: Instant::now(),
            progress: ProgressAggregator::new(),
            total: None,
            processed: 0,
            attempted: 0,
            batches: 0,
            failed_batches: 0,
            error: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = ProgressAggregator::with_sink(sink);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn transition(&mut self, next: JobState) {
        transition(&self.config.name, &mut self.state, next);
    }

    /// Mark the job failed. Later run calls return immediately.
    pub fn fail(&mut self, error: &JobError) {
        error!(job = %self.config.name, state = %self.state, error = %error, "job failed");
        self.error = Some(error.to_string());
        self.transition(JobState::Failed);
    }

    /// Open a scoped connection, failing the job if the store is unreachable.
    pub fn open<C>(
        &mut self,
        connector: &C,
        namespace: &Namespace,
    ) -> Result<Connection<C::Store>, JobError>
    where
        C: Connector + ?Sized,
    {
        Connection::open(connector, namespace).map_err(|e| {
            let e = JobError::from(e);
            self.fail(&e);
            e
        })
    }

    fn ready(&mut self) -> Option<(NonZeroUsize, NonZeroUsize)> {
        if self.state == JobState::Failed {
            return None;
        }
        match self.config.validate() {
            Ok(sizes) => Some(sizes),
            Err(e) => {
                self.fail(&e);
                None
            }
        }
    }

    /// Only count the matching documents.
    pub fn count<S: Store + ?Sized>(&mut self, source: &S) -> JobReport {
        if self.ready().is_none() {
            return self.report();
        }
        self.transition(JobState::Counting);
        match source.count_matching_by_scan(&self.config.filter) {
            Ok(count) => {
                self.total = Some(count);
                self.processed = count;
                info!(job = %self.config.name, collection = %source.namespace(), count, "documents counted");
                self.transition(JobState::Completed);
            }
            Err(e) => self.fail(&e.into()),
        }
        self.report()
    }

    /// Stream the configured query from `source` and run `task` on every batch.
    pub fn run_query<S, K>(&mut self, source: &S, task: &K) -> JobReport
    where
        S: Store + ?Sized,
        K: BatchTask<Document> + ?Sized,
    {
        let Some((batch_size, workers)) = self.ready() else {
            return self.report();
        };
        let filter = self.config.filter.clone();
        let projection = self.config.projection.clone();

        if self.config.count_total {
            self.transition(JobState::Counting);
            match source.count_matching_by_scan(&filter) {
                Ok(count) => {
                    let total = match self.config.limit {
                        Some(limit) if limit > 0 => count.min(limit),
                        _ => count,
                    };
                    info!(job = %self.config.name, collection = %source.namespace(), total, "documents to process");
                    self.total = Some(total);
                }
                Err(e) => {
                    self.fail(&e.into());
                    return self.report();
                }
            }
        }
        self.progress.start(self.total);

        self.transition(JobState::Streaming);
        let stream = match source.stream_matching(&filter, projection.as_ref(), self.config.limit) {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(&e.into());
                return self.report();
            }
        };
        let mut stream_error: Option<StoreError> = None;
        let docs = stream.map_while(|doc| match doc {
            Ok(doc) => Some(doc),
            Err(e) => {
                stream_error = Some(e);
                None
            }
        });
        let summary = self.dispatch(Chunker::new(docs, batch_size), workers, task);
        self.absorb(summary);

        match stream_error {
            Some(e) => {
                warn!(job = %self.config.name, processed = self.processed, "cursor failed mid-stream");
                self.fail(&e.into());
            }
            None => self.complete(),
        }
        self.report()
    }

    /// Run `task` over an explicit item sequence, such as an identifier list.
    pub fn run_items<T, I, K>(&mut self, items: I, total: Option<u64>, task: &K) -> JobReport
    where
        T: Send,
        I: IntoIterator<Item = T>,
        K: BatchTask<T> + ?Sized,
    {
        let Some((batch_size, workers)) = self.ready() else {
            return self.report();
        };
        self.total = total;
        self.progress.start(total);
        self.transition(JobState::Streaming);
        let summary = self.dispatch(Chunker::new(items.into_iter(), batch_size), workers, task);
        self.absorb(summary);
        self.complete();
        self.report()
    }

    fn dispatch<T, I, K>(&mut self, batches: Chunker<I>, workers: NonZeroUsize, task: &K) -> DispatchSummary
    where
        T: Send,
        I: Iterator<Item = T>,
        K: BatchTask<T> + ?Sized,
    {
        let job = self.config.name.as_str();
        let state = &mut self.state;
        Dispatcher::new(workers).run(batches, task, &self.progress, |submitted| {
            debug!(job, submitted, "all batches submitted");
            transition(job, state, JobState::Draining);
        })
    }

    fn absorb(&mut self, summary: DispatchSummary) {
        let totals = summary.totals();
        self.attempted = totals.attempted;
        self.batches = summary.submitted;
        self.failed_batches = summary.failed_batches();
        self.processed = self.progress.finish();
        debug_assert_eq!(self.processed, totals.applied);
    }

    fn complete(&mut self) {
        self.transition(JobState::Completed);
        info!(
            job = %self.config.name,
            processed = self.processed,
            total = ?self.total,
            batches = self.batches,
            failed_batches = self.failed_batches,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "job completed"
        );
    }

    pub fn report(&self) -> JobReport {
        JobReport {
            job: self.config.name.clone(),
            state: self.state,
            total: self.total,
            processed: self.processed,
            attempted: self.attempted,
            batches: self.batches,
            failed_batches: self.failed_batches,
            elapsed: self.started.elapsed(),
            error: self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = JobConfig::new("t").with_batch_size(0);
        assert!(matches!(config.validate(), Err(JobError::InvalidInput(_))));
        let config = JobConfig::new("t").with_workers(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let mut driver = JobDriver::new(JobConfig::new("t").with_batch_size(0));
        let task = |_: crate::chunk::Batch<u32>| -> Result<crate::task::Tally, JobError> {
            panic!("must not run")
        };
        let report = driver.run_items(vec![1, 2, 3], None, &task);
        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.batches, 0);
        assert!(report.error.unwrap().contains("batch_size"));
    }

    #[test]
    fn report_display_mentions_counts() {
        let report = JobReport {
            job: "rename".into(),
            state: JobState::Completed,
            total: Some(10),
            processed: 9,
            attempted: 10,
            batches: 2,
            failed_batches: 0,
            elapsed: Duration::from_millis(1500),
            error: None,
        };
        assert_eq!(
            report.to_string(),
            "rename: completed, processed 9 of 10 in 2 batches (0 failed), 1.5s"
        );
    }
}
