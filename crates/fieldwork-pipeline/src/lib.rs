mod bulk;
mod chunk;
mod dispatch;
mod driver;
mod error;
mod progress;
mod task;

pub use bulk::BulkWriter;
pub use chunk::{Batch, Chunker};
pub use dispatch::{BatchOutcome, DispatchSummary, Dispatcher};
pub use driver::{JobConfig, JobDriver, JobReport, JobState, default_workers};
pub use error::JobError;
pub use progress::{ProgressAggregator, ProgressSink};
pub use task::{BatchTask, BulkApply, Tally, WritePlanner};
