use bson::Document;
use fieldwork_store::{BulkWriteResult, Store, WriteOp};

use crate::bulk::BulkWriter;
use crate::chunk::Batch;
use crate::error::JobError;

/// Counts produced by one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub attempted: u64,
    pub applied: u64,
}

impl Tally {
    pub fn new(attempted: u64, applied: u64) -> Self {
        Self { attempted, applied }
    }
}

impl From<&BulkWriteResult> for Tally {
    fn from(result: &BulkWriteResult) -> Self {
        Self {
            attempted: result.attempted as u64,
            applied: result.applied as u64,
        }
    }
}

impl std::ops::AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.attempted += rhs.attempted;
        self.applied += rhs.applied;
    }
}

/// Work applied to a single batch by a pool worker.
///
/// Implementations are shared by every worker, so any state they hold must
/// be safe to read concurrently.
pub trait BatchTask<T>: Sync {
    fn run(&self, batch: Batch<T>) -> Result<Tally, JobError>;
}

impl<T, F> BatchTask<T> for F
where
    F: Fn(Batch<T>) -> Result<Tally, JobError> + Sync,
{
    fn run(&self, batch: Batch<T>) -> Result<Tally, JobError> {
        self(batch)
    }
}

/// Turns a batch of documents into write operations without touching a store.
pub trait WritePlanner: Sync {
    fn plan(&self, docs: &[Document]) -> Result<Vec<WriteOp>, JobError>;
}

/// Runs a [`WritePlanner`] per batch and submits the plan through a [`BulkWriter`].
pub struct BulkApply<'s, P, S: Store + ?Sized> {
    planner: P,
    writer: BulkWriter<'s, S>,
}

impl<'s, P: WritePlanner, S: Store + ?Sized> BulkApply<'s, P, S> {
    pub fn new(planner: P, target: &'s S) -> Self {
        Self {
            planner,
            writer: BulkWriter::new(target),
        }
    }
}

impl<P: WritePlanner, S: Store + ?Sized> BatchTask<Document> for BulkApply<'_, P, S> {
    fn run(&self, batch: Batch<Document>) -> Result<Tally, JobError> {
        let ops = self.planner.plan(&batch.items)?;
        let result = self.writer.write(batch.index, &ops)?;
        Ok(Tally::from(&result))
    }
}
