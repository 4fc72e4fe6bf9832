use fieldwork_store::{BulkWriteResult, Store, WriteOp};
use tracing::{debug, warn};

use crate::error::JobError;

/// Sends one batch of operations to a store as a single unordered request.
///
/// Individual operation failures are logged and reflected in the applied
/// count. A failure of the request itself is returned to the caller
/// unretried.
pub struct BulkWriter<'s, S: Store + ?Sized> {
    store: &'s S,
}

impl<'s, S: Store + ?Sized> BulkWriter<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &'s S {
        self.store
    }

    pub fn write(&self, batch: usize, ops: &[WriteOp]) -> Result<BulkWriteResult, JobError> {
        if ops.is_empty() {
            debug!(batch, "nothing to write");
            return Ok(BulkWriteResult::default());
        }
        let result = self.store.bulk_write(ops)?;
        for error in &result.errors {
            let op = ops.get(error.index);
            warn!(
                batch,
                op = error.index,
                kind = op.map(WriteOp::kind).unwrap_or("unknown"),
                id = %op.and_then(WriteOp::id).map(ToString::to_string).unwrap_or_default(),
                error = %error.message,
                "write operation rejected"
            );
        }
        debug!(
            batch,
            collection = %self.store.namespace(),
            attempted = result.attempted,
            applied = result.applied,
            "bulk write finished"
        );
        Ok(result)
    }
}
