use bson::{Bson, Document};
use fieldwork_pipeline::{Batch, BatchTask, JobError, Tally};
use fieldwork_query::{Projection, get_path};
use fieldwork_store::{RetryPolicy, Store, update_with_retry};
use tracing::{debug, error, info};

use crate::fields::check_path;

/// Copies one field from source to target for each listed identifier.
///
/// Target updates go through the bounded single-document retry path. The
/// count is the number of target documents actually modified.
pub struct CopyFieldByIds<'a, S: Store + ?Sized, T: Store + ?Sized> {
    source: &'a S,
    target: &'a T,
    field: String,
    projection: Projection,
    retry: RetryPolicy,
}

impl<'a, S: Store + ?Sized, T: Store + ?Sized> CopyFieldByIds<'a, S, T> {
    pub fn new(source: &'a S, target: &'a T, field: &str, retry: RetryPolicy) -> Result<Self, JobError> {
        check_path(field)?;
        Ok(Self {
            source,
            target,
            field: field.to_string(),
            projection: Projection::new([field]),
            retry,
        })
    }

    fn copy(&self, id: &Bson) -> Result<bool, JobError> {
        let Some(doc) = self.source.find_one(id, Some(&self.projection))? else {
            debug!(id = %id, "source document not found");
            return Ok(false);
        };
        let Some(value) = get_path(&doc, &self.field) else {
            debug!(id = %id, field = %self.field, "source document has no value");
            return Ok(false);
        };
        let mut fields = Document::new();
        fields.insert(self.field.as_str(), value.clone());
        Ok(update_with_retry(self.target, id, &fields, self.retry).is_some_and(|o| o.modified > 0))
    }
}

impl<S: Store + ?Sized, T: Store + ?Sized> BatchTask<Bson> for CopyFieldByIds<'_, S, T> {
    fn run(&self, batch: Batch<Bson>) -> Result<Tally, JobError> {
        let mut updated = 0;
        for id in &batch.items {
            match self.copy(id) {
                Ok(true) => updated += 1,
                Ok(false) => {}
                Err(e) => error!(id = %id, error = %e, "error copying field"),
            }
        }
        Ok(Tally::new(batch.len() as u64, updated))
    }
}

/// Deletes each batch of identifiers with a single request.
pub struct DeleteByIds<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> DeleteByIds<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }
}

impl<S: Store + ?Sized> BatchTask<Bson> for DeleteByIds<'_, S> {
    fn run(&self, batch: Batch<Bson>) -> Result<Tally, JobError> {
        let deleted = self.store.delete_many(&batch.items)?;
        info!(
            batch = batch.index,
            collection = %self.store.namespace(),
            requested = batch.len(),
            deleted,
            "documents deleted"
        );
        Ok(Tally::new(batch.len() as u64, deleted))
    }
}
