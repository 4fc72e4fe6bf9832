use std::collections::HashSet;

use bson::{Bson, Document};
use fieldwork_pipeline::{Batch, BatchTask, BulkWriter, JobError, Tally};
use fieldwork_store::{BsonKey, Store, WriteOp};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::fields::identified;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferMode {
    /// Leave the source untouched.
    #[default]
    Copy,
    /// Delete each transferred document from the source.
    Move,
}

/// Inserts source documents missing from the target, unchanged.
///
/// In move mode only documents the target confirmed are removed from the
/// source.
pub struct TransferDocuments<'a, S: Store + ?Sized, T: Store + ?Sized> {
    source: &'a S,
    target: BulkWriter<'a, T>,
    mode: TransferMode,
}

impl<'a, S: Store + ?Sized, T: Store + ?Sized> TransferDocuments<'a, S, T> {
    pub fn new(source: &'a S, target: &'a T, mode: TransferMode) -> Self {
        Self {
            source,
            target: BulkWriter::new(target),
            mode,
        }
    }
}

impl<S: Store + ?Sized, T: Store + ?Sized> BatchTask<Document> for TransferDocuments<'_, S, T> {
    fn run(&self, batch: Batch<Document>) -> Result<Tally, JobError> {
        let ids: Vec<Bson> = identified(&batch.items).map(|(id, _)| id.clone()).collect();
        let existing: HashSet<BsonKey> = self
            .target
            .store()
            .existing_ids(&ids)?
            .iter()
            .map(BsonKey::new)
            .collect();
        let (ops, new_ids): (Vec<WriteOp>, Vec<Bson>) = identified(&batch.items)
            .filter(|(id, _)| !existing.contains(&BsonKey::new(id)))
            .map(|(id, doc)| (WriteOp::insert(doc.clone()), id.clone()))
            .unzip();
        if ops.is_empty() {
            info!(batch = batch.index, "no new documents in batch");
            return Ok(Tally::default());
        }

        let result = self.target.write(batch.index, &ops)?;
        info!(
            batch = batch.index,
            collection = %self.target.store().namespace(),
            inserted = result.applied,
            "documents inserted"
        );

        if self.mode == TransferMode::Move {
            let rejected: HashSet<usize> = result.errors.iter().map(|e| e.index).collect();
            let inserted: Vec<Bson> = new_ids
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !rejected.contains(i))
                .map(|(_, id)| id)
                .collect();
            match self.source.delete_many(&inserted) {
                Ok(deleted) => {
                    info!(batch = batch.index, moved = deleted, "documents removed from source");
                    if deleted < inserted.len() as u64 {
                        warn!(
                            batch = batch.index,
                            expected = inserted.len(),
                            deleted,
                            "fewer source documents deleted than inserted"
                        );
                    }
                }
                Err(e) => error!(
                    batch = batch.index,
                    count = inserted.len(),
                    error = %e,
                    "inserted documents were not removed from source"
                ),
            }
        }
        Ok(Tally::from(&result))
    }
}

/// Transfers documents one identifier at a time.
///
/// Lookup and write errors are logged per identifier and never stop the
/// rest of the batch.
pub struct TransferByIds<'a, S: Store + ?Sized, T: Store + ?Sized> {
    source: &'a S,
    target: &'a T,
    mode: TransferMode,
}

impl<'a, S: Store + ?Sized, T: Store + ?Sized> TransferByIds<'a, S, T> {
    pub fn new(source: &'a S, target: &'a T, mode: TransferMode) -> Self {
        Self {
            source,
            target,
            mode,
        }
    }

    fn transfer(&self, id: &Bson) -> Result<bool, JobError> {
        let Some(doc) = self.source.find_one(id, None)? else {
            warn!(id = %id, collection = %self.source.namespace(), "document not found");
            return Ok(false);
        };
        self.target.insert_one(doc)?;
        if self.mode == TransferMode::Move {
            self.source.delete_one(id)?;
            info!(id = %id, "document moved");
        } else {
            info!(id = %id, "document copied");
        }
        Ok(true)
    }
}

impl<S: Store + ?Sized, T: Store + ?Sized> BatchTask<Bson> for TransferByIds<'_, S, T> {
    fn run(&self, batch: Batch<Bson>) -> Result<Tally, JobError> {
        let mut transferred = 0;
        for id in &batch.items {
            match self.transfer(id) {
                Ok(true) => transferred += 1,
                Ok(false) => {}
                Err(e) => error!(id = %id, error = %e, "error transferring document"),
            }
        }
        Ok(Tally::new(batch.len() as u64, transferred))
    }
}
