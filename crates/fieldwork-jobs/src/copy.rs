use std::collections::HashSet;

use bson::{Bson, Document};
use fieldwork_pipeline::{Batch, BatchTask, BulkWriter, JobError, Tally};
use fieldwork_query::{Projection, get_path};
use fieldwork_store::{BsonKey, Store, WriteOp};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::fields::{check_path, identified};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyMode {
    /// Insert projected documents whose identifier is not in the target yet.
    #[default]
    InsertMissing,
    /// Set the selected fields on target documents that already exist.
    UpdateMatching,
}

/// Copies an allow-list of fields from source documents into a target collection.
pub struct CopySelectedFields<'t, T: Store + ?Sized> {
    projection: Projection,
    mode: CopyMode,
    target: BulkWriter<'t, T>,
}

impl<'t, T: Store + ?Sized> CopySelectedFields<'t, T> {
    pub fn new(fields: Vec<String>, mode: CopyMode, target: &'t T) -> Result<Self, JobError> {
        for field in &fields {
            check_path(field)?;
        }
        let projection = Projection::new(fields);
        if projection.fields().is_empty() {
            return Err(JobError::InvalidInput("field allow-list must not be empty".into()));
        }
        Ok(Self {
            projection,
            mode,
            target: BulkWriter::new(target),
        })
    }

    fn plan(&self, docs: &[Document], existing: &HashSet<BsonKey>) -> Vec<WriteOp> {
        let present = |id: &Bson| existing.contains(&BsonKey::new(id));
        match self.mode {
            CopyMode::InsertMissing => identified(docs)
                .filter(|(id, _)| !present(id))
                .map(|(_, doc)| WriteOp::insert(self.projection.apply(doc)))
                .collect(),
            CopyMode::UpdateMatching => identified(docs)
                .filter(|(id, _)| present(id))
                .filter_map(|(id, doc)| {
                    let mut fields = Document::new();
                    for path in self.projection.fields() {
                        if let Some(value) = get_path(doc, path) {
                            fields.insert(path.as_str(), value.clone());
                        }
                    }
                    // Nothing to copy from this document.
                    (!fields.is_empty()).then(|| WriteOp::set_fields(id.clone(), fields))
                })
                .collect(),
        }
    }
}

impl<T: Store + ?Sized> BatchTask<Document> for CopySelectedFields<'_, T> {
    fn run(&self, batch: Batch<Document>) -> Result<Tally, JobError> {
        let ids: Vec<Bson> = identified(&batch.items).map(|(id, _)| id.clone()).collect();
        let existing: HashSet<BsonKey> = self
            .target
            .store()
            .existing_ids(&ids)?
            .iter()
            .map(BsonKey::new)
            .collect();
        let ops = self.plan(&batch.items, &existing);
        let result = self.target.write(batch.index, &ops)?;
        info!(
            batch = batch.index,
            mode = ?self.mode,
            collection = %self.target.store().namespace(),
            skipped = batch.len() - ops.len(),
            applied = result.applied,
            "selected fields copied"
        );
        Ok(Tally::from(&result))
    }
}
