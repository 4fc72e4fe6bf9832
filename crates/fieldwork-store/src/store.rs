use std::fmt;

use bson::{Bson, Document};
use fieldwork_query::Projection;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::op::{BulkWriteResult, UpdateOutcome, WriteOp};

/// A lazily produced sequence of documents read from a store.
pub type DocumentStream<'a> = Box<dyn Iterator<Item = Result<Document, StoreError>> + 'a>;

/// Database + collection pair a store handle is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub database: String,
    pub collection: String,
}

impl Namespace {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A handle on one collection of a document database.
///
/// Handles are shared by reference across worker threads; every method takes
/// `&self` and backends multiplex requests over their own connection pool.
pub trait Store: Send + Sync {
    fn namespace(&self) -> &Namespace;

    /// Stream every document matching `filter`, optionally projected and capped.
    fn stream_matching<'a>(
        &'a self,
        filter: &'a Document,
        projection: Option<&'a Projection>,
        limit: Option<u64>,
    ) -> Result<DocumentStream<'a>, StoreError>;

    /// Count matches by streaming identifier-only documents and tallying them,
    /// instead of a server-side count that can time out on large collections.
    fn count_matching_by_scan(&self, filter: &Document) -> Result<u64, StoreError> {
        let projection = Projection::id_only();
        let mut total = 0u64;
        for doc in self.stream_matching(filter, Some(&projection), None)? {
            doc?;
            total += 1;
        }
        Ok(total)
    }

    fn find_one(
        &self,
        id: &Bson,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError>;

    /// Which of `ids` are already present, in no particular order.
    fn existing_ids(&self, ids: &[Bson]) -> Result<Vec<Bson>, StoreError>;

    /// Execute `ops` as one unordered request: every operation is attempted and
    /// a rejected operation never blocks its siblings.
    fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteResult, StoreError>;

    /// Unordered insert of many documents. Returns how many were inserted.
    fn insert_many(&self, docs: Vec<Document>) -> Result<u64, StoreError> {
        let ops: Vec<WriteOp> = docs.into_iter().map(WriteOp::Insert).collect();
        Ok(self.bulk_write(&ops)?.applied as u64)
    }

    fn insert_one(&self, doc: Document) -> Result<(), StoreError> {
        let result = self.bulk_write(&[WriteOp::Insert(doc)])?;
        match result.errors.into_iter().next() {
            Some(err) => Err(StoreError::Write(err.message)),
            None => Ok(()),
        }
    }

    /// Delete every document whose identifier is in `ids`. Returns how many were deleted.
    fn delete_many(&self, ids: &[Bson]) -> Result<u64, StoreError>;

    fn delete_one(&self, id: &Bson) -> Result<u64, StoreError> {
        self.delete_many(std::slice::from_ref(id))
    }

    /// `$set` the given fields on the document with identifier `id`.
    fn update_one(&self, id: &Bson, fields: &Document) -> Result<UpdateOutcome, StoreError>;

    /// Release the handle. Further calls may fail with [`StoreError::Closed`].
    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Opens store handles from process-level connection settings.
pub trait Connector: Send + Sync {
    type Store: Store;

    fn open(&self, namespace: &Namespace) -> Result<Self::Store, StoreError>;
}

impl<S: Store + ?Sized> Store for &S {
    fn namespace(&self) -> &Namespace {
        (**self).namespace()
    }

    fn stream_matching<'a>(
        &'a self,
        filter: &'a Document,
        projection: Option<&'a Projection>,
        limit: Option<u64>,
    ) -> Result<DocumentStream<'a>, StoreError> {
        (**self).stream_matching(filter, projection, limit)
    }

    fn count_matching_by_scan(&self, filter: &Document) -> Result<u64, StoreError> {
        (**self).count_matching_by_scan(filter)
    }

    fn find_one(
        &self,
        id: &Bson,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        (**self).find_one(id, projection)
    }

    fn existing_ids(&self, ids: &[Bson]) -> Result<Vec<Bson>, StoreError> {
        (**self).existing_ids(ids)
    }

    fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteResult, StoreError> {
        (**self).bulk_write(ops)
    }

    fn insert_many(&self, docs: Vec<Document>) -> Result<u64, StoreError> {
        (**self).insert_many(docs)
    }

    fn insert_one(&self, doc: Document) -> Result<(), StoreError> {
        (**self).insert_one(doc)
    }

    fn delete_many(&self, ids: &[Bson]) -> Result<u64, StoreError> {
        (**self).delete_many(ids)
    }

    fn delete_one(&self, id: &Bson) -> Result<u64, StoreError> {
        (**self).delete_one(id)
    }

    fn update_one(&self, id: &Bson, fields: &Document) -> Result<UpdateOutcome, StoreError> {
        (**self).update_one(id, fields)
    }

    fn close(&self) -> Result<(), StoreError> {
        (**self).close()
    }
}
