#![allow(dead_code)]

use std::collections::HashSet;

use bson::{Bson, Document, doc};
use fieldwork_query::Projection;
use fieldwork_store::{
    BsonKey, BulkWriteResult, Connector, DocumentStream, MemoryCollection, MemoryStore, Namespace,
    OpError, Store, StoreError, UpdateOutcome, WriteOp,
};

pub fn ns() -> Namespace {
    Namespace::new("test", "items")
}

/// A memory store seeded with `n` documents `{_id: i, n: i}`.
pub fn seeded(n: i32) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .seed(&ns(), (0..n).map(|i| doc! { "_id": i, "n": i }).collect())
        .unwrap();
    store
}

/// Wraps a collection and rejects every operation on the listed identifiers.
pub struct RejectingStore {
    pub inner: MemoryCollection,
    pub rejected: HashSet<BsonKey>,
}

impl RejectingStore {
    pub fn new(inner: MemoryCollection, rejected: &[Bson]) -> Self {
        Self {
            inner,
            rejected: rejected.iter().map(BsonKey::new).collect(),
        }
    }
}

impl Store for RejectingStore {
    fn namespace(&self) -> &Namespace {
        self.inner.namespace()
    }

    fn stream_matching<'a>(
        &'a self,
        filter: &'a Document,
        projection: Option<&'a Projection>,
        limit: Option<u64>,
    ) -> Result<DocumentStream<'a>, StoreError> {
        self.inner.stream_matching(filter, projection, limit)
    }

    fn find_one(
        &self,
        id: &Bson,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(id, projection)
    }

    fn existing_ids(&self, ids: &[Bson]) -> Result<Vec<Bson>, StoreError> {
        self.inner.existing_ids(ids)
    }

    fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteResult, StoreError> {
        let mut passed = Vec::new();
        let mut passed_idx = Vec::new();
        let mut errors = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            match op.id() {
                Some(id) if self.rejected.contains(&BsonKey::new(id)) => errors.push(OpError {
                    index,
                    message: format!("rejected {id}"),
                }),
                _ => {
                    passed.push(op.clone());
                    passed_idx.push(index);
                }
            }
        }
        let mut result = self.inner.bulk_write(&passed)?;
        for error in &mut result.errors {
            error.index = passed_idx[error.index];
        }
        result.errors.extend(errors);
        result.errors.sort_by_key(|e| e.index);
        result.attempted = ops.len();
        Ok(result)
    }

    fn delete_many(&self, ids: &[Bson]) -> Result<u64, StoreError> {
        self.inner.delete_many(ids)
    }

    fn update_one(&self, id: &Bson, fields: &Document) -> Result<UpdateOutcome, StoreError> {
        if self.rejected.contains(&BsonKey::new(id)) {
            return Err(StoreError::Write(format!("rejected {id}")));
        }
        self.inner.update_one(id, fields)
    }
}

/// Fails every bulk request whose operations include one of the listed identifiers.
pub struct FailingStore {
    pub inner: MemoryCollection,
    pub poison: HashSet<BsonKey>,
}

impl FailingStore {
    pub fn new(inner: MemoryCollection, poison: &[Bson]) -> Self {
        Self {
            inner,
            poison: poison.iter().map(BsonKey::new).collect(),
        }
    }
}

impl Store for FailingStore {
    fn namespace(&self) -> &Namespace {
        self.inner.namespace()
    }

    fn stream_matching<'a>(
        &'a self,
        filter: &'a Document,
        projection: Option<&'a Projection>,
        limit: Option<u64>,
    ) -> Result<DocumentStream<'a>, StoreError> {
        self.inner.stream_matching(filter, projection, limit)
    }

    fn find_one(
        &self,
        id: &Bson,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(id, projection)
    }

    fn existing_ids(&self, ids: &[Bson]) -> Result<Vec<Bson>, StoreError> {
        self.inner.existing_ids(ids)
    }

    fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteResult, StoreError> {
        let poisoned = ops
            .iter()
            .filter_map(WriteOp::id)
            .any(|id| self.poison.contains(&BsonKey::new(id)));
        if poisoned {
            return Err(StoreError::Write("socket closed mid-request".into()));
        }
        self.inner.bulk_write(ops)
    }

    fn delete_many(&self, ids: &[Bson]) -> Result<u64, StoreError> {
        self.inner.delete_many(ids)
    }

    fn update_one(&self, id: &Bson, fields: &Document) -> Result<UpdateOutcome, StoreError> {
        self.inner.update_one(id, fields)
    }
}

/// A connector whose store can never be reached.
pub struct UnreachableConnector;

impl Connector for UnreachableConnector {
    type Store = MemoryCollection;

    fn open(&self, _namespace: &Namespace) -> Result<Self::Store, StoreError> {
        Err(StoreError::Connection("server selection timed out".into()))
    }
}
