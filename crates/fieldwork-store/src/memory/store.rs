use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use arc_swap::ArcSwap;
use bson::oid::ObjectId;
use bson::{Bson, Document};
use fieldwork_query::{ID_FIELD, Projection, matches, parse_filter};
use imbl::OrdMap;

use crate::error::StoreError;
use crate::key::BsonKey;
use crate::op::{BulkWriteResult, OpError, UpdateOutcome, WriteOp};
use crate::store::{Connector, DocumentStream, Namespace, Store};

pub(crate) type Documents = OrdMap<BsonKey, Document>;

struct CollectionCell {
    data: ArcSwap<Documents>,
    write_lock: Mutex<()>,
}

impl CollectionCell {
    fn new() -> Self {
        Self {
            data: ArcSwap::new(Arc::new(OrdMap::new())),
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot the collection. Cheap due to imbl structural sharing.
    fn snapshot(&self) -> Documents {
        (**self.data.load()).clone()
    }

    /// Run `f` against a private copy and publish it atomically.
    fn mutate<T>(&self, f: impl FnOnce(&mut Documents) -> T) -> Result<T, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Storage(format!("write lock poisoned: {e}")))?;
        let mut data = self.snapshot();
        let out = f(&mut data);
        self.data.store(Arc::new(data));
        Ok(out)
    }
}

/// In-process document database used for tests and dry runs.
///
/// Readers stream from an immutable snapshot while writers publish new
/// versions, so a job can stream a collection it is concurrently rewriting.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<Namespace, Arc<CollectionCell>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, namespace: &Namespace) -> Result<Arc<CollectionCell>, StoreError> {
        if let Some(cell) = self
            .collections
            .read()
            .map_err(|e| StoreError::Storage(format!("catalog lock poisoned: {e}")))?
            .get(namespace)
        {
            return Ok(Arc::clone(cell));
        }
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StoreError::Storage(format!("catalog lock poisoned: {e}")))?;
        Ok(Arc::clone(
            collections
                .entry(namespace.clone())
                .or_insert_with(|| Arc::new(CollectionCell::new())),
        ))
    }

    /// Open a handle on `namespace`, creating the collection if needed.
    pub fn collection(&self, namespace: &Namespace) -> Result<MemoryCollection, StoreError> {
        Ok(MemoryCollection {
            namespace: namespace.clone(),
            cell: self.cell(namespace)?,
            closed: AtomicBool::new(false),
        })
    }

    /// Insert documents directly, bypassing the bulk path.
    pub fn seed(&self, namespace: &Namespace, docs: Vec<Document>) -> Result<(), StoreError> {
        let cell = self.cell(namespace)?;
        cell.mutate(|data| {
            for doc in docs {
                let doc = with_id(doc);
                if let Some(key) = doc.get(ID_FIELD).map(BsonKey::new) {
                    data.insert(key, doc);
                }
            }
        })
    }

    /// Every document of `namespace` in identifier order.
    pub fn documents(&self, namespace: &Namespace) -> Result<Vec<Document>, StoreError> {
        Ok(self.cell(namespace)?.snapshot().values().cloned().collect())
    }
}

impl Connector for MemoryStore {
    type Store = MemoryCollection;

    fn open(&self, namespace: &Namespace) -> Result<Self::Store, StoreError> {
        self.collection(namespace)
    }
}

pub struct MemoryCollection {
    namespace: Namespace,
    cell: Arc<CollectionCell>,
    closed: AtomicBool,
}

impl MemoryCollection {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.cell.data.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemoryCollection {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn stream_matching<'a>(
        &'a self,
        filter: &'a Document,
        projection: Option<&'a Projection>,
        limit: Option<u64>,
    ) -> Result<DocumentStream<'a>, StoreError> {
        self.ensure_open()?;
        let expr = parse_filter(filter)?;
        let limit = match limit {
            Some(0) | None => usize::MAX,
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let iter = self
            .cell
            .snapshot()
            .into_iter()
            .map(|(_, doc)| doc)
            .filter(move |doc| matches(doc, &expr))
            .take(limit)
            .map(move |doc| {
                Ok(match projection {
                    Some(p) => p.apply(&doc),
                    None => doc,
                })
            });
        Ok(Box::new(iter))
    }

    fn find_one(
        &self,
        id: &Bson,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        self.ensure_open()?;
        let data = self.cell.data.load();
        Ok(data.get(&BsonKey::new(id)).map(|doc| match projection {
            Some(p) => p.apply(doc),
            None => doc.clone(),
        }))
    }

    fn existing_ids(&self, ids: &[Bson]) -> Result<Vec<Bson>, StoreError> {
        self.ensure_open()?;
        let data = self.cell.data.load();
        Ok(ids
            .iter()
            .filter(|id| data.contains_key(&BsonKey::new(id)))
            .cloned()
            .collect())
    }

    fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteResult, StoreError> {
        self.ensure_open()?;
        self.cell.mutate(|data| {
            let mut result = BulkWriteResult {
                attempted: ops.len(),
                ..Default::default()
            };
            for (index, op) in ops.iter().enumerate() {
                match apply_op(data, op) {
                    Ok(true) => result.applied += 1,
                    Ok(false) => {}
                    Err(message) => result.errors.push(OpError { index, message }),
                }
            }
            result
        })
    }

    fn delete_many(&self, ids: &[Bson]) -> Result<u64, StoreError> {
        self.ensure_open()?;
        self.cell.mutate(|data| {
            ids.iter()
                .filter(|id| data.remove(&BsonKey::new(id)).is_some())
                .count() as u64
        })
    }

    fn update_one(&self, id: &Bson, fields: &Document) -> Result<UpdateOutcome, StoreError> {
        self.ensure_open()?;
        self.cell
            .mutate(|data| match data.get_mut(&BsonKey::new(id)) {
                None => Ok(UpdateOutcome::default()),
                Some(doc) => {
                    let mut updated = doc.clone();
                    for (path, value) in fields {
                        set_path(&mut updated, path, value.clone()).map_err(StoreError::Write)?;
                    }
                    let modified = u64::from(updated != *doc);
                    *doc = updated;
                    Ok(UpdateOutcome {
                        matched: 1,
                        modified,
                    })
                }
            })?
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Give a document an ObjectId `_id` at the front if it has none.
fn with_id(doc: Document) -> Document {
    if doc.contains_key(ID_FIELD) {
        return doc;
    }
    let mut out = Document::new();
    out.insert(ID_FIELD, ObjectId::new());
    for (key, value) in doc {
        out.insert(key, value);
    }
    out
}

/// Apply one operation. `Ok(false)` means the target did not exist.
fn apply_op(data: &mut Documents, op: &WriteOp) -> Result<bool, String> {
    match op {
        WriteOp::Insert(doc) => {
            let doc = with_id(doc.clone());
            let id = doc.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
            let key = BsonKey::new(&id);
            if data.contains_key(&key) {
                return Err(format!("duplicate key error: _id {id}"));
            }
            data.insert(key, doc);
            Ok(true)
        }
        WriteOp::ReplaceRoot { id, document } => match data.get_mut(&BsonKey::new(id)) {
            Some(existing) => {
                *existing = document.clone();
                Ok(true)
            }
            None => Ok(false),
        },
        WriteOp::SetFields { id, fields } => match data.get_mut(&BsonKey::new(id)) {
            Some(existing) => {
                let mut updated = existing.clone();
                for (path, value) in fields {
                    set_path(&mut updated, path, value.clone())?;
                }
                *existing = updated;
                Ok(true)
            }
            None => Ok(false),
        },
        WriteOp::UnsetFields { id, fields } => match data.get_mut(&BsonKey::new(id)) {
            Some(existing) => {
                for path in fields {
                    unset_path(existing, path);
                }
                Ok(true)
            }
            None => Ok(false),
        },
        WriteOp::Delete { id } => Ok(data.remove(&BsonKey::new(id)).is_some()),
    }
}

fn set_path(doc: &mut Document, path: &str, value: Bson) -> Result<(), String> {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            match entry {
                Bson::Document(sub) => set_path(sub, rest, value),
                other => Err(format!(
                    "cannot create field '{rest}' in element {{{head}: {other}}}"
                )),
            }
        }
    }
}

fn unset_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(sub)) = doc.get_mut(head) {
                unset_path(sub, rest);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn ns() -> Namespace {
        Namespace::new("db", "accounts")
    }

    #[test]
    fn set_path_creates_intermediate_documents() {
        let mut doc = doc! { "_id": 1 };
        set_path(&mut doc, "meta.flags.dup", Bson::Boolean(true)).unwrap();
        assert_eq!(doc, doc! { "_id": 1, "meta": { "flags": { "dup": true } } });
    }

    #[test]
    fn set_path_through_scalar_fails() {
        let mut doc = doc! { "_id": 1, "meta": 5 };
        assert!(set_path(&mut doc, "meta.x", Bson::Int32(1)).is_err());
    }

    #[test]
    fn seeded_documents_without_id_get_object_ids() {
        let store = MemoryStore::new();
        store.seed(&ns(), vec![doc! { "name": "a" }]).unwrap();
        let docs = store.documents(&ns()).unwrap();
        assert_eq!(docs.len(), 1);
        let first_key = docs[0].keys().next().unwrap();
        assert_eq!(first_key, "_id");
        assert!(docs[0].get_object_id("_id").is_ok());
    }

    #[test]
    fn closed_handle_rejects_reads() {
        let store = MemoryStore::new();
        let coll = store.collection(&ns()).unwrap();
        coll.close().unwrap();
        let err = coll.find_one(&Bson::Int32(1), None).unwrap_err();
        assert!(matches!(err, StoreError::Closed));
        assert!(err.is_connection());
    }

    #[test]
    fn handles_share_one_collection() {
        let store = MemoryStore::new();
        let a = store.collection(&ns()).unwrap();
        let b = store.collection(&ns()).unwrap();
        a.insert_one(doc! { "_id": 1 }).unwrap();
        assert_eq!(b.len(), 1);
    }
}
