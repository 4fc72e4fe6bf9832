#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use bson::{Bson, Document};
use fieldwork_jobs::JobSpec;
use fieldwork_store::{Connector, MemoryCollection, MemoryStore, Namespace, StoreError};

pub fn source() -> Namespace {
    Namespace::new("crm", "accounts")
}

pub fn target() -> Namespace {
    Namespace::new("crm", "archive")
}

pub fn store_with(namespace: &Namespace, docs: Vec<Document>) -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(namespace, docs).unwrap();
    store
}

pub fn ids(store: &MemoryStore, namespace: &Namespace) -> Vec<Bson> {
    store
        .documents(namespace)
        .unwrap()
        .into_iter()
        .filter_map(|d| d.get("_id").cloned())
        .collect()
}

pub fn find(store: &MemoryStore, namespace: &Namespace, id: i32) -> Option<Document> {
    store
        .documents(namespace)
        .unwrap()
        .into_iter()
        .find(|d| d.get("_id") == Some(&Bson::Int32(id)))
}

pub fn job(yaml: &str) -> JobSpec {
    serde_yaml::from_str(yaml).unwrap()
}

/// Write one identifier per line into `dir/name`.
pub fn write_ids(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

pub struct UnreachableConnector;

impl Connector for UnreachableConnector {
    type Store = MemoryCollection;

    fn open(&self, _namespace: &Namespace) -> Result<Self::Store, StoreError> {
        Err(StoreError::Connection("connection refused".into()))
    }
}
