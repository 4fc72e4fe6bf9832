use std::collections::HashSet;

use bson::{Bson, Document, doc};
use fieldwork_pipeline::{JobError, WritePlanner};
use fieldwork_query::{Projection, get_path};
use fieldwork_store::{BsonKey, Store, WriteOp};
use tracing::info;

use crate::fields::{check_path, identified};

pub const DEFAULT_FLAG_FIELD: &str = "duplicated";

/// Distinct values of one field across a reference collection.
#[derive(Debug, Default, Clone)]
pub struct ReferenceSet {
    values: HashSet<BsonKey>,
}

impl ReferenceSet {
    /// Stream `field` from every document of `store`.
    pub fn load<S: Store + ?Sized>(store: &S, field: &str) -> Result<Self, JobError> {
        let projection = Projection::new([field]);
        let filter = doc! {};
        let mut set = Self::default();
        for doc in store.stream_matching(&filter, Some(&projection), None)? {
            let doc = doc?;
            if let Some(value) = get_path(&doc, field) {
                set.values.insert(BsonKey::new(value));
            }
        }
        info!(
            collection = %store.namespace(),
            field,
            unique = set.len(),
            "reference values loaded"
        );
        Ok(set)
    }

    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Bson>) -> Self {
        Self {
            values: values.into_iter().map(BsonKey::new).collect(),
        }
    }

    pub fn contains(&self, value: &Bson) -> bool {
        self.values.contains(&BsonKey::new(value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Flags documents whose comparison field occurs in a [`ReferenceSet`].
///
/// Non-matching documents produce no operation at all.
#[derive(Debug, Clone)]
pub struct MarkDuplicates {
    field: String,
    flag_field: String,
    reference: ReferenceSet,
}

impl MarkDuplicates {
    pub fn new(field: &str, flag_field: &str, reference: ReferenceSet) -> Result<Self, JobError> {
        check_path(field)?;
        check_path(flag_field)?;
        Ok(Self {
            field: field.to_string(),
            flag_field: flag_field.to_string(),
            reference,
        })
    }
}

impl WritePlanner for MarkDuplicates {
    fn plan(&self, docs: &[Document]) -> Result<Vec<WriteOp>, JobError> {
        Ok(identified(docs)
            .filter(|(_, doc)| {
                get_path(doc, &self.field).is_some_and(|value| self.reference.contains(value))
            })
            .map(|(id, _)| {
                let mut flag = Document::new();
                flag.insert(self.flag_field.as_str(), true);
                WriteOp::set_fields(id.clone(), flag)
            })
            .collect())
    }
}
