use bson::{Bson, DateTime, Document};
use fieldwork_pipeline::{JobError, WritePlanner};
use fieldwork_store::WriteOp;

use crate::fields::{check_top_level, identified};

/// Merges fixed field values into every document and replaces it whole.
///
/// Fields that already exist keep their position and take the new value;
/// new fields are appended in configuration order.
#[derive(Debug, Clone)]
pub struct AddOrSetDefaults {
    fields: Vec<(String, Bson)>,
}

impl AddOrSetDefaults {
    pub fn new(fields: Vec<(String, Bson)>) -> Result<Self, JobError> {
        if fields.is_empty() {
            return Err(JobError::InvalidInput("no fields to add".into()));
        }
        for (name, _) in &fields {
            check_top_level(name)?;
        }
        Ok(Self { fields })
    }

    /// Also stamp `field` with `at`, the same instant for every document.
    pub fn with_timestamp(mut self, field: &str, at: DateTime) -> Result<Self, JobError> {
        check_top_level(field)?;
        self.fields.push((field.to_string(), Bson::DateTime(at)));
        Ok(self)
    }

    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = doc.clone();
        for (name, value) in &self.fields {
            out.insert(name.as_str(), value.clone());
        }
        out
    }
}

impl WritePlanner for AddOrSetDefaults {
    fn plan(&self, docs: &[Document]) -> Result<Vec<WriteOp>, JobError> {
        Ok(identified(docs)
            .map(|(id, doc)| WriteOp::replace_root(id.clone(), self.apply(doc)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn existing_fields_keep_their_position() {
        let defaults = AddOrSetDefaults::new(vec![
            ("tags".into(), Bson::Array(vec![])),
            ("status".into(), Bson::String("new".into())),
        ])
        .unwrap();
        let doc = doc! { "_id": 1, "status": "old", "name": "a" };
        let out = defaults.apply(&doc);
        assert_eq!(out, doc! { "_id": 1, "status": "new", "name": "a", "tags": [] });
        let keys: Vec<_> = out.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["_id", "status", "name", "tags"]);
    }

    #[test]
    fn timestamp_is_shared_across_documents() {
        let at = DateTime::from_millis(1_700_000_000_000);
        let defaults = AddOrSetDefaults::new(vec![("a".into(), Bson::Int32(1))])
            .unwrap()
            .with_timestamp("timestamp", at)
            .unwrap();
        let ops = defaults
            .plan(&[doc! { "_id": 1 }, doc! { "_id": 2 }])
            .unwrap();
        assert_eq!(ops.len(), 2);
        for op in ops {
            let WriteOp::ReplaceRoot { document, .. } = op else {
                panic!("expected replace");
            };
            assert_eq!(document.get_datetime("timestamp").unwrap(), &at);
        }
    }

    #[test]
    fn identifier_cannot_be_defaulted() {
        assert!(AddOrSetDefaults::new(vec![("_id".into(), Bson::Int32(1))]).is_err());
        assert!(AddOrSetDefaults::new(vec![]).is_err());
    }
}
