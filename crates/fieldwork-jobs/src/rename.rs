use std::collections::HashMap;

use bson::Document;
use fieldwork_pipeline::{JobError, WritePlanner};
use fieldwork_store::WriteOp;
use serde::{Deserialize, Serialize};

use crate::fields::{check_top_level, identified};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenameMode {
    /// Renamed fields stay where the old name was.
    #[default]
    InPlace,
    /// Renamed fields are appended after all other fields.
    MoveToEnd,
}

/// Renames top-level fields by rebuilding each document key by key.
#[derive(Debug, Clone)]
pub struct RenameFields {
    table: HashMap<String, String>,
    mode: RenameMode,
}

impl RenameFields {
    pub fn new<I>(table: I, mode: RenameMode) -> Result<Self, JobError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let table: HashMap<String, String> = table.into_iter().collect();
        if table.is_empty() {
            return Err(JobError::InvalidInput("rename table is empty".into()));
        }
        for (from, to) in &table {
            check_top_level(from)?;
            check_top_level(to)?;
        }
        Ok(Self { table, mode })
    }

    pub fn apply(&self, doc: &Document) -> Document {
        let mut out = Document::new();
        let mut moved = Vec::new();
        for (key, value) in doc {
            match (self.table.get(key), self.mode) {
                (Some(new_name), RenameMode::InPlace) => {
                    out.insert(new_name.as_str(), value.clone());
                }
                (Some(new_name), RenameMode::MoveToEnd) => moved.push((new_name, value)),
                (None, _) => {
                    out.insert(key.as_str(), value.clone());
                }
            }
        }
        for (name, value) in moved {
            out.insert(name.as_str(), value.clone());
        }
        out
    }
}

impl WritePlanner for RenameFields {
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

    fn keys(doc: &Document) -> Vec<&str> {
        doc.keys().map(String::as_str).collect()
    }

    fn rename(mode: RenameMode) -> RenameFields {
        RenameFields::new([("b".to_string(), "b2".to_string())], mode).unwrap()
    }

    #[test]
    fn in_place_keeps_position() {
        let doc = doc! { "a": 1, "b": 2, "c": 3 };
        let out = rename(RenameMode::InPlace).apply(&doc);
        assert_eq!(keys(&out), vec!["a", "b2", "c"]);
        assert_eq!(out.get_i32("b2").unwrap(), 2);
    }

    #[test]
    fn move_to_end_appends() {
        let doc = doc! { "a": 1, "b": 2, "c": 3 };
        let out = rename(RenameMode::MoveToEnd).apply(&doc);
        assert_eq!(keys(&out), vec!["a", "c", "b2"]);
    }

    #[test]
    fn documents_without_the_field_pass_through() {
        let doc = doc! { "_id": 1, "a": 1, "c": 3 };
        assert_eq!(rename(RenameMode::InPlace).apply(&doc), doc);
    }

    #[test]
    fn one_replace_per_document() {
        let docs = vec![doc! { "_id": 1, "b": 1 }, doc! { "_id": 2, "x": 1 }];
        let ops = rename(RenameMode::InPlace).plan(&docs).unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(
            ops[0],
            WriteOp::replace_root(bson::Bson::Int32(1), doc! { "_id": 1, "b2": 1 })
        );
    }

    #[test]
    fn identifier_cannot_be_renamed() {
        let table = [("_id".to_string(), "id".to_string())];
        assert!(RenameFields::new(table, RenameMode::InPlace).is_err());
    }
}
