use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::ID_FIELD;
use crate::eval::get_path;

/// A read-time field allow-list.
///
/// `_id` is always retained. Dot paths keep the nested value under the same
/// nested shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    fields: Vec<String>,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for field in fields {
            let field = field.into();
            if field != ID_FIELD && !out.contains(&field) {
                out.push(field);
            }
        }
        Self { fields: out }
    }

    /// Projection that keeps only the identifier.
    pub fn id_only() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Render as a database projection document (`{ field: 1, ... }`).
    pub fn to_document(&self) -> Document {
        let mut out = Document::new();
        out.insert(ID_FIELD, 1);
        for field in &self.fields {
            out.insert(field.clone(), 1);
        }
        out
    }

    /// Apply to an in-memory document, preserving the source field order.
    pub fn apply(&self, source: &Document) -> Document {
        let mut out = Document::new();
        for (key, value) in source {
            if key == ID_FIELD || self.fields.iter().any(|f| f == key) {
                out.insert(key.clone(), value.clone());
                continue;
            }
            let prefix = format!("{key}.");
            let nested: Vec<&str> = self
                .fields
                .iter()
                .filter_map(|f| f.strip_prefix(prefix.as_str()))
                .collect();
            if nested.is_empty() {
                continue;
            }
            if let Bson::Document(sub) = value {
                let sub_projection = Projection {
                    fields: nested.iter().map(|s| s.to_string()).collect(),
                };
                let projected = sub_projection.apply_without_id(sub);
                if !projected.is_empty() {
                    out.insert(key.clone(), projected);
                }
            }
        }
        out
    }

    fn apply_without_id(&self, source: &Document) -> Document {
        let mut out = Document::new();
        for field in &self.fields {
            if let Some(value) = get_path(source, field) {
                insert_path(&mut out, field, value.clone());
            }
        }
        out
    }
}

fn insert_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            if let Bson::Document(sub) = entry {
                insert_path(sub, rest, value);
            }
        }
    }
}
