use bson::{Bson, Document};
use fieldwork_query::ID_FIELD;

/// A single write against one collection, keyed by identifier.
///
/// Constructed by batch transforms, consumed by the bulk writer. None of the
/// variants can change a document's `_id`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Insert(Document),
    ReplaceRoot { id: Bson, document: Document },
    SetFields { id: Bson, fields: Document },
    UnsetFields { id: Bson, fields: Vec<String> },
    Delete { id: Bson },
}

impl WriteOp {
    pub fn insert(document: Document) -> Self {
        WriteOp::Insert(document)
    }

    /// Replace the whole document. The identifier is forced back to `id`
    /// at the front of the replacement.
    pub fn replace_root(id: Bson, document: Document) -> Self {
        let mut replacement = Document::new();
        replacement.insert(ID_FIELD, id.clone());
        for (key, value) in document {
            if key != ID_FIELD {
                replacement.insert(key, value);
            }
        }
        WriteOp::ReplaceRoot {
            id,
            document: replacement,
        }
    }

    pub fn set_fields(id: Bson, mut fields: Document) -> Self {
        fields.remove(ID_FIELD);
        WriteOp::SetFields { id, fields }
    }

    pub fn unset_fields<I, S>(id: Bson, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(Into::into)
            .filter(|f: &String| f != ID_FIELD)
            .collect();
        WriteOp::UnsetFields { id, fields }
    }

    pub fn delete(id: Bson) -> Self {
        WriteOp::Delete { id }
    }

    /// Identifier this operation targets, if it already has one.
    pub fn id(&self) -> Option<&Bson> {
        match self {
            WriteOp::Insert(doc) => doc.get(ID_FIELD),
            WriteOp::ReplaceRoot { id, .. }
            | WriteOp::SetFields { id, .. }
            | WriteOp::UnsetFields { id, .. }
            | WriteOp::Delete { id } => Some(id),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteOp::Insert(_) => "insert",
            WriteOp::ReplaceRoot { .. } => "replace",
            WriteOp::SetFields { .. } => "set",
            WriteOp::UnsetFields { .. } => "unset",
            WriteOp::Delete { .. } => "delete",
        }
    }
}

/// A rejected operation inside a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct OpError {
    /// Position of the operation in the submitted list.
    pub index: usize,
    pub message: String,
}

/// Outcome of one unordered bulk request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub attempted: usize,
    /// Operations the store confirms as applied (inserted, matched, or deleted).
    pub applied: usize,
    pub errors: Vec<OpError>,
}

impl BulkWriteResult {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty() && self.applied == self.attempted
    }
}

/// Outcome of a single-document update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
}
