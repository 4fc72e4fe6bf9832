use bson::{Bson, Document};
use fieldwork_pipeline::JobError;
use fieldwork_query::ID_FIELD;
use tracing::warn;

/// Pair each document with its identifier, skipping (and logging) any
/// document that has none.
pub(crate) fn identified(docs: &[Document]) -> impl Iterator<Item = (&Bson, &Document)> {
    docs.iter().filter_map(|doc| match doc.get(ID_FIELD) {
        Some(id) => Some((id, doc)),
        None => {
            warn!("document without {ID_FIELD} skipped");
            None
        }
    })
}

/// Reject field names a whole-document transform cannot safely target.
pub(crate) fn check_top_level(field: &str) -> Result<(), JobError> {
    if field.is_empty() {
        return Err(JobError::InvalidInput("field name must not be empty".into()));
    }
    if field == ID_FIELD {
        return Err(JobError::InvalidInput(format!("{ID_FIELD} cannot be modified")));
    }
    if field.contains('.') {
        return Err(JobError::InvalidInput(format!(
            "'{field}' must be a top-level field name"
        )));
    }
    Ok(())
}

/// Reject field paths that are empty or address the identifier.
pub(crate) fn check_path(field: &str) -> Result<(), JobError> {
    if field.is_empty() || field.split('.').any(str::is_empty) {
        return Err(JobError::InvalidInput(format!("invalid field path '{field}'")));
    }
    if field == ID_FIELD || field.starts_with("_id.") {
        return Err(JobError::InvalidInput(format!("{ID_FIELD} cannot be modified")));
    }
    Ok(())
}
