use bson::Document;
use fieldwork_pipeline::{JobError, WritePlanner};
use fieldwork_store::WriteOp;

use crate::fields::{check_path, identified};

/// Removes a fixed list of fields. Only identifiers are read.
#[derive(Debug, Clone)]
pub struct UnsetFields {
    fields: Vec<String>,
}

impl UnsetFields {
    pub fn new(fields: Vec<String>) -> Result<Self, JobError> {
        if fields.is_empty() {
            return Err(JobError::InvalidInput("no fields to remove".into()));
        }
        for field in &fields {
            check_path(field)?;
        }
        Ok(Self { fields })
    }
}

impl WritePlanner for UnsetFields {
    fn plan(&self, docs: &[Document]) -> Result<Vec<WriteOp>, JobError> {
        Ok(identified(docs)
            .map(|(id, _)| WriteOp::unset_fields(id.clone(), self.fields.iter().cloned()))
            .collect())
    }
}
