use bson::{Bson, DateTime, Document};
use fieldwork_pipeline::{JobError, WritePlanner};
use fieldwork_store::WriteOp;

use crate::fields::{check_path, identified};

/// Sets one field to a fixed value on every selected document.
#[derive(Debug, Clone)]
pub struct UpdateField {
    fields: Document,
}

impl UpdateField {
    pub fn new(field: &str, value: Bson) -> Result<Self, JobError> {
        check_path(field)?;
        let mut fields = Document::new();
        fields.insert(field, value);
        Ok(Self { fields })
    }

    pub fn with_timestamp(mut self, field: &str, at: DateTime) -> Result<Self, JobError> {
        check_path(field)?;
        self.fields.insert(field, at);
        Ok(self)
    }
}

impl WritePlanner for UpdateField {
    fn plan(&self, docs: &[Document]) -> Result<Vec<WriteOp>, JobError> {
        Ok(identified(docs)
            .map(|(id, _)| WriteOp::set_fields(id.clone(), self.fields.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn sets_value_and_timestamp() {
        let at = DateTime::from_millis(0);
        let update = UpdateField::new("status", Bson::String("done".into()))
            .unwrap()
            .with_timestamp("updated_at", at)
            .unwrap();
        let ops = update.plan(&[doc! { "_id": "a" }]).unwrap();
        assert_eq!(
            ops,
            vec![WriteOp::set_fields(
                Bson::String("a".into()),
                doc! { "status": "done", "updated_at": at }
            )]
        );
    }
}
