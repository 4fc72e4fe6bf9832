use std::collections::BTreeMap;
use std::path::PathBuf;

use bson::{Bson, Document};
use fieldwork_pipeline::{JobConfig, JobError};
use fieldwork_store::{IdKind, Namespace, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::copy::CopyMode;
use crate::defaults::AddOrSetDefaults;
use crate::fields::check_path;
use crate::mark::DEFAULT_FLAG_FIELD;
use crate::rename::{RenameFields, RenameMode};
use crate::transfer::TransferMode;
use crate::unset::UnsetFields;
use crate::update_field::UpdateField;

fn default_batch_size() -> usize {
    JobConfig::DEFAULT_BATCH_SIZE
}

fn default_flag_field() -> String {
    DEFAULT_FLAG_FIELD.to_string()
}

/// Pipeline settings shared by every batched job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Defaults to one worker per available core.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub limit: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: None,
            limit: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), JobError> {
        if self.batch_size == 0 {
            return Err(JobError::InvalidInput("batch_size must be greater than zero".into()));
        }
        if self.workers == Some(0) {
            return Err(JobError::InvalidInput("workers must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn job_config(&self, name: &str, filter: Document) -> JobConfig {
        let config = JobConfig::new(name)
            .with_filter(filter)
            .with_batch_size(self.batch_size)
            .with_limit(self.limit);
        match self.workers {
            Some(workers) => config.with_workers(workers),
            None => config,
        }
    }
}

/// One default value to merge into documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field: String,
    /// Extended JSON, so `{"$date": ...}` and `{"$oid": ...}` work.
    pub value: Value,
}

/// A complete job description, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobSpec {
    AddFields {
        namespace: Namespace,
        #[serde(default)]
        filter: Option<Value>,
        fields: Vec<FieldValue>,
        #[serde(default)]
        timestamp_field: Option<String>,
        #[serde(flatten)]
        settings: Settings,
    },
    RenameFields {
        namespace: Namespace,
        #[serde(default)]
        filter: Option<Value>,
        rename: BTreeMap<String, String>,
        #[serde(default)]
        mode: RenameMode,
        #[serde(flatten)]
        settings: Settings,
    },
    UnsetFields {
        namespace: Namespace,
        #[serde(default)]
        filter: Option<Value>,
        fields: Vec<String>,
        #[serde(flatten)]
        settings: Settings,
    },
    UpdateField {
        namespace: Namespace,
        #[serde(default)]
        filter: Option<Value>,
        field: String,
        value: Value,
        #[serde(default)]
        timestamp_field: Option<String>,
        #[serde(flatten)]
        settings: Settings,
    },
    CopySelectedFields {
        source: Namespace,
        target: Namespace,
        #[serde(default)]
        filter: Option<Value>,
        fields: Vec<String>,
        #[serde(default)]
        mode: CopyMode,
        #[serde(flatten)]
        settings: Settings,
    },
    MarkDuplicates {
        source: Namespace,
        reference: Namespace,
        field: String,
        #[serde(default = "default_flag_field")]
        flag_field: String,
        #[serde(default)]
        filter: Option<Value>,
        #[serde(flatten)]
        settings: Settings,
    },
    TransferDocuments {
        source: Namespace,
        target: Namespace,
        #[serde(default)]
        filter: Option<Value>,
        #[serde(default)]
        mode: TransferMode,
        #[serde(flatten)]
        settings: Settings,
    },
    TransferByIds {
        source: Namespace,
        target: Namespace,
        ids_file: PathBuf,
        #[serde(default)]
        id_kind: IdKind,
        #[serde(default)]
        mode: TransferMode,
        #[serde(flatten)]
        settings: Settings,
    },
    CopyFieldByIds {
        source: Namespace,
        target: Namespace,
        ids_file: PathBuf,
        #[serde(default)]
        id_kind: IdKind,
        field: String,
        #[serde(default)]
        retry: RetryPolicy,
        #[serde(flatten)]
        settings: Settings,
    },
    DeleteByIds {
        namespace: Namespace,
        ids_file: PathBuf,
        #[serde(default)]
        id_kind: IdKind,
        #[serde(flatten)]
        settings: Settings,
    },
    CountDocuments {
        namespace: Namespace,
        #[serde(default)]
        filter: Option<Value>,
    },
    DuplicateAnalysis {
        input: PathBuf,
        output_dir: PathBuf,
        field: String,
    },
}

impl JobSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            JobSpec::AddFields { .. } => "add-fields",
            JobSpec::RenameFields { .. } => "rename-fields",
            JobSpec::UnsetFields { .. } => "unset-fields",
            JobSpec::UpdateField { .. } => "update-field",
            JobSpec::CopySelectedFields { .. } => "copy-selected-fields",
            JobSpec::MarkDuplicates { .. } => "mark-duplicates",
            JobSpec::TransferDocuments { .. } => "transfer-documents",
            JobSpec::TransferByIds { .. } => "transfer-by-ids",
            JobSpec::CopyFieldByIds { .. } => "copy-field-by-ids",
            JobSpec::DeleteByIds { .. } => "delete-by-ids",
            JobSpec::CountDocuments { .. } => "count-documents",
            JobSpec::DuplicateAnalysis { .. } => "duplicate-analysis",
        }
    }

    pub fn settings(&self) -> Option<&Settings> {
        match self {
            JobSpec::AddFields { settings, .. }
            | JobSpec::RenameFields { settings, .. }
            | JobSpec::UnsetFields { settings, .. }
            | JobSpec::UpdateField { settings, .. }
            | JobSpec::CopySelectedFields { settings, .. }
            | JobSpec::MarkDuplicates { settings, .. }
            | JobSpec::TransferDocuments { settings, .. }
            | JobSpec::TransferByIds { settings, .. }
            | JobSpec::CopyFieldByIds { settings, .. }
            | JobSpec::DeleteByIds { settings, .. } => Some(settings),
            JobSpec::CountDocuments { .. } | JobSpec::DuplicateAnalysis { .. } => None,
        }
    }

    pub fn settings_mut(&mut self) -> Option<&mut Settings> {
        match self {
            JobSpec::AddFields { settings, .. }
            | JobSpec::RenameFields { settings, .. }
            | JobSpec::UnsetFields { settings, .. }
            | JobSpec::UpdateField { settings, .. }
            | JobSpec::CopySelectedFields { settings, .. }
            | JobSpec::MarkDuplicates { settings, .. }
            | JobSpec::TransferDocuments { settings, .. }
            | JobSpec::TransferByIds { settings, .. }
            | JobSpec::CopyFieldByIds { settings, .. }
            | JobSpec::DeleteByIds { settings, .. } => Some(settings),
            JobSpec::CountDocuments { .. } | JobSpec::DuplicateAnalysis { .. } => None,
        }
    }

    /// The largest worker count this job may use.
    pub fn workers(&self) -> usize {
        self.settings()
            .and_then(|s| s.workers)
            .unwrap_or_else(fieldwork_pipeline::default_workers)
    }

    /// Check everything that can be checked without touching a store or file.
    pub fn validate(&self) -> Result<(), JobError> {
        if let Some(settings) = self.settings() {
            settings.validate()?;
        }
        match self {
            JobSpec::AddFields {
                filter,
                fields,
                timestamp_field,
                ..
            } => {
                filter_document(filter.as_ref())?;
                defaults_planner(fields, timestamp_field.as_deref(), bson::DateTime::now())?;
            }
            JobSpec::RenameFields {
                filter, rename, mode, ..
            } => {
                filter_document(filter.as_ref())?;
                rename_planner(rename, *mode)?;
            }
            JobSpec::UnsetFields { filter, fields, .. } => {
                filter_document(filter.as_ref())?;
                UnsetFields::new(fields.clone())?;
            }
            JobSpec::UpdateField {
                filter,
                field,
                value,
                timestamp_field,
                ..
            } => {
                filter_document(filter.as_ref())?;
                update_planner(field, value, timestamp_field.as_deref(), bson::DateTime::now())?;
            }
            JobSpec::CopySelectedFields { filter, fields, .. } => {
                filter_document(filter.as_ref())?;
                if fields.iter().all(|f| f == fieldwork_query::ID_FIELD) {
                    return Err(JobError::InvalidInput(
                        "field allow-list must not be empty".into(),
                    ));
                }
                for field in fields {
                    check_path(field)?;
                }
            }
            JobSpec::MarkDuplicates {
                field,
                flag_field,
                filter,
                ..
            } => {
                filter_document(filter.as_ref())?;
                check_path(field)?;
                check_path(flag_field)?;
            }
            JobSpec::TransferDocuments { filter, .. } | JobSpec::CountDocuments { filter, .. } => {
                filter_document(filter.as_ref())?;
            }
            JobSpec::CopyFieldByIds { field, retry, .. } => {
                check_path(field)?;
                if retry.attempts == 0 {
                    return Err(JobError::InvalidInput("retry.attempts must be at least 1".into()));
                }
            }
            JobSpec::TransferByIds { .. } | JobSpec::DeleteByIds { .. } => {}
            JobSpec::DuplicateAnalysis { field, .. } => {
                if field.is_empty() {
                    return Err(JobError::InvalidInput("field must not be empty".into()));
                }
            }
        }
        Ok(())
    }
}

/// Convert an extended JSON value to BSON.
pub fn json_to_bson(value: &Value) -> Result<Bson, JobError> {
    Bson::try_from(value.clone()).map_err(|e| JobError::InvalidInput(format!("{value}: {e}")))
}

/// A missing filter selects every document.
pub fn filter_document(filter: Option<&Value>) -> Result<Document, JobError> {
    match filter {
        None | Some(Value::Null) => Ok(Document::new()),
        Some(value) => match json_to_bson(value)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(JobError::InvalidInput(format!(
                "filter must be an object, got {other}"
            ))),
        },
    }
}

pub(crate) fn defaults_planner(
    fields: &[FieldValue],
    timestamp_field: Option<&str>,
    now: bson::DateTime,
) -> Result<AddOrSetDefaults, JobError> {
    let pairs = fields
        .iter()
        .map(|f| Ok((f.field.clone(), json_to_bson(&f.value)?)))
        .collect::<Result<Vec<_>, JobError>>()?;
    let planner = AddOrSetDefaults::new(pairs)?;
    match timestamp_field {
        Some(field) => planner.with_timestamp(field, now),
        None => Ok(planner),
    }
}

pub(crate) fn rename_planner(
    rename: &BTreeMap<String, String>,
    mode: RenameMode,
) -> Result<RenameFields, JobError> {
    RenameFields::new(
        rename.iter().map(|(from, to)| (from.clone(), to.clone())),
        mode,
    )
}

pub(crate) fn update_planner(
    field: &str,
    value: &Value,
    timestamp_field: Option<&str>,
    now: bson::DateTime,
) -> Result<UpdateField, JobError> {
    let planner = UpdateField::new(field, json_to_bson(value)?)?;
    match timestamp_field {
        Some(ts) => planner.with_timestamp(ts, now),
        None => Ok(planner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn parse(yaml: &str) -> JobSpec {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn rename_job_with_defaults() {
        let spec = parse(
            r#"
kind: rename-fields
namespace: { database: crm, collection: accounts }
filter: { old_name: { $exists: true } }
rename: { old_name: new_name }
"#,
        );
        assert_eq!(spec.kind(), "rename-fields");
        assert_eq!(spec.settings(), Some(&Settings::default()));
        let JobSpec::RenameFields { filter, mode, .. } = &spec else {
            panic!("wrong variant");
        };
        assert_eq!(*mode, RenameMode::InPlace);
        assert_eq!(
            filter_document(filter.as_ref()).unwrap(),
            doc! { "old_name": { "$exists": true } }
        );
        spec.validate().unwrap();
    }

    #[test]
    fn flattened_settings_are_read() {
        let spec = parse(
            r#"
kind: transfer-documents
source: { database: a, collection: in }
target: { database: b, collection: out }
mode: move
batch_size: 50
workers: 3
limit: 1000
"#,
        );
        let settings = spec.settings().unwrap();
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.workers, Some(3));
        assert_eq!(settings.limit, Some(1000));
        assert_eq!(spec.workers(), 3);
        let JobSpec::TransferDocuments { mode, .. } = spec else {
            panic!("wrong variant");
        };
        assert_eq!(mode, TransferMode::Move);
    }

    #[test]
    fn extended_json_values_convert() {
        let value: Value = serde_json::json!({ "$oid": "65f0c0ffee0000000000000a" });
        assert!(matches!(json_to_bson(&value).unwrap(), Bson::ObjectId(_)));
        let filter = serde_json::json!({ "created": { "$gte": { "$date": "2024-01-01T00:00:00Z" } } });
        let doc = filter_document(Some(&filter)).unwrap();
        let created = doc.get_document("created").unwrap();
        assert!(matches!(created.get("$gte"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn non_object_filter_is_rejected() {
        let filter = serde_json::json!([1, 2]);
        assert!(filter_document(Some(&filter)).is_err());
    }

    #[test]
    fn validation_catches_bad_jobs() {
        let zero_batch = parse(
            r#"
kind: unset-fields
namespace: { database: a, collection: b }
fields: [tmp]
batch_size: 0
"#,
        );
        assert!(zero_batch.validate().is_err());

        let empty_copy = parse(
            r#"
kind: copy-selected-fields
source: { database: a, collection: b }
target: { database: a, collection: c }
fields: []
"#,
        );
        assert!(empty_copy.validate().is_err());

        let rename_id = parse(
            r#"
kind: rename-fields
namespace: { database: a, collection: b }
rename: { _id: id }
"#,
        );
        assert!(rename_id.validate().is_err());
    }

    #[test]
    fn id_jobs_default_to_object_ids() {
        let spec = parse(
            r#"
kind: copy-field-by-ids
source: { database: a, collection: b }
target: { database: a, collection: c }
ids_file: data/ids.txt
field: price
"#,
        );
        let JobSpec::CopyFieldByIds { id_kind, retry, .. } = &spec else {
            panic!("wrong variant");
        };
        assert_eq!(*id_kind, IdKind::ObjectId);
        assert_eq!(*retry, RetryPolicy::default());
        spec.validate().unwrap();
    }

    #[test]
    fn mark_duplicates_flag_defaults() {
        let spec = parse(
            r#"
kind: mark-duplicates
source: { database: a, collection: b }
reference: { database: a, collection: c }
field: url
"#,
        );
        let JobSpec::MarkDuplicates { flag_field, .. } = &spec else {
            panic!("wrong variant");
        };
        assert_eq!(flag_field, "duplicated");
    }
}
