//! Job files: a YAML document with a single `job` key.

use std::path::Path;

use fieldwork_jobs::JobSpec;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFile {
    pub job: JobSpec,
}

/// Command-line values that take precedence over the job file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
}

impl JobFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Apply overrides, then validate. Jobs without batch settings ignore them.
    pub fn prepare(mut self, overrides: Overrides) -> Result<JobSpec> {
        if let Some(settings) = self.job.settings_mut() {
            if let Some(workers) = overrides.workers {
                settings.workers = Some(workers);
            }
            if let Some(batch_size) = overrides.batch_size {
                settings.batch_size = batch_size;
            }
        }
        self.job.validate()?;
        Ok(self.job)
    }
}

const SAMPLES: &[(&str, &str)] = &[
    ("add-fields", include_str!("../jobs/add-fields.yaml")),
    ("rename-fields", include_str!("../jobs/rename-fields.yaml")),
    ("unset-fields", include_str!("../jobs/unset-fields.yaml")),
    ("update-field", include_str!("../jobs/update-field.yaml")),
    ("copy-selected-fields", include_str!("../jobs/copy-selected-fields.yaml")),
    ("mark-duplicates", include_str!("../jobs/mark-duplicates.yaml")),
    ("transfer-documents", include_str!("../jobs/transfer-documents.yaml")),
    ("transfer-by-ids", include_str!("../jobs/transfer-by-ids.yaml")),
    ("copy-field-by-ids", include_str!("../jobs/copy-field-by-ids.yaml")),
    ("delete-by-ids", include_str!("../jobs/delete-by-ids.yaml")),
    ("count-documents", include_str!("../jobs/count-documents.yaml")),
    ("duplicate-analysis", include_str!("../jobs/duplicate-analysis.yaml")),
];

/// The sample job file for `kind`.
pub fn sample(kind: &str) -> Result<&'static str> {
    SAMPLES
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, yaml)| *yaml)
        .ok_or_else(|| {
            let kinds: Vec<&str> = SAMPLES.iter().map(|(k, _)| *k).collect();
            Error::UnknownKind(kind.to_string(), kinds.join(", "))
        })
}
