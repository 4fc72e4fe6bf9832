use std::path::PathBuf;

use fieldwork_pipeline::{JobError, JobState};
use fieldwork_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid job file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unknown job kind {0:?}, expected one of: {1}")]
    UnknownKind(String, String),

    #[error("job {job} ended {state}")]
    Unfinished { job: String, state: JobState },
}

pub type Result<T> = std::result::Result<T, Error>;
