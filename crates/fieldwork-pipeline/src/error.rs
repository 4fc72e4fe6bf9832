use std::fmt;

use fieldwork_store::StoreError;

#[derive(Debug)]
pub enum JobError {
    Store(StoreError),
    /// Configuration or input file that cannot be processed at all.
    InvalidInput(String),
    Io(std::io::Error),
    /// A batch transform gave up on its batch.
    Transform(String),
}

impl JobError {
    /// Whether this error should abort the whole job.
    pub fn is_connection(&self) -> bool {
        matches!(self, JobError::Store(e) if e.is_connection())
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Store(e) => write!(f, "store error: {e}"),
            JobError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            JobError::Io(e) => write!(f, "io error: {e}"),
            JobError::Transform(msg) => write!(f, "transform error: {msg}"),
        }
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            JobError::Store(e) => Some(e),
            JobError::Io(e) => Some(e),
            JobError::InvalidInput(_) | JobError::Transform(_) => None,
        }
    }
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        JobError::Store(e)
    }
}

impl From<std::io::Error> for JobError {
    fn from(e: std::io::Error) -> Self {
        JobError::Io(e)
    }
}
