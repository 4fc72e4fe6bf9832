use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached or refused the credentials.
    Connection(String),
    /// A read was rejected (bad filter, cursor failure).
    Query(String),
    /// A write request as a whole was rejected.
    Write(String),
    /// An identifier could not be parsed into the store's native type.
    InvalidId(String),
    /// The handle was used after `close`.
    Closed,
    Storage(String),
}

impl StoreError {
    /// Connection-level failures abort a job; everything else is absorbed per batch.
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_) | StoreError::Closed)
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "connection error: {msg}"),
            StoreError::Query(msg) => write!(f, "query error: {msg}"),
            StoreError::Write(msg) => write!(f, "write error: {msg}"),
            StoreError::InvalidId(msg) => write!(f, "invalid identifier: {msg}"),
            StoreError::Closed => write!(f, "store handle already closed"),
            StoreError::Storage(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<fieldwork_query::FilterParseError> for StoreError {
    fn from(e: fieldwork_query::FilterParseError) -> Self {
        StoreError::Query(e.to_string())
    }
}
