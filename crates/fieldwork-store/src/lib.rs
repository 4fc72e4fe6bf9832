mod connection;
mod error;
mod key;
mod op;
mod retry;
mod store;

pub use connection::Connection;
pub use error::StoreError;
pub use key::{BsonKey, IdKind, parse_id};
pub use op::{BulkWriteResult, OpError, UpdateOutcome, WriteOp};
pub use retry::{RetryPolicy, update_with_retry};
pub use store::{Connector, DocumentStream, Namespace, Store};

#[cfg(feature = "memory")]
mod memory;

#[cfg(feature = "memory")]
pub use memory::{MemoryCollection, MemoryStore};

#[cfg(feature = "mongodb")]
mod mongo;

#[cfg(feature = "mongodb")]
pub use mongo::{MongoCollection, MongoConfig, MongoConnector};
