use std::ops::Range;
use std::sync::OnceLock;

use bson::{Bson, Document, doc};
use fieldwork_query::{ID_FIELD, Projection};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::{FindOneOptions, FindOptions, InsertManyOptions};
use mongodb::sync::{Client, Collection, Database};
use tracing::{debug, info, warn};

use super::config::MongoConfig;
use crate::error::StoreError;
use crate::op::{BulkWriteResult, OpError, UpdateOutcome, WriteOp};
use crate::store::{Connector, DocumentStream, Namespace, Store};

/// Server-side cursor batch size for streaming reads.
const CURSOR_BATCH_SIZE: u32 = 1000;

/// Room left in a write command for everything but its statements.
const COMMAND_RESERVE: usize = 16 * 1024;
/// Array key and type byte added to each statement inside the command.
const ARRAY_ENTRY_OVERHEAD: usize = 8;

const RETRYABLE_WRITE_ERROR: &str = "RetryableWriteError";

fn classify(e: MongoError) -> StoreError {
    match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::Authentication { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => StoreError::Connection(e.to_string()),
        ErrorKind::Write(_) | ErrorKind::BulkWrite(_) => StoreError::Write(e.to_string()),
        _ => StoreError::Query(e.to_string()),
    }
}

fn is_retryable(e: &MongoError) -> bool {
    e.contains_label(RETRYABLE_WRITE_ERROR)
        || matches!(
            e.kind.as_ref(),
            ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. }
        )
}

/// Per-command write caps advertised by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WriteLimits {
    max_count: usize,
    max_bytes: usize,
}

impl Default for WriteLimits {
    fn default() -> Self {
        Self {
            max_count: 100_000,
            max_bytes: 16 * 1024 * 1024,
        }
    }
}

impl WriteLimits {
    fn from_hello(reply: &Document) -> Self {
        let defaults = Self::default();
        let read = |key: &str, fallback: usize| match count_field(reply, key) {
            0 => fallback,
            n => usize::try_from(n).unwrap_or(fallback),
        };
        Self {
            max_count: read("maxWriteBatchSize", defaults.max_count),
            max_bytes: read("maxBsonObjectSize", defaults.max_bytes),
        }
    }
}

/// Split statements of the given encoded sizes into runs that each fit one
/// write command. A statement too large for any command travels alone.
fn split_statements(sizes: &[usize], limits: WriteLimits) -> Vec<Range<usize>> {
    let budget = limits.max_bytes.saturating_sub(COMMAND_RESERVE);
    let max_count = limits.max_count.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut bytes = 0;
    for (i, size) in sizes.iter().enumerate() {
        let size = size + ARRAY_ENTRY_OVERHEAD;
        if i > start && (i - start >= max_count || bytes + size > budget) {
            chunks.push(start..i);
            start = i;
            bytes = 0;
        }
        bytes += size;
    }
    if start < sizes.len() {
        chunks.push(start..sizes.len());
    }
    chunks
}

/// Opens collections over one shared client, built on first use.
pub struct MongoConnector {
    config: MongoConfig,
    shared: OnceLock<(Client, WriteLimits)>,
}

impl MongoConnector {
    pub fn new(config: MongoConfig) -> Self {
        Self {
            config,
            shared: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<(Client, WriteLimits), StoreError> {
        if let Some(shared) = self.shared.get() {
            return Ok(shared.clone());
        }
        debug!(uri = %self.config.redacted_uri(), "connecting to mongodb");
        let connect_err = |e: MongoError| StoreError::Connection(e.to_string());
        let client = Client::with_uri_str(self.config.uri()).map_err(connect_err)?;
        let admin = client.database("admin");
        // The driver connects lazily; ping so bad hosts fail here.
        admin
            .run_command(doc! { "ping": 1 }, None)
            .map_err(connect_err)?;
        let limits = match admin.run_command(doc! { "hello": 1 }, None) {
            Ok(reply) => WriteLimits::from_hello(&reply),
            Err(e) => {
                warn!(error = %e, "hello failed, using default write limits");
                WriteLimits::default()
            }
        };
        info!(
            max_write_batch = limits.max_count,
            max_bson_bytes = limits.max_bytes,
            "mongodb client initialized"
        );
        // A concurrent caller may have won the race; keep whichever landed first.
        Ok(self.shared.get_or_init(|| (client, limits)).clone())
    }
}

impl Connector for MongoConnector {
    type Store = MongoCollection;

    fn open(&self, namespace: &Namespace) -> Result<Self::Store, StoreError> {
        let (client, limits) = self.client()?;
        let database = client.database(&namespace.database);
        let collection = database.collection::<Document>(&namespace.collection);
        debug!(namespace = %namespace, "opened mongodb collection");
        Ok(MongoCollection {
            namespace: namespace.clone(),
            database,
            collection,
            limits,
        })
    }
}

/// One collection on a MongoDB deployment.
///
/// Inserts go through the driver's unordered `insert_many`. Updates and
/// deletes are raw `update`/`delete` commands with `ordered: false`, split to
/// the server's batch limits, so that one bad operation never blocks the rest.
pub struct MongoCollection {
    namespace: Namespace,
    database: Database,
    collection: Collection<Document>,
    limits: WriteLimits,
}

impl MongoCollection {
    fn insert_unordered(
        &self,
        docs: &[&Document],
        indices: &[usize],
        result: &mut BulkWriteResult,
    ) -> Result<(), StoreError> {
        let mut options = InsertManyOptions::default();
        options.ordered = Some(false);
        match self.collection.insert_many(docs.iter().copied(), options) {
            Ok(inserted) => {
                result.applied += inserted.inserted_ids.len();
                Ok(())
            }
            Err(e) => {
                let ErrorKind::BulkWrite(failure) = e.kind.as_ref() else {
                    return Err(classify(e));
                };
                let write_errors = failure.write_errors.as_deref().unwrap_or_default();
                result.applied += docs.len().saturating_sub(write_errors.len());
                for error in write_errors {
                    let index = indices.get(error.index).copied().unwrap_or(error.index);
                    result.errors.push(OpError {
                        index,
                        message: error.message.clone(),
                    });
                }
                if let Some(concern) = &failure.write_concern_error {
                    warn!(
                        namespace = %self.namespace,
                        error = %concern.message,
                        "write concern error"
                    );
                }
                Ok(())
            }
        }
    }

    /// Run `statements` as one or more `verb` commands. A chunk the server
    /// rejects outright marks each of its operations failed.
    fn write_statements(
        &self,
        verb: &str,
        list: &str,
        statements: Vec<Document>,
        indices: &[usize],
        result: &mut BulkWriteResult,
    ) -> Result<(), StoreError> {
        let sizes = statements
            .iter()
            .map(|s| bson::to_vec(s).map(|bytes| bytes.len()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Write(e.to_string()))?;
        let chunks = split_statements(&sizes, self.limits);
        if chunks.len() > 1 {
            debug!(
                verb,
                statements = statements.len(),
                commands = chunks.len(),
                "split write"
            );
        }
        for chunk in chunks {
            let mut command = Document::new();
            command.insert(verb, self.namespace.collection.as_str());
            command.insert(
                list,
                statements[chunk.clone()]
                    .iter()
                    .cloned()
                    .map(Bson::Document)
                    .collect::<Vec<_>>(),
            );
            command.insert("ordered", false);
            let chunk_indices = &indices[chunk];
            match self.run_write(command) {
                Ok(response) => self.record_response(&response, chunk_indices, result),
                Err(e) if e.is_connection() => return Err(e),
                Err(e) => {
                    warn!(
                        verb,
                        error = %e,
                        operations = chunk_indices.len(),
                        "write command rejected"
                    );
                    result.errors.extend(chunk_indices.iter().map(|&index| OpError {
                        index,
                        message: e.to_string(),
                    }));
                }
            }
        }
        Ok(())
    }

    // Statements are idempotent by `_id`, so one resend after a retryable
    // failure cannot double-apply.
    fn run_write(&self, command: Document) -> Result<Document, StoreError> {
        match self.database.run_command(command.clone(), None) {
            Err(e) if is_retryable(&e) => {
                warn!(namespace = %self.namespace, error = %e, "retrying write command");
                self.database.run_command(command, None).map_err(classify)
            }
            other => other.map_err(classify),
        }
    }

    fn record_response(
        &self,
        response: &Document,
        indices: &[usize],
        result: &mut BulkWriteResult,
    ) {
        result.applied += usize::try_from(count_field(response, "n")).unwrap_or(0);
        if let Ok(errors) = response.get_array("writeErrors") {
            for error in errors {
                let Bson::Document(error) = error else { continue };
                let local = usize::try_from(count_field(error, "index")).unwrap_or(0);
                let message = error
                    .get_str("errmsg")
                    .unwrap_or("unknown write error")
                    .to_string();
                let index = indices.get(local).copied().unwrap_or(local);
                result.errors.push(OpError { index, message });
            }
        }
        if let Ok(concern) = response.get_document("writeConcernError") {
            warn!(namespace = %self.namespace, error = %concern, "write concern error");
        }
    }
}

fn count_field(doc: &Document, key: &str) -> u64 {
    match doc.get(key) {
        Some(Bson::Int32(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Int64(n)) => u64::try_from(*n).unwrap_or(0),
        Some(Bson::Double(n)) if *n >= 0.0 => *n as u64,
        _ => 0,
    }
}

fn update_statement(op: &WriteOp) -> Option<Document> {
    match op {
        WriteOp::ReplaceRoot { id, document } => Some(doc! {
            "q": { ID_FIELD: id.clone() },
            "u": document.clone(),
        }),
        WriteOp::SetFields { id, fields } => Some(doc! {
            "q": { ID_FIELD: id.clone() },
            "u": { "$set": fields.clone() },
        }),
        WriteOp::UnsetFields { id, fields } => {
            let mut unset = Document::new();
            for field in fields {
                unset.insert(field.as_str(), "");
            }
            Some(doc! {
                "q": { ID_FIELD: id.clone() },
                "u": { "$unset": unset },
            })
        }
        WriteOp::Insert(_) | WriteOp::Delete { .. } => None,
    }
}

impl Store for MongoCollection {
    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn stream_matching<'a>(
        &'a self,
        filter: &'a Document,
        projection: Option<&'a Projection>,
        limit: Option<u64>,
    ) -> Result<DocumentStream<'a>, StoreError> {
        let mut options = FindOptions::default();
        options.projection = projection.map(Projection::to_document);
        options.limit = limit.and_then(|l| i64::try_from(l).ok());
        options.batch_size = Some(CURSOR_BATCH_SIZE);
        let cursor = self
            .collection
            .find(filter.clone(), options)
            .map_err(classify)?;
        Ok(Box::new(cursor.map(|doc| doc.map_err(classify))))
    }

    fn find_one(
        &self,
        id: &Bson,
        projection: Option<&Projection>,
    ) -> Result<Option<Document>, StoreError> {
        let mut options = FindOneOptions::default();
        options.projection = projection.map(Projection::to_document);
        self.collection
            .find_one(doc! { ID_FIELD: id.clone() }, options)
            .map_err(classify)
    }

    fn existing_ids(&self, ids: &[Bson]) -> Result<Vec<Bson>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.collection
            .distinct(ID_FIELD, doc! { ID_FIELD: { "$in": ids.to_vec() } }, None)
            .map_err(classify)
    }

    fn bulk_write(&self, ops: &[WriteOp]) -> Result<BulkWriteResult, StoreError> {
        let mut result = BulkWriteResult {
            attempted: ops.len(),
            ..Default::default()
        };

        let mut inserts = Vec::new();
        let mut insert_idx = Vec::new();
        let mut updates = Vec::new();
        let mut update_idx = Vec::new();
        let mut deletes = Vec::new();
        let mut delete_idx = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            match op {
                WriteOp::Insert(document) => {
                    inserts.push(document);
                    insert_idx.push(index);
                }
                WriteOp::Delete { id } => {
                    deletes.push(doc! { "q": { ID_FIELD: id.clone() }, "limit": 1 });
                    delete_idx.push(index);
                }
                other => {
                    if let Some(statement) = update_statement(other) {
                        updates.push(statement);
                        update_idx.push(index);
                    }
                }
            }
        }

        if !inserts.is_empty() {
            self.insert_unordered(&inserts, &insert_idx, &mut result)?;
        }
        if !updates.is_empty() {
            self.write_statements("update", "updates", updates, &update_idx, &mut result)?;
        }
        if !deletes.is_empty() {
            self.write_statements("delete", "deletes", deletes, &delete_idx, &mut result)?;
        }
        result.errors.sort_by_key(|e| e.index);
        Ok(result)
    }

    fn delete_many(&self, ids: &[Bson]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self
            .collection
            .delete_many(doc! { ID_FIELD: { "$in": ids.to_vec() } }, None)
            .map_err(classify)?;
        Ok(deleted.deleted_count)
    }

    fn update_one(&self, id: &Bson, fields: &Document) -> Result<UpdateOutcome, StoreError> {
        let updated = self
            .collection
            .update_one(
                doc! { ID_FIELD: id.clone() },
                doc! { "$set": fields.clone() },
                None,
            )
            .map_err(classify)?;
        Ok(UpdateOutcome {
            matched: updated.matched_count,
            modified: updated.modified_count,
        })
    }

    fn close(&self) -> Result<(), StoreError> {
        // The sync client shuts its pool down when the last handle drops.
        debug!(namespace = %self.namespace, "releasing mongodb client");
        Ok(())
    }
}
