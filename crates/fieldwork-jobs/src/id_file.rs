use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bson::Bson;
use fieldwork_pipeline::JobError;
use fieldwork_store::{IdKind, parse_id};
use tracing::info;

/// Read a newline-delimited identifier list.
///
/// Blank lines are skipped. Any other line that does not parse as `kind`
/// fails the whole file before a store is touched.
pub fn read_ids(path: &Path, kind: IdKind) -> Result<Vec<Bson>, JobError> {
    let file = File::open(path)?;
    let mut ids = Vec::new();
    for (number, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let id = parse_id(&line, kind).map_err(|e| {
            JobError::InvalidInput(format!("{}:{}: {e}", path.display(), number + 1))
        })?;
        ids.push(id);
    }
    info!(path = %path.display(), count = ids.len(), "identifiers loaded");
    Ok(ids)
}
