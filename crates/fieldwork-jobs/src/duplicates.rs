use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use bson::{Bson, Document};
use fieldwork_pipeline::JobError;
use fieldwork_query::{ID_FIELD, get_path};
use fieldwork_store::BsonKey;
use serde_json::Value;
use tracing::{info, warn};

pub const DUPLICATES_FILE: &str = "duplicates.json";
pub const DELETE_IDS_FILE: &str = "duplicated_ids_to_delete.txt";
pub const STATS_FILE: &str = "stats.txt";
pub const TOP_VALUES: usize = 10;

/// Identifiers sharing one field value, in the order they were encountered.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub value: Bson,
    pub ids: Vec<Bson>,
}

impl DuplicateGroup {
    /// The identifier that is kept.
    pub fn survivor(&self) -> &Bson {
        &self.ids[0]
    }

    /// Every identifier after the survivor.
    pub fn to_delete(&self) -> &[Bson] {
        &self.ids[1..]
    }

    pub fn is_duplicated(&self) -> bool {
        self.ids.len() > 1
    }
}

/// Field value to identifier groups, built once over a loaded document list.
///
/// Values compare the way the database compares them, so `1` and `1.0`
/// land in the same group. Documents with a missing or null value are
/// counted but not indexed.
#[derive(Debug)]
pub struct DuplicateIndex {
    field: String,
    total: usize,
    groups: Vec<DuplicateGroup>,
}

impl DuplicateIndex {
    pub fn build<'a, I>(field: &str, docs: I) -> Result<Self, JobError>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let mut groups: Vec<DuplicateGroup> = Vec::new();
        let mut positions: HashMap<BsonKey, usize> = HashMap::new();
        let mut total = 0;
        for (n, doc) in docs.into_iter().enumerate() {
            total += 1;
            let value = match get_path(doc, field) {
                None | Some(Bson::Null) => continue,
                Some(value) => value,
            };
            let id = doc.get(ID_FIELD).cloned().ok_or_else(|| {
                JobError::InvalidInput(format!("document {n} has no {ID_FIELD}"))
            })?;
            let key = BsonKey::new(value);
            match positions.get(&key) {
                Some(&pos) => groups[pos].ids.push(id),
                None => {
                    positions.insert(key, groups.len());
                    groups.push(DuplicateGroup {
                        value: value.clone(),
                        ids: vec![id],
                    });
                }
            }
        }
        Ok(Self {
            field: field.to_string(),
            total,
            groups,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn total_documents(&self) -> usize {
        self.total
    }

    pub fn unique_values(&self) -> usize {
        self.groups.len()
    }

    pub fn group(&self, value: &Bson) -> Option<&DuplicateGroup> {
        let key = BsonKey::new(value);
        self.groups.iter().find(|g| BsonKey::new(&g.value) == key)
    }

    pub fn duplicate_groups(&self) -> impl Iterator<Item = &DuplicateGroup> {
        self.groups.iter().filter(|g| g.is_duplicated())
    }

    pub fn delete_candidates(&self) -> Vec<&Bson> {
        self.duplicate_groups()
            .flat_map(|g| g.to_delete().iter())
            .collect()
    }

    pub fn stats(&self) -> DuplicateStats {
        let mut ranked: Vec<&DuplicateGroup> = self.duplicate_groups().collect();
        // Stable, so ties keep first-encounter order.
        ranked.sort_by(|a, b| b.ids.len().cmp(&a.ids.len()));
        DuplicateStats {
            total_documents: self.total,
            unique_values: self.groups.len(),
            duplicate_groups: ranked.len(),
            duplicated_ids: ranked.iter().map(|g| g.ids.len()).sum(),
            delete_candidates: ranked.iter().map(|g| g.ids.len() - 1).sum(),
            top: ranked
                .iter()
                .take(TOP_VALUES)
                .map(|g| (value_label(&g.value), g.ids.len()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateStats {
    pub total_documents: usize,
    pub unique_values: usize,
    pub duplicate_groups: usize,
    pub duplicated_ids: usize,
    pub delete_candidates: usize,
    /// Most duplicated values with their group sizes, largest first.
    pub top: Vec<(String, usize)>,
}

impl DuplicateStats {
    pub fn render(&self, field: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Total documents: {}", self.total_documents);
        let _ = writeln!(out, "Unique {field} values: {}", self.unique_values);
        let _ = writeln!(out, "Duplicated {field} entries: {}", self.duplicate_groups);
        let _ = writeln!(out, "Total duplicated IDs: {}", self.duplicated_ids);
        let _ = writeln!(out, "Total IDs to delete: {}", self.delete_candidates);
        let _ = writeln!(out, "Top {TOP_VALUES} most duplicated values:");
        for (value, count) in &self.top {
            let _ = writeln!(out, "  {value} ({count} times)");
        }
        out
    }
}

/// Text used for a field value in reports and JSON object keys.
pub fn value_label(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Text used for an identifier in the delete-candidate list.
pub fn id_text(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// Load a JSON array of documents. Extended JSON values such as
/// `{"$oid": ...}` are decoded into their BSON types.
pub fn load_documents(path: &Path) -> Result<Vec<Document>, JobError> {
    let raw = fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&raw)
        .map_err(|e| JobError::InvalidInput(format!("{}: {e}", path.display())))?;
    let Value::Array(items) = value else {
        return Err(JobError::InvalidInput(
            "input JSON must be a list of documents".into(),
        ));
    };
    let docs = items
        .into_iter()
        .enumerate()
        .map(|(n, item)| match Bson::try_from(item) {
            Ok(Bson::Document(doc)) => Ok(doc),
            Ok(_) => Err(JobError::InvalidInput(format!("element {n} is not a document"))),
            Err(e) => Err(JobError::InvalidInput(format!("element {n}: {e}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(path = %path.display(), count = docs.len(), "documents loaded");
    Ok(docs)
}

/// Files written by [`write_report`].
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub duplicates: PathBuf,
    pub delete_ids: PathBuf,
    pub stats: PathBuf,
}

/// Write the duplicate groups, delete candidates and statistics into `dir`.
pub fn write_report(index: &DuplicateIndex, dir: &Path) -> Result<ReportPaths, JobError> {
    fs::create_dir_all(dir)?;
    let paths = ReportPaths {
        duplicates: dir.join(DUPLICATES_FILE),
        delete_ids: dir.join(DELETE_IDS_FILE),
        stats: dir.join(STATS_FILE),
    };

    let mut groups = serde_json::Map::new();
    for group in index.duplicate_groups() {
        let ids = group
            .ids
            .iter()
            .map(|id| id.clone().into_relaxed_extjson())
            .collect();
        let key = group_key(&groups, &group.value);
        groups.insert(key, Value::Array(ids));
    }
    let json = serde_json::to_string_pretty(&Value::Object(groups))
        .map_err(|e| JobError::InvalidInput(e.to_string()))?;
    fs::write(&paths.duplicates, json)?;
    info!(path = %paths.duplicates.display(), "duplicate groups saved");

    let mut delete_ids = String::new();
    for id in index.delete_candidates() {
        delete_ids.push_str(&id_text(id));
        delete_ids.push('\n');
    }
    fs::write(&paths.delete_ids, delete_ids)?;
    info!(path = %paths.delete_ids.display(), "delete candidates saved");

    fs::write(&paths.stats, index.stats().render(index.field()))?;
    info!(path = %paths.stats.display(), "statistics saved");
    Ok(paths)
}

/// Object key for a group in the duplicates file.
///
/// Distinct values can share a label (`"1"` and `1`). A taken label falls
/// back to canonical extended JSON, then to a numbered suffix.
fn group_key(taken: &serde_json::Map<String, Value>, value: &Bson) -> String {
    let label = value_label(value);
    if !taken.contains_key(&label) {
        return label;
    }
    let canonical = value.clone().into_canonical_extjson().to_string();
    warn!(label = %label, key = %canonical, "duplicate group label already used");
    if !taken.contains_key(&canonical) {
        return canonical;
    }
    (2..)
        .map(|n| format!("{canonical} #{n}"))
        .find(|key| !taken.contains_key(key))
        .unwrap_or(canonical)
}
