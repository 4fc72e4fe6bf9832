//! Field maintenance jobs: the transforms, their job descriptions and the
//! runner that wires them to stores and the batch pipeline.

mod by_ids;
mod copy;
mod defaults;
mod duplicates;
mod fields;
mod id_file;
mod job;
mod mark;
mod rename;
mod runner;
mod transfer;
mod unset;
mod update_field;

pub use by_ids::{CopyFieldByIds, DeleteByIds};
pub use copy::{CopyMode, CopySelectedFields};
pub use defaults::AddOrSetDefaults;
pub use duplicates::{
    DELETE_IDS_FILE, DUPLICATES_FILE, DuplicateGroup, DuplicateIndex, DuplicateStats,
    ReportPaths, STATS_FILE, TOP_VALUES, id_text, load_documents, value_label, write_report,
};
pub use id_file::read_ids;
pub use job::{FieldValue, JobSpec, Settings, filter_document, json_to_bson};
pub use mark::{DEFAULT_FLAG_FIELD, MarkDuplicates, ReferenceSet};
pub use rename::{RenameFields, RenameMode};
pub use runner::Runner;
pub use transfer::{TransferByIds, TransferDocuments, TransferMode};
pub use unset::UnsetFields;
pub use update_field::UpdateField;
