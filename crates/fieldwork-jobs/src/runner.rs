use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use bson::{Bson, DateTime};
use fieldwork_pipeline::{
    BulkApply, JobConfig, JobDriver, JobError, JobReport, JobState, ProgressSink,
};
use fieldwork_query::Projection;
use fieldwork_store::{Connector, IdKind};
use tracing::info;

use crate::by_ids::{CopyFieldByIds, DeleteByIds};
use crate::copy::CopySelectedFields;
use crate::duplicates::{DuplicateIndex, load_documents, write_report};
use crate::id_file::read_ids;
use crate::mark::{MarkDuplicates, ReferenceSet};
use crate::job::{
    JobSpec, Settings, defaults_planner, filter_document, rename_planner, update_planner,
};
use crate::transfer::{TransferByIds, TransferDocuments};
use crate::unset::UnsetFields;

/// Runs [`JobSpec`]s against stores opened through one connector.
///
/// `Err` is returned only for problems found before any store is touched:
/// an invalid job, an unreadable identifier list or analysis input. Once a
/// connection has been attempted the outcome is always a [`JobReport`],
/// which may be in the `Failed` state.
pub struct Runner<'c, C: Connector + ?Sized> {
    connector: &'c C,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl<'c, C: Connector + ?Sized> Runner<'c, C> {
    pub fn new(connector: &'c C) -> Self {
        Self {
            connector,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    fn driver(&self, config: JobConfig) -> JobDriver {
        let driver = JobDriver::new(config);
        match &self.progress {
            Some(sink) => driver.with_progress(Arc::clone(sink)),
            None => driver,
        }
    }

    pub fn run(&self, spec: &JobSpec) -> Result<JobReport, JobError> {
        spec.validate()?;
        let kind = spec.kind();
        info!(job = kind, "starting job");
        // One timestamp per run, shared by every document it touches.
        let now = DateTime::now();

        match spec {
            JobSpec::AddFields {
                namespace,
                filter,
                fields,
                timestamp_field,
                settings,
            } => {
                let planner = defaults_planner(fields, timestamp_field.as_deref(), now)?;
                let config = settings.job_config(kind, filter_document(filter.as_ref())?);
                let mut driver = self.driver(config);
                let Ok(store) = driver.open(self.connector, namespace) else {
                    return Ok(driver.report());
                };
                Ok(driver.run_query(&*store, &BulkApply::new(planner, &*store)))
            }
            JobSpec::RenameFields {
                namespace,
                filter,
                rename,
                mode,
                settings,
            } => {
                let planner = rename_planner(rename, *mode)?;
                let config = settings.job_config(kind, filter_document(filter.as_ref())?);
                let mut driver = self.driver(config);
                let Ok(store) = driver.open(self.connector, namespace) else {
                    return Ok(driver.report());
                };
                Ok(driver.run_query(&*store, &BulkApply::new(planner, &*store)))
            }
            JobSpec::UnsetFields {
                namespace,
                filter,
                fields,
                settings,
            } => {
                let planner = UnsetFields::new(fields.clone())?;
                let config = settings
                    .job_config(kind, filter_document(filter.as_ref())?)
                    .with_projection(Projection::id_only());
                let mut driver = self.driver(config);
                let Ok(store) = driver.open(self.connector, namespace) else {
                    return Ok(driver.report());
                };
                Ok(driver.run_query(&*store, &BulkApply::new(planner, &*store)))
            }
            JobSpec::UpdateField {
                namespace,
                filter,
                field,
                value,
                timestamp_field,
                settings,
            } => {
                let planner = update_planner(field, value, timestamp_field.as_deref(), now)?;
                let config = settings
                    .job_config(kind, filter_document(filter.as_ref())?)
                    .with_projection(Projection::id_only());
                let mut driver = self.driver(config);
                let Ok(store) = driver.open(self.connector, namespace) else {
                    return Ok(driver.report());
                };
                Ok(driver.run_query(&*store, &BulkApply::new(planner, &*store)))
            }
            JobSpec::CopySelectedFields {
                source,
                target,
                filter,
                fields,
                mode,
                settings,
            } => {
                let config = settings
                    .job_config(kind, filter_document(filter.as_ref())?)
                    .with_projection(Projection::new(fields.iter().cloned()));
                let mut driver = self.driver(config);
                let Ok(source) = driver.open(self.connector, source) else {
                    return Ok(driver.report());
                };
                let Ok(target) = driver.open(self.connector, target) else {
                    return Ok(driver.report());
                };
                let task = CopySelectedFields::new(fields.clone(), *mode, &*target)?;
                Ok(driver.run_query(&*source, &task))
            }
            JobSpec::MarkDuplicates {
                source,
                reference,
                field,
                flag_field,
                filter,
                settings,
            } => {
                let config = settings
                    .job_config(kind, filter_document(filter.as_ref())?)
                    .with_projection(Projection::new([field.as_str()]));
                let mut driver = self.driver(config);
                let values = {
                    let Ok(reference) = driver.open(self.connector, reference) else {
                        return Ok(driver.report());
                    };
                    match ReferenceSet::load(&*reference, field) {
                        Ok(values) => values,
                        Err(e) => {
                            driver.fail(&e);
                            return Ok(driver.report());
                        }
                    }
                };
                let planner = MarkDuplicates::new(field, flag_field, values)?;
                let Ok(source) = driver.open(self.connector, source) else {
                    return Ok(driver.report());
                };
                Ok(driver.run_query(&*source, &BulkApply::new(planner, &*source)))
            }
            JobSpec::TransferDocuments {
                source,
                target,
                filter,
                mode,
                settings,
            } => {
                let filter = filter_document(filter.as_ref())?;
                let mut driver = self.driver(settings.job_config(kind, filter));
                let Ok(source) = driver.open(self.connector, source) else {
                    return Ok(driver.report());
                };
                let Ok(target) = driver.open(self.connector, target) else {
                    return Ok(driver.report());
                };
                let task = TransferDocuments::new(&*source, &*target, *mode);
                Ok(driver.run_query(&*source, &task))
            }
            JobSpec::TransferByIds {
                source,
                target,
                ids_file,
                id_kind,
                mode,
                settings,
            } => {
                let ids = load_ids(ids_file, *id_kind, settings)?;
                let mut driver = self.driver(settings.job_config(kind, Default::default()));
                let Ok(source) = driver.open(self.connector, source) else {
                    return Ok(driver.report());
                };
                let Ok(target) = driver.open(self.connector, target) else {
                    return Ok(driver.report());
                };
                let total = ids.len() as u64;
                let task = TransferByIds::new(&*source, &*target, *mode);
                Ok(driver.run_items(ids, Some(total), &task))
            }
            JobSpec::CopyFieldByIds {
                source,
                target,
                ids_file,
                id_kind,
                field,
                retry,
                settings,
            } => {
                let ids = load_ids(ids_file, *id_kind, settings)?;
                let mut driver = self.driver(settings.job_config(kind, Default::default()));
                let Ok(source) = driver.open(self.connector, source) else {
                    return Ok(driver.report());
                };
                let Ok(target) = driver.open(self.connector, target) else {
                    return Ok(driver.report());
                };
                let total = ids.len() as u64;
                let task = CopyFieldByIds::new(&*source, &*target, field, *retry)?;
                Ok(driver.run_items(ids, Some(total), &task))
            }
            JobSpec::DeleteByIds {
                namespace,
                ids_file,
                id_kind,
                settings,
            } => {
                let ids = load_ids(ids_file, *id_kind, settings)?;
                let mut driver = self.driver(settings.job_config(kind, Default::default()));
                let Ok(store) = driver.open(self.connector, namespace) else {
                    return Ok(driver.report());
                };
                let total = ids.len() as u64;
                Ok(driver.run_items(ids, Some(total), &DeleteByIds::new(&*store)))
            }
            JobSpec::CountDocuments { namespace, filter } => {
                let config = JobConfig::new(kind).with_filter(filter_document(filter.as_ref())?);
                let mut driver = self.driver(config);
                let Ok(store) = driver.open(self.connector, namespace) else {
                    return Ok(driver.report());
                };
                Ok(driver.count(&*store))
            }
            JobSpec::DuplicateAnalysis {
                input,
                output_dir,
                field,
            } => analyze_duplicates(kind, input, output_dir, field),
        }
    }
}

fn load_ids(path: &Path, kind: IdKind, settings: &Settings) -> Result<Vec<Bson>, JobError> {
    let mut ids = read_ids(path, kind)?;
    if let Some(limit) = settings.limit.filter(|&l| l > 0) {
        ids.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        info!(path = %path.display(), limit, "identifier list truncated");
    }
    Ok(ids)
}

/// Offline analysis of an exported JSON array; no store is involved.
fn analyze_duplicates(
    kind: &str,
    input: &Path,
    output_dir: &Path,
    field: &str,
) -> Result<JobReport, JobError> {
    let started = Instant::now();
    let docs = load_documents(input)?;
    let index = DuplicateIndex::build(field, &docs)?;
    let paths = write_report(&index, output_dir)?;
    let stats = index.stats();
    info!(
        job = kind,
        documents = stats.total_documents,
        unique = stats.unique_values,
        duplicated = stats.duplicate_groups,
        to_delete = stats.delete_candidates,
        stats = %paths.stats.display(),
        "duplicate analysis written"
    );
    let total = docs.len() as u64;
    Ok(JobReport {
        job: kind.to_string(),
        state: JobState::Completed,
        total: Some(total),
        processed: total,
        attempted: total,
        batches: 0,
        failed_batches: 0,
        elapsed: started.elapsed(),
        error: None,
    })
}
