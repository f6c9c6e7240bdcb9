//! Analysis runs: merge both families, assemble the workbook, track the run
//!
//! A run owns everything it touches (tables, workbook, output path), so
//! separate runs can proceed on separate threads without coordination.

pub mod merge;
pub mod validate;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::models::{FileFamily, Project, RunStatus, UploadedFile};
use crate::db::RunStore;
use crate::error::ConsolidationError;
use crate::importers::ReaderOptions;
use crate::reports::{self, PlannedSheet};
use crate::taxonomy::Taxonomy;

pub use merge::{merge_family, FamilyMerge, MergedSection, SectionOutcome, SectionStatus};
pub use validate::{ValidationLabel, ValidationTally};

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub reader: ReaderOptions,
    pub output_dir: PathBuf,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        RunOptions {
            reader: config.reader_options(),
            output_dir: config.output_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySummary {
    pub family: FileFamily,
    pub files_processed: usize,
    pub sheets_created: usize,
    pub total_records: usize,
    pub total_anomalies: usize,
    pub outcomes: Vec<SectionOutcome>,
}

impl FamilySummary {
    fn from_merge(merge: &FamilyMerge) -> Self {
        FamilySummary {
            family: merge.family,
            files_processed: merge.files_processed,
            sheets_created: merge.sections.len(),
            total_records: merge.total_records(),
            total_anomalies: merge.total_anomalies(),
            outcomes: merge.outcomes.clone(),
        }
    }
}

/// Result of a successful run, also persisted as the run's summary JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub status: RunStatus,
    pub families: Vec<FamilySummary>,
    pub sheets: Vec<PlannedSheet>,
    pub output_file_name: String,
    pub output_path: PathBuf,
}

impl RunSummary {
    pub fn family(&self, family: FileFamily) -> Option<&FamilySummary> {
        self.families.iter().find(|f| f.family == family)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Do the actual work of a run: merge, assemble and save.
///
/// Pure with respect to storage; a misconfigured taxonomy or a failed save is
/// an error, unreadable inputs are not.
pub fn execute(
    project: &Project,
    uploads: &[UploadedFile],
    run_id: &str,
    opts: &RunOptions,
) -> Result<RunSummary> {
    let taxonomies = FileFamily::all().map(Taxonomy::for_family);
    for taxonomy in &taxonomies {
        taxonomy.validate()?;
    }

    let merges: Vec<FamilyMerge> = taxonomies
        .iter()
        .map(|taxonomy| merge_family(taxonomy, uploads, &opts.reader))
        .collect();

    let mut report = reports::assemble(&merges).context("Failed to assemble report")?;
    let output_file_name =
        reports::output_file_name(&project.gstin, &project.financial_year, run_id);
    let output_path =
        reports::save_atomic(&mut report.workbook, &opts.output_dir, &output_file_name)?;

    info!(
        "Run {}: {} data sheet(s) written to {}",
        run_id,
        report.sheets.len(),
        output_path.display()
    );

    Ok(RunSummary {
        run_id: run_id.to_string(),
        status: RunStatus::Completed,
        families: merges.iter().map(FamilySummary::from_merge).collect(),
        sheets: report.sheets,
        output_file_name,
        output_path,
    })
}

/// Start and drive a run to a terminal state.
///
/// Nothing is recorded when the project has no uploads. Otherwise the run goes
/// pending -> processing -> completed, or -> failed with the error message.
pub fn start_analysis<S: RunStore>(
    store: &S,
    project_id: &str,
    opts: &RunOptions,
) -> Result<RunSummary> {
    let project = store
        .project(project_id)?
        .ok_or_else(|| ConsolidationError::ProjectNotFound(project_id.to_string()))?;
    let uploads = store.uploads(&project.id)?;
    if uploads.is_empty() {
        return Err(ConsolidationError::NoUploads(project.name.clone()).into());
    }

    let run_id = Uuid::new_v4().to_string();
    store.create_run(&run_id, &project.id)?;
    store.mark_processing(&run_id)?;
    info!(
        "Run {} started for {} ({} upload(s))",
        run_id,
        project.name,
        uploads.len()
    );

    let outcome = execute(&project, &uploads, &run_id, opts).and_then(|summary| {
        let json = serde_json::to_string(&summary).context("Failed to serialize run summary")?;
        Ok((summary, json))
    });
    match outcome {
        Ok((summary, json)) => {
            store.complete_run(&run_id, &summary.output_file_name, &summary.output_path, &json)?;
            Ok(summary)
        }
        Err(e) => {
            let message = format!("{:#}", e);
            warn!("Run {} failed: {}", run_id, message);
            store.fail_run(&run_id, &message)?;
            Err(e.context(format!("analysis run {} failed", run_id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> RunOptions {
        RunOptions {
            reader: ReaderOptions::default(),
            output_dir: dir.path().join("outputs"),
        }
    }

    #[test]
    fn test_project_without_uploads_creates_no_run() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().unwrap();
        let project = store.create_project("Empty", "27ABCDE1234F1Z5", "2021-22").unwrap();

        let err = start_analysis(&store, &project.id, &options(&dir)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConsolidationError>(),
            Some(ConsolidationError::NoUploads(_))
        ));
        assert!(store.list_runs(&project.id).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_project_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().unwrap();
        let err = start_analysis(&store, "ghost", &options(&dir)).unwrap_err();
        assert!(err.to_string().contains("project not found"));
    }

    #[test]
    fn test_failed_save_marks_run_failed() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().unwrap();
        let project = store.create_project("Acme", "27ABCDE1234F1Z5", "2021-22").unwrap();
        store
            .record_upload(&UploadedFile {
                id: "u1".to_string(),
                project_id: project.id.clone(),
                family: FileFamily::A,
                month: 4,
                year: 2021,
                original_name: "missing.xlsx".to_string(),
                locator: dir.path().join("missing.xlsx"),
                size: 0,
            })
            .unwrap();

        // a regular file where the output directory should be
        let blocked = dir.path().join("outputs");
        std::fs::write(&blocked, "not a directory").unwrap();

        let err = start_analysis(&store, &project.id, &options(&dir)).unwrap_err();
        assert!(format!("{:#}", err).contains("analysis run"));

        let runs = store.list_runs(&project.id).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert!(runs[0].error_message.is_some());
        assert!(runs[0].output_path.is_none());
    }

    #[test]
    fn test_unreadable_upload_still_completes_with_index_only() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::in_memory().unwrap();
        let project = store.create_project("Acme", "27ABCDE1234F1Z5", "2021-22").unwrap();
        store
            .record_upload(&UploadedFile {
                id: "u1".to_string(),
                project_id: project.id.clone(),
                family: FileFamily::B,
                month: 4,
                year: 2021,
                original_name: "broken.xlsx".to_string(),
                locator: dir.path().join("broken.xlsx"),
                size: 0,
            })
            .unwrap();
        std::fs::write(dir.path().join("broken.xlsx"), "garbage").unwrap();

        let summary = start_analysis(&store, &project.id, &options(&dir)).unwrap();
        assert!(summary.sheets.is_empty());
        assert!(summary.output_path.exists());
        let b = summary.family(FileFamily::B).unwrap();
        assert_eq!(b.files_processed, 1);
        assert!(b.outcomes.iter().all(|o| o.status == SectionStatus::Error));

        let run = store.run(&summary.run_id).unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        let stored: RunSummary = serde_json::from_str(run.summary_json.as_deref().unwrap()).unwrap();
        assert_eq!(stored, summary);
    }
}
