// Database module - SQLite storage for projects, uploads and analysis runs

pub mod models;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ConsolidationError;
pub use models::{FileFamily, Project, RunRecord, RunStatus, UploadedFile};

/// Storage collaborator used by the run orchestrator
pub trait RunStore {
    fn project(&self, project_id: &str) -> Result<Option<Project>>;
    fn uploads(&self, project_id: &str) -> Result<Vec<UploadedFile>>;
    /// Create a run in `pending`
    fn create_run(&self, run_id: &str, project_id: &str) -> Result<RunRecord>;
    fn mark_processing(&self, run_id: &str) -> Result<()>;
    fn complete_run(
        &self,
        run_id: &str,
        output_file_name: &str,
        output_path: &Path,
        summary_json: &str,
    ) -> Result<()>;
    fn fail_run(&self, run_id: &str, message: &str) -> Result<()>;
    fn run(&self, run_id: &str) -> Result<Option<RunRecord>>;
}

/// Open database connection
pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn =
        Connection::open(path).context(format!("Failed to open database at {:?}", path))?;

    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("Failed to enable foreign keys")?;

    Ok(conn)
}

/// Create tables and indexes if missing
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(include_str!("schema.sql"))
        .context("Failed to execute schema")?;
    Ok(())
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, message.into())
}

fn project_from_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        gstin: row.get(2)?,
        financial_year: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn upload_from_row(row: &rusqlite::Row) -> rusqlite::Result<UploadedFile> {
    let family: String = row.get(2)?;
    Ok(UploadedFile {
        id: row.get(0)?,
        project_id: row.get(1)?,
        family: family
            .parse::<FileFamily>()
            .map_err(|_| conversion_error(2, format!("unknown family '{}'", family)))?,
        month: row.get(3)?,
        year: row.get(4)?,
        original_name: row.get(5)?,
        locator: PathBuf::from(row.get::<_, String>(6)?),
        size: row.get::<_, i64>(7)?.max(0) as u64,
    })
}

fn run_from_row(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
    let status: String = row.get(2)?;
    Ok(RunRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        status: status
            .parse::<RunStatus>()
            .map_err(|_| conversion_error(2, format!("unknown run status '{}'", status)))?,
        output_file_name: row.get(3)?,
        output_path: row.get::<_, Option<String>>(4)?.map(PathBuf::from),
        summary_json: row.get(5)?,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

const PROJECT_COLUMNS: &str = "id, name, gstin, financial_year, created_at";
const UPLOAD_COLUMNS: &str = "id, project_id, family, month, year, original_name, locator, size";
const RUN_COLUMNS: &str = "id, project_id, status, output_file_name, output_path, summary_json, \
                           error_message, created_at, completed_at";

/// `RunStore` over a SQLite database
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_db(path)?;
        init_schema(&conn)?;
        debug!("Opened store at {:?}", path);
        Ok(SqliteStore { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        init_schema(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn create_project(&self, name: &str, gstin: &str, financial_year: &str) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            gstin: gstin.trim().to_ascii_uppercase(),
            financial_year: financial_year.trim().to_string(),
            created_at: Utc::now(),
        };
        self.conn
            .execute(
                "INSERT INTO projects (id, name, gstin, financial_year, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    project.id,
                    project.name,
                    project.gstin,
                    project.financial_year,
                    project.created_at
                ],
            )
            .with_context(|| format!("Failed to create project '{}'", project.name))?;
        info!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM projects ORDER BY created_at, name",
            PROJECT_COLUMNS
        ))?;
        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Look a project up by id or, failing that, by name
    pub fn find_project(&self, id_or_name: &str) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM projects WHERE id = ?1 OR name = ?1 ORDER BY id = ?1 DESC LIMIT 1",
                    PROJECT_COLUMNS
                ),
                [id_or_name],
                project_from_row,
            )
            .optional()?;
        Ok(project)
    }

    /// Like `find_project`, but a missing project is an error
    pub fn require_project(&self, id_or_name: &str) -> Result<Project> {
        self.find_project(id_or_name)?
            .ok_or_else(|| ConsolidationError::ProjectNotFound(id_or_name.to_string()).into())
    }

    /// Store an upload, replacing any earlier one for the same family and month.
    ///
    /// Returns the record that was replaced, if any.
    pub fn record_upload(&self, upload: &UploadedFile) -> Result<Option<UploadedFile>> {
        let previous = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM uploads
                     WHERE project_id = ?1 AND family = ?2 AND month = ?3 AND year = ?4",
                    UPLOAD_COLUMNS
                ),
                params![
                    upload.project_id,
                    upload.family.as_str(),
                    upload.month,
                    upload.year
                ],
                upload_from_row,
            )
            .optional()?;

        self.conn.execute(
            "INSERT INTO uploads
                (id, project_id, family, month, year, original_name, locator, size, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (project_id, family, month, year) DO UPDATE SET
                id = excluded.id,
                original_name = excluded.original_name,
                locator = excluded.locator,
                size = excluded.size,
                uploaded_at = excluded.uploaded_at",
            params![
                upload.id,
                upload.project_id,
                upload.family.as_str(),
                upload.month,
                upload.year,
                upload.original_name,
                upload.locator.to_string_lossy(),
                upload.size as i64,
                Utc::now(),
            ],
        )?;

        if let Some(old) = &previous {
            info!(
                "Replaced {} upload for {:02}/{}: {} -> {}",
                upload.family, upload.month, upload.year, old.original_name, upload.original_name
            );
        }
        Ok(previous)
    }

    pub fn list_runs(&self, project_id: &str) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM analysis_runs WHERE project_id = ?1 ORDER BY created_at DESC",
            RUN_COLUMNS
        ))?;
        let runs = stmt
            .query_map([project_id], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Check a status change against the run state machine
    fn check_transition(&self, run_id: &str, next: RunStatus) -> Result<()> {
        let current = self
            .run(run_id)?
            .ok_or_else(|| ConsolidationError::DbError(format!("run {} not found", run_id)))?
            .status;
        if !current.can_transition_to(next) {
            return Err(ConsolidationError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl RunStore for SqliteStore {
    fn project(&self, project_id: &str) -> Result<Option<Project>> {
        self.find_project(project_id)
    }

    fn uploads(&self, project_id: &str) -> Result<Vec<UploadedFile>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM uploads WHERE project_id = ?1 ORDER BY uploaded_at, rowid",
            UPLOAD_COLUMNS
        ))?;
        let uploads = stmt
            .query_map([project_id], upload_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(uploads)
    }

    fn create_run(&self, run_id: &str, project_id: &str) -> Result<RunRecord> {
        let record = RunRecord {
            id: run_id.to_string(),
            project_id: project_id.to_string(),
            status: RunStatus::Pending,
            output_file_name: None,
            output_path: None,
            summary_json: None,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.conn.execute(
            "INSERT INTO analysis_runs (id, project_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![record.id, record.project_id, record.status.as_str(), record.created_at],
        )?;
        debug!("Run {} created for project {}", run_id, project_id);
        Ok(record)
    }

    fn mark_processing(&self, run_id: &str) -> Result<()> {
        self.check_transition(run_id, RunStatus::Processing)?;
        self.conn.execute(
            "UPDATE analysis_runs SET status = ?1 WHERE id = ?2",
            params![RunStatus::Processing.as_str(), run_id],
        )?;
        Ok(())
    }

    fn complete_run(
        &self,
        run_id: &str,
        output_file_name: &str,
        output_path: &Path,
        summary_json: &str,
    ) -> Result<()> {
        self.check_transition(run_id, RunStatus::Completed)?;
        self.conn.execute(
            "UPDATE analysis_runs
             SET status = ?1, output_file_name = ?2, output_path = ?3, summary_json = ?4,
                 completed_at = ?5
             WHERE id = ?6",
            params![
                RunStatus::Completed.as_str(),
                output_file_name,
                output_path.to_string_lossy(),
                summary_json,
                Utc::now(),
                run_id
            ],
        )?;
        Ok(())
    }

    fn fail_run(&self, run_id: &str, message: &str) -> Result<()> {
        self.check_transition(run_id, RunStatus::Failed)?;
        self.conn.execute(
            "UPDATE analysis_runs SET status = ?1, error_message = ?2, completed_at = ?3
             WHERE id = ?4",
            params![RunStatus::Failed.as_str(), message, Utc::now(), run_id],
        )?;
        Ok(())
    }

    fn run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                &format!("SELECT {} FROM analysis_runs WHERE id = ?1", RUN_COLUMNS),
                [run_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(store_project: &Project, family: FileFamily, month: u32, name: &str) -> UploadedFile {
        UploadedFile {
            id: Uuid::new_v4().to_string(),
            project_id: store_project.id.clone(),
            family,
            month,
            year: 2021,
            original_name: name.to_string(),
            locator: PathBuf::from(format!("/tmp/{}", name)),
            size: 42,
        }
    }

    #[test]
    fn test_project_lookup_by_id_or_name() {
        let store = SqliteStore::in_memory().unwrap();
        let project = store
            .create_project("Acme", "27abcde1234f1z5", "2021-22")
            .unwrap();
        assert_eq!(project.gstin, "27ABCDE1234F1Z5");

        assert_eq!(store.find_project(&project.id).unwrap().unwrap().name, "Acme");
        assert_eq!(store.find_project("Acme").unwrap().unwrap().id, project.id);
        assert!(store.find_project("nope").unwrap().is_none());
        assert!(store.require_project("nope").is_err());
        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_reupload_replaces_same_period() {
        let store = SqliteStore::in_memory().unwrap();
        let project = store.create_project("Acme", "27ABCDE1234F1Z5", "2021-22").unwrap();

        let first = upload(&project, FileFamily::A, 4, "apr-v1.xlsx");
        assert!(store.record_upload(&first).unwrap().is_none());
        store
            .record_upload(&upload(&project, FileFamily::B, 4, "apr-2a.xlsx"))
            .unwrap();
        let replaced = store
            .record_upload(&upload(&project, FileFamily::A, 4, "apr-v2.xlsx"))
            .unwrap();

        assert_eq!(replaced.unwrap().original_name, "apr-v1.xlsx");
        let uploads = store.uploads(&project.id).unwrap();
        assert_eq!(uploads.len(), 2);
        assert!(uploads.iter().any(|u| u.original_name == "apr-v2.xlsx"));
        assert!(uploads.iter().all(|u| u.original_name != "apr-v1.xlsx"));
    }

    #[test]
    fn test_run_lifecycle_enforces_transitions() {
        let store = SqliteStore::in_memory().unwrap();
        let project = store.create_project("Acme", "27ABCDE1234F1Z5", "2021-22").unwrap();

        let run = store.create_run("run-1", &project.id).unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        // pending cannot jump straight to completed
        let err = store
            .complete_run("run-1", "out.xlsx", Path::new("/tmp/out.xlsx"), "{}")
            .unwrap_err();
        assert!(err.to_string().contains("pending -> completed"));

        store.mark_processing("run-1").unwrap();
        store
            .complete_run("run-1", "out.xlsx", Path::new("/tmp/out.xlsx"), "{}")
            .unwrap();
        let done = store.run("run-1").unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.output_file_name.as_deref(), Some("out.xlsx"));
        assert!(done.completed_at.is_some());

        assert!(store.fail_run("run-1", "late failure").is_err());
        assert_eq!(store.list_runs(&project.id).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_run_keeps_message() {
        let store = SqliteStore::in_memory().unwrap();
        let project = store.create_project("Acme", "27ABCDE1234F1Z5", "2021-22").unwrap();
        store.create_run("run-2", &project.id).unwrap();
        store.mark_processing("run-2").unwrap();
        store.fail_run("run-2", "disk full").unwrap();

        let failed = store.run("run-2").unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("disk full"));
        assert!(failed.output_path.is_none());
    }
}
