use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Return-export families handled by the engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileFamily {
    /// Outward supplies return (GSTR-1)
    A,
    /// Auto-drafted inward supplies statement (GSTR-2A)
    B,
}

impl FileFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFamily::A => "A",
            FileFamily::B => "B",
        }
    }

    /// Name of the statutory form this family is exported from
    pub fn form_name(&self) -> &'static str {
        match self {
            FileFamily::A => "GSTR-1",
            FileFamily::B => "GSTR-2A",
        }
    }

    pub fn all() -> [FileFamily; 2] {
        [FileFamily::A, FileFamily::B]
    }
}

impl FromStr for FileFamily {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" | "GSTR1" | "GSTR-1" => Ok(FileFamily::A),
            "B" | "GSTR2A" | "GSTR-2A" | "R2A" => Ok(FileFamily::B),
            _ => Err(()),
        }
    }
}

impl fmt::Display for FileFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.form_name())
    }
}

/// A taxpayer engagement for one financial year
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub gstin: String,
    pub financial_year: String, // e.g. "2021-22"
    pub created_at: DateTime<Utc>,
}

/// One monthly export accepted for a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadedFile {
    pub id: String,
    pub project_id: String,
    pub family: FileFamily,
    pub month: u32, // 1-12
    pub year: i32,
    pub original_name: String,
    pub locator: PathBuf,
    pub size: u64,
}

/// Lifecycle of an analysis run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// pending -> processing -> {completed | failed}
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Processing)
                | (RunStatus::Processing, RunStatus::Completed)
                | (RunStatus::Processing, RunStatus::Failed)
        )
    }
}

impl FromStr for RunStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RunStatus::Pending),
            "processing" => Ok(RunStatus::Processing),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(()),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub project_id: String,
    pub status: RunStatus,
    pub output_file_name: Option<String>,
    pub output_path: Option<PathBuf>,
    pub summary_json: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_parsing_accepts_form_names() {
        assert_eq!(FileFamily::from_str("gstr1"), Ok(FileFamily::A));
        assert_eq!(FileFamily::from_str("GSTR-2A"), Ok(FileFamily::B));
        assert_eq!(FileFamily::from_str("b"), Ok(FileFamily::B));
        assert!(FileFamily::from_str("GSTR3B").is_err());
    }

    #[test]
    fn test_run_status_transitions() {
        use RunStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(Completed.is_terminal() && Failed.is_terminal());
        assert!(!Processing.is_terminal());
    }

    #[test]
    fn test_run_status_round_trips_through_text() {
        for status in [
            RunStatus::Pending,
            RunStatus::Processing,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::from_str(status.as_str()), Ok(status));
        }
    }
}
