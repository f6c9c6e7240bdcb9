// Import module - monthly return exports (single workbooks and zip bundles)

mod bundle;
mod file_detector;
mod sheet;

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::period::Period;
use crate::table::Table;
use crate::taxonomy::SectionSpec;

pub use file_detector::{
    detect_source_kind, is_valid_gstin, parse_upload_name, SourceKind, UploadName,
};
pub use sheet::match_sheet;

/// Layout knobs for reading portal exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Title rows above the column header
    pub header_rows: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions { header_rows: 3 }
    }
}

/// Sheets found in one workbook (or one workbook inside a bundle)
#[derive(Debug, Clone, Serialize)]
pub struct SheetListing {
    pub source: String,
    pub sheets: Vec<String>,
}

/// An uploaded export, classified once by shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFile {
    Spreadsheet(PathBuf),
    Bundle(PathBuf),
}

impl SourceFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = match detect_source_kind(path)? {
            SourceKind::Spreadsheet => SourceFile::Spreadsheet(path.to_path_buf()),
            SourceKind::Bundle => SourceFile::Bundle(path.to_path_buf()),
        };
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        match self {
            SourceFile::Spreadsheet(p) | SourceFile::Bundle(p) => p,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            SourceFile::Spreadsheet(_) => SourceKind::Spreadsheet,
            SourceFile::Bundle(_) => SourceKind::Bundle,
        }
    }

    /// Extract one section's records from this upload.
    ///
    /// `declared` is the upload's own filing period; rows without a better
    /// period of their own are tagged with it.
    pub fn resolve(
        &self,
        spec: &SectionSpec,
        declared: &Period,
        opts: &ReaderOptions,
    ) -> Result<Option<Table>> {
        match self {
            SourceFile::Spreadsheet(path) => sheet::read_section(path, spec, declared, opts),
            SourceFile::Bundle(path) => bundle::read_section(path, spec, declared, opts),
        }
    }

    pub fn list_sheets(&self) -> Result<Vec<SheetListing>> {
        match self {
            SourceFile::Spreadsheet(path) => Ok(vec![SheetListing {
                source: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
                sheets: sheet::sheet_names(path)?,
            }]),
            SourceFile::Bundle(path) => bundle::list_sheets(path),
        }
    }
}

/// List every sheet reachable from a file, detecting its shape first
pub fn list_sheets<P: AsRef<Path>>(path: P) -> Result<Vec<SheetListing>> {
    let source = SourceFile::open(path)?;
    info!("Inspecting {:?} ({:?})", source.path(), source.kind());
    source.list_sheets()
}

/// Workbook entries of a bundle, in archive order
pub fn bundle_entries<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    bundle::workbook_entries(path)
}
