use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::ZipArchive;

use super::{sheet, ReaderOptions, SheetListing};
use crate::period::Period;
use crate::table::Table;
use crate::taxonomy::SectionSpec;

/// Whether a zip entry is a workbook worth opening
fn is_workbook_entry(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with('/') || lower.starts_with("__macosx/") || lower.contains("/__macosx/") {
        return false;
    }
    let base = lower.rsplit('/').next().unwrap_or(&lower);
    if base.starts_with("~$") || base.starts_with("._") {
        return false;
    }
    base.ends_with(".xlsx") || base.ends_with(".xls")
}

/// Copy an entry out to a uniquely named temporary workbook.
///
/// The file is removed when the returned handle drops.
fn extract_entry<R: io::Read>(entry: &mut R, name: &str) -> Result<NamedTempFile> {
    let suffix = if name.to_ascii_lowercase().ends_with(".xls") {
        ".xls"
    } else {
        ".xlsx"
    };
    let mut tmp = tempfile::Builder::new()
        .prefix("gstbook-")
        .suffix(suffix)
        .tempfile()
        .context("Failed to create temporary workbook")?;
    io::copy(entry, &mut tmp).with_context(|| format!("Failed to extract '{}'", name))?;
    tmp.flush()?;
    Ok(tmp)
}

fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("Failed to read zip bundle {}", path.display()))
}

/// Names of the workbook entries inside a bundle, in archive order
pub fn workbook_entries<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let archive = open_archive(path.as_ref())?;
    Ok(archive
        .file_names()
        .filter(|n| is_workbook_entry(n))
        .map(str::to_string)
        .collect::<Vec<_>>())
}

/// Resolve one section across every workbook in a bundle.
///
/// Each entry is tagged with the period in its own name, or `declared` when the
/// name carries none. Fragments are joined in fiscal order of those periods,
/// archive order within one period. A broken entry is logged and skipped.
pub fn read_section<P: AsRef<Path>>(
    path: P,
    spec: &SectionSpec,
    declared: &Period,
    opts: &ReaderOptions,
) -> Result<Option<Table>> {
    let path = path.as_ref();
    let mut archive = open_archive(path)?;
    let mut fragments: Vec<(Period, Table)> = Vec::new();

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry #{} in {}: {}", index, path.display(), e);
                continue;
            }
        };
        if entry.is_dir() || !is_workbook_entry(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();
        let period = match Period::from_file_name(&name) {
            Period::Unrecognized(_) => declared.clone(),
            found => found,
        };

        let fragment = extract_entry(&mut entry, &name)
            .and_then(|tmp| sheet::read_section(tmp.path(), spec, &period, opts));
        match fragment {
            Ok(Some(table)) => {
                debug!("Bundle entry {} -> {} rows for {}", name, table.len(), spec.key);
                fragments.push((period, table));
            }
            Ok(None) => {}
            Err(e) => warn!(
                "Skipping entry {} of {} for section {}: {:#}",
                name,
                path.display(),
                spec.key,
                e
            ),
        }
    }

    // archive order is arbitrary; entries of the same month keep it
    fragments.sort_by_key(|(period, _)| period.sort_key());
    let mut combined = Table::default();
    for (_, table) in fragments {
        combined.append(table);
    }
    Ok(Some(combined).filter(|t| !t.is_empty()))
}

/// Sheet names of every workbook inside a bundle
pub fn list_sheets<P: AsRef<Path>>(path: P) -> Result<Vec<SheetListing>> {
    let path = path.as_ref();
    let mut archive = open_archive(path)?;
    let mut listings = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() || !is_workbook_entry(entry.name()) {
            continue;
        }
        let name = entry.name().to_string();
        let tmp = extract_entry(&mut entry, &name)?;
        listings.push(SheetListing {
            source: name,
            sheets: sheet::sheet_names(tmp.path())?,
        });
    }
    Ok(listings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workbook_entry_filter() {
        assert!(is_workbook_entry("B2B_042021.xlsx"));
        assert!(is_workbook_entry("nested/dir/old.XLS"));
        assert!(!is_workbook_entry("__MACOSX/._B2B_042021.xlsx"));
        assert!(!is_workbook_entry("folder/"));
        assert!(!is_workbook_entry("readme.txt"));
        assert!(!is_workbook_entry("~$locked.xlsx"));
    }

    #[test]
    fn test_extracted_entry_is_removed_on_drop() {
        let mut data: &[u8] = b"not really a workbook";
        let tmp = extract_entry(&mut data, "entry.xls").unwrap();
        let path = tmp.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("xls"));
        drop(tmp);
        assert!(!path.exists());
    }
}
