// Reports module - consolidated analysis workbook

pub mod index;
pub mod workbook;

use anyhow::{Context, Result};
use rust_xlsxwriter::Workbook;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

use crate::db::models::FileFamily;
use crate::engine::merge::FamilyMerge;
use crate::error::ConsolidationError;
use crate::taxonomy::Taxonomy;
use crate::utils::unique_sheet_name;

pub use index::{IndexRow, INDEX_SHEET_NAME};
pub use workbook::SheetFormats;

/// A data sheet that will be written, with its final (unique) name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSheet {
    pub family: FileFamily,
    /// Output group the sheet was requested under
    pub group: String,
    pub name: String,
}

impl PlannedSheet {
    pub fn new(family: FileFamily, group: &str, name: &str) -> Self {
        PlannedSheet {
            family,
            group: group.to_string(),
            name: name.to_string(),
        }
    }
}

fn clash_suffix(family: FileFamily) -> &'static str {
    match family {
        FileFamily::A => "R1",
        FileFamily::B => "2A",
    }
}

/// Assign every merged section a worksheet name, unique across the workbook
pub fn plan_sheets(merges: &[FamilyMerge]) -> Vec<PlannedSheet> {
    let mut taken = vec![INDEX_SHEET_NAME.to_string()];
    let mut planned = Vec::new();
    for merge in merges {
        for section in &merge.sections {
            let name = unique_sheet_name(section.group, clash_suffix(merge.family), &taken);
            taken.push(name.clone());
            planned.push(PlannedSheet::new(merge.family, section.group, &name));
        }
    }
    planned
}

/// An in-memory workbook plus the data sheets it holds
pub struct AssembledReport {
    pub workbook: Workbook,
    pub sheets: Vec<PlannedSheet>,
}

impl AssembledReport {
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }
}

/// Lay out the index sheet first, then one sheet per merged section
pub fn assemble(merges: &[FamilyMerge]) -> Result<AssembledReport> {
    let sheets = plan_sheets(merges);
    let formats = SheetFormats::new();
    let mut workbook = Workbook::new();

    let blocks: Vec<_> = merges
        .iter()
        .map(|m| (m.family, index::index_rows(m, &sheets)))
        .collect();
    let index_sheet = workbook.add_worksheet().set_name(INDEX_SHEET_NAME)?;
    index::write_index_sheet(index_sheet, &formats, &blocks)?;

    let sections = merges
        .iter()
        .flat_map(|m| m.sections.iter().map(move |s| (m.family, s)));
    for ((family, section), planned) in sections.zip(&sheets) {
        let title = Taxonomy::for_family(family).title();
        let worksheet = workbook
            .add_worksheet()
            .set_name(&planned.name)
            .with_context(|| format!("Failed to create sheet '{}'", planned.name))?;
        workbook::write_section_sheet(worksheet, &formats, &title, section)?;
    }

    Ok(AssembledReport { workbook, sheets })
}

/// `GST_Analysis_<GSTIN>_<FY>_<first 8 of run id>.xlsx`
pub fn output_file_name(gstin: &str, financial_year: &str, run_id: &str) -> String {
    let short: String = run_id.chars().take(8).collect();
    format!("GST_Analysis_{}_{}_{}.xlsx", gstin, financial_year, short)
}

/// Save through a temporary file in `output_dir`, then rename into place.
///
/// Nothing appears under `file_name` unless the whole workbook was written.
pub fn save_atomic(workbook: &mut Workbook, output_dir: &Path, file_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output dir {}", output_dir.display()))?;

    let mut tmp = NamedTempFile::new_in(output_dir).map_err(|e| {
        ConsolidationError::OutputWrite(format!("{}: {}", output_dir.display(), e))
    })?;
    workbook
        .save_to_writer(tmp.as_file_mut())
        .map_err(|e| ConsolidationError::OutputWrite(e.to_string()))?;

    let final_path = output_dir.join(file_name);
    tmp.persist(&final_path).map_err(|e| {
        ConsolidationError::OutputWrite(format!("{}: {}", final_path.display(), e.error))
    })?;

    info!("Saved report to {}", final_path.display());
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::merge::MergedSection;
    use crate::engine::validate::ValidationTally;
    use crate::table::Table;
    use tempfile::TempDir;

    fn section(family: FileFamily, key: &str) -> MergedSection {
        let spec = *Taxonomy::for_family(family).get(key).unwrap();
        MergedSection {
            group: spec.output_group,
            spec,
            members: vec![spec.key],
            table: Table::default(),
            anomalies: 0,
            tally: ValidationTally::default(),
        }
    }

    fn merge(family: FileFamily, keys: &[&str]) -> FamilyMerge {
        FamilyMerge {
            family,
            files_processed: 1,
            sections: keys.iter().map(|k| section(family, k)).collect(),
            outcomes: Vec::new(),
        }
    }

    #[test]
    fn test_clashing_group_names_get_family_suffix() {
        let merges = vec![
            merge(FileFamily::A, &["B2CS"]),
            merge(FileFamily::B, &["B2B", "CDNR"]),
        ];
        let names: Vec<_> = plan_sheets(&merges).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["Out-b2cs", "B2B", "CDNR"]);

        let clash = vec![
            FamilyMerge {
                sections: vec![MergedSection {
                    group: "B2B",
                    ..section(FileFamily::A, "B2B")
                }],
                ..merge(FileFamily::A, &[])
            },
            merge(FileFamily::B, &["B2B"]),
        ];
        let names: Vec<_> = plan_sheets(&clash).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["B2B", "B2B (2A)"]);
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(
            output_file_name("27ABCDE1234F1Z5", "2021-22", "0f1e2d3c-aaaa-bbbb"),
            "GST_Analysis_27ABCDE1234F1Z5_2021-22_0f1e2d3c.xlsx"
        );
    }

    #[test]
    fn test_save_atomic_leaves_only_final_file() {
        let dir = TempDir::new().unwrap();
        let mut report = assemble(&[merge(FileFamily::A, &[]), merge(FileFamily::B, &[])]).unwrap();
        let path = save_atomic(&mut report.workbook, &dir.path().join("out"), "report.xlsx").unwrap();

        assert!(path.exists());
        let entries: Vec<_> = std::fs::read_dir(dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("report.xlsx")]);
    }
}
