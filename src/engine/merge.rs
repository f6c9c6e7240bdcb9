//! Cross-month merge: one table per section (or combined group) per family

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::validate::{validate, ValidationTally};
use crate::db::models::{FileFamily, UploadedFile};
use crate::importers::{ReaderOptions, SourceFile};
use crate::period::{fiscal_sort_key, Period};
use crate::table::Table;
use crate::taxonomy::{SectionSpec, Taxonomy};
use crate::utils::column_index;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Generated,
    NoRecords,
    /// Every file that was tried failed and nothing was found
    Error,
}

/// What happened to one section of the taxonomy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub key: String,
    pub output_group: String,
    pub status: SectionStatus,
    pub files_with_data: usize,
    pub records: usize,
    /// `WRONG MONTH` rows
    pub anomalies: usize,
    pub tally: ValidationTally,
    pub failed_files: usize,
}

/// A table ready to become one output sheet
#[derive(Debug, Clone)]
pub struct MergedSection {
    /// Output group, i.e. the desired sheet name
    pub group: &'static str,
    /// Display metadata: the section itself, or the first contributing member
    pub spec: SectionSpec,
    /// Section keys that contributed rows
    pub members: Vec<&'static str>,
    pub table: Table,
    pub anomalies: usize,
    pub tally: ValidationTally,
}

impl MergedSection {
    pub fn row_count(&self) -> usize {
        self.table.len()
    }
}

/// Merge result for one family
#[derive(Debug, Clone)]
pub struct FamilyMerge {
    pub family: FileFamily,
    pub files_processed: usize,
    /// In emission order: single sections first, combined groups after
    pub sections: Vec<MergedSection>,
    /// One entry per taxonomy section, in taxonomy order
    pub outcomes: Vec<SectionOutcome>,
}

impl FamilyMerge {
    pub fn outcome(&self, key: &str) -> Option<&SectionOutcome> {
        self.outcomes.iter().find(|o| o.key == key)
    }

    pub fn section_for_group(&self, group: &str) -> Option<&MergedSection> {
        self.sections.iter().find(|s| s.group == group)
    }

    pub fn total_records(&self) -> usize {
        self.sections.iter().map(MergedSection::row_count).sum()
    }

    pub fn total_anomalies(&self) -> usize {
        self.sections.iter().map(|s| s.anomalies).sum()
    }
}

/// One upload, classified and tagged with its declared period
struct PreparedSource<'a> {
    upload: &'a UploadedFile,
    source: Option<SourceFile>,
    period: Period,
}

/// Order a family's uploads April-first; equal periods keep their input order
pub fn order_uploads(family: FileFamily, uploads: &[UploadedFile]) -> Vec<&UploadedFile> {
    let mut files: Vec<&UploadedFile> = uploads.iter().filter(|u| u.family == family).collect();
    files.sort_by_key(|u| fiscal_sort_key(u.month, u.year));
    files
}

/// Merge every section of a family across all of its monthly uploads.
///
/// Failures reading one file or one section are logged and recorded in the
/// outcomes; they never stop the other sections.
pub fn merge_family(
    taxonomy: &Taxonomy,
    uploads: &[UploadedFile],
    opts: &ReaderOptions,
) -> FamilyMerge {
    let family = taxonomy.family();
    let sources: Vec<PreparedSource> = order_uploads(family, uploads)
        .into_iter()
        .map(|upload| {
            let source = match SourceFile::open(&upload.locator) {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!("Cannot use {}: {:#}", upload.original_name, e);
                    None
                }
            };
            PreparedSource {
                upload,
                source,
                period: Period::from_month_year(upload.month, upload.year),
            }
        })
        .collect();

    info!(
        "Merging {} across {} file(s)",
        family.form_name(),
        sources.len()
    );

    let mut sections = Vec::new();
    let mut combined: Vec<MergedSection> = Vec::new();
    let mut outcomes = Vec::with_capacity(taxonomy.sections().len());

    for spec in taxonomy.sections() {
        let (table, outcome) = merge_section(spec, &sources, opts);
        let Some(table) = table else {
            debug!("{} {}: {:?}", family.form_name(), spec.key, outcome.status);
            outcomes.push(outcome);
            continue;
        };

        let merged = MergedSection {
            group: spec.output_group,
            spec: *spec,
            members: vec![spec.key],
            table,
            anomalies: outcome.anomalies,
            tally: outcome.tally,
        };
        outcomes.push(outcome);

        if !taxonomy.is_combined_group(spec.output_group) {
            sections.push(merged);
            continue;
        }
        match combined.iter_mut().find(|m| m.group == spec.output_group) {
            Some(group) => {
                group.table.append(merged.table);
                group.anomalies += merged.anomalies;
                group.tally.absorb(&merged.tally);
                group.members.push(spec.key);
            }
            None => combined.push(merged),
        }
    }
    sections.extend(combined);

    let merge = FamilyMerge {
        family,
        files_processed: sources.len(),
        sections,
        outcomes,
    };
    info!(
        "{}: {} sheet(s), {} record(s), {} wrong month row(s)",
        family.form_name(),
        merge.sections.len(),
        merge.total_records(),
        merge.total_anomalies()
    );
    merge
}

fn merge_section(
    spec: &SectionSpec,
    sources: &[PreparedSource],
    opts: &ReaderOptions,
) -> (Option<Table>, SectionOutcome) {
    let mut table: Option<Table> = None;
    let mut files_with_data = 0;
    let mut failed_files = 0;
    let mut tally = ValidationTally::default();

    for prepared in sources {
        let Some(source) = &prepared.source else {
            failed_files += 1;
            continue;
        };
        match source.resolve(spec, &prepared.period, opts) {
            Ok(Some(mut fragment)) if !fragment.is_empty() => {
                if spec.validates_dates() {
                    let date_pos = spec
                        .date_column
                        .and_then(column_index)
                        .and_then(|src| fragment.position_of_source(src));
                    let report = validate(&mut fragment, date_pos);
                    tally.absorb(&report.tally);
                }
                files_with_data += 1;
                table.get_or_insert_with(Table::default).append(fragment);
            }
            Ok(_) => {}
            Err(e) => {
                failed_files += 1;
                warn!(
                    "Failed to read section {} from {}: {:#}",
                    spec.key, prepared.upload.original_name, e
                );
            }
        }
    }

    let table = table.filter(|t| !t.is_empty());
    let status = match &table {
        Some(_) => SectionStatus::Generated,
        None if !sources.is_empty() && failed_files == sources.len() => SectionStatus::Error,
        None => SectionStatus::NoRecords,
    };
    let outcome = SectionOutcome {
        key: spec.key.to_string(),
        output_group: spec.output_group.to_string(),
        status,
        files_with_data,
        records: table.as_ref().map_or(0, Table::len),
        anomalies: tally.wrong_month,
        tally,
        failed_files,
    };
    (table, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn upload(family: FileFamily, month: u32, year: i32, name: &str) -> UploadedFile {
        UploadedFile {
            id: name.to_string(),
            project_id: "p".to_string(),
            family,
            month,
            year,
            original_name: name.to_string(),
            locator: PathBuf::from(format!("/nonexistent/{}", name)),
            size: 0,
        }
    }

    #[test]
    fn test_uploads_are_ordered_by_fiscal_month() {
        let uploads = vec![
            upload(FileFamily::A, 1, 2022, "jan"),
            upload(FileFamily::A, 12, 2021, "dec"),
            upload(FileFamily::B, 5, 2021, "b-may"),
            upload(FileFamily::A, 4, 2021, "apr"),
            upload(FileFamily::A, 12, 2021, "dec-2"),
        ];
        let names: Vec<_> = order_uploads(FileFamily::A, &uploads)
            .iter()
            .map(|u| u.original_name.as_str())
            .collect();
        assert_eq!(names, vec!["apr", "dec", "dec-2", "jan"]);
    }

    #[test]
    fn test_unreadable_files_mark_sections_as_errors() {
        let uploads = vec![upload(FileFamily::B, 4, 2021, "missing.xlsx")];
        let merge = merge_family(
            &Taxonomy::for_family(FileFamily::B),
            &uploads,
            &ReaderOptions::default(),
        );
        assert!(merge.sections.is_empty());
        assert_eq!(merge.outcomes.len(), 14);
        assert!(merge
            .outcomes
            .iter()
            .all(|o| o.status == SectionStatus::Error && o.failed_files == 1));
    }

    #[test]
    fn test_no_files_means_no_records() {
        let merge = merge_family(
            &Taxonomy::for_family(FileFamily::A),
            &[],
            &ReaderOptions::default(),
        );
        assert_eq!(merge.files_processed, 0);
        assert!(merge
            .outcomes
            .iter()
            .all(|o| o.status == SectionStatus::NoRecords));
    }
}
