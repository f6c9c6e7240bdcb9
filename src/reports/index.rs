//! The `Index` sheet: one row per taxonomy section, both families side by side

use anyhow::Result;
use rust_xlsxwriter::Worksheet;
use serde::Serialize;

use super::workbook::{col_num, fitted_width, row_num, SheetFormats};
use super::PlannedSheet;
use crate::db::models::FileFamily;
use crate::engine::merge::{FamilyMerge, SectionStatus};
use crate::taxonomy::Taxonomy;
use crate::utils::count_noun;

pub const INDEX_SHEET_NAME: &str = "Index";
pub const OUTCOME_GENERATED: &str = "Analysed and Generated";
pub const OUTCOME_NO_RECORDS: &str =
    "Taxpayer has no records under this head. Hence, no analysis required";
pub const OUTCOME_ERROR: &str = "Error in processing";

pub const INDEX_HEADERS: [&str; 7] = [
    "S. No",
    "Worksheet Name",
    "Table No.",
    "Table Reference",
    "Output Sheet Name",
    "Analysis Output",
    "Remarks",
];

const CAPTION_ROW: u32 = 0;
const HEADER_ROW: u32 = 1;
const FIRST_ROW: u32 = 2;

/// One line of an index block
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRow {
    pub serial: usize,
    pub key: String,
    pub table_ref: String,
    pub reference: String,
    pub output_sheet: String,
    pub analysis_output: String,
    pub remarks: String,
}

/// Build a family's index block.
///
/// A section counts as generated when a sheet exists for its own key or for its
/// output group, looking only at sheets of the same family.
pub fn index_rows(merge: &FamilyMerge, sheets: &[PlannedSheet]) -> Vec<IndexRow> {
    let taxonomy = Taxonomy::for_family(merge.family);
    let family_sheets: Vec<&PlannedSheet> =
        sheets.iter().filter(|s| s.family == merge.family).collect();

    taxonomy
        .sections()
        .iter()
        .enumerate()
        .map(|(i, spec)| {
            let sheet = family_sheets
                .iter()
                .find(|s| s.group == spec.output_group || s.group == spec.key);
            let outcome = merge.outcome(spec.key);

            let analysis_output = match (sheet, outcome.map(|o| o.status)) {
                (Some(_), _) => OUTCOME_GENERATED,
                (None, Some(SectionStatus::Error)) => OUTCOME_ERROR,
                (None, _) => OUTCOME_NO_RECORDS,
            };

            let mut remarks = Vec::new();
            if let Some(outcome) = outcome.filter(|o| o.status == SectionStatus::Generated) {
                if outcome.anomalies > 0 {
                    remarks.push(count_noun(
                        outcome.anomalies,
                        "wrong month row",
                        "wrong month rows",
                    ));
                }
                let undated = outcome.tally.undated();
                if undated > 0 {
                    remarks.push(count_noun(
                        undated,
                        "row without a valid date",
                        "rows without a valid date",
                    ));
                }
            }

            IndexRow {
                serial: i + 1,
                key: spec.key.to_string(),
                table_ref: spec.table_ref.to_string(),
                reference: spec.reference.to_string(),
                output_sheet: sheet
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| spec.output_group.to_string()),
                analysis_output: analysis_output.to_string(),
                remarks: remarks.join("; "),
            }
        })
        .collect()
}

/// First column of a family's block; blocks are separated by one blank column
fn block_start(family: FileFamily) -> usize {
    match family {
        FileFamily::A => 0,
        FileFamily::B => INDEX_HEADERS.len() + 1,
    }
}

/// Write both families' blocks onto the index worksheet
pub fn write_index_sheet(
    worksheet: &mut Worksheet,
    formats: &SheetFormats,
    blocks: &[(FileFamily, Vec<IndexRow>)],
) -> Result<()> {
    for (family, rows) in blocks {
        let start = block_start(*family);
        let last = start + INDEX_HEADERS.len() - 1;
        worksheet.merge_range(
            CAPTION_ROW,
            col_num(start)?,
            CAPTION_ROW,
            col_num(last)?,
            family.form_name(),
            &formats.header,
        )?;
        for (offset, header) in INDEX_HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(
                HEADER_ROW,
                col_num(start + offset)?,
                *header,
                &formats.header,
            )?;
        }

        for (i, row) in rows.iter().enumerate() {
            let r = FIRST_ROW + row_num(i)?;
            let c = |offset: usize| col_num(start + offset);
            worksheet.write_number_with_format(r, c(0)?, row.serial as f64, formats.centered_for(i))?;
            worksheet.write_string_with_format(r, c(1)?, &row.key, formats.text_for(i))?;
            worksheet.write_string_with_format(r, c(2)?, &row.table_ref, formats.centered_for(i))?;
            worksheet.write_string_with_format(r, c(3)?, &row.reference, formats.text_for(i))?;
            worksheet.write_string_with_format(r, c(4)?, &row.output_sheet, formats.text_for(i))?;
            worksheet.write_string_with_format(
                r,
                c(5)?,
                &row.analysis_output,
                formats.centered_for(i),
            )?;
            worksheet.write_string_with_format(r, c(6)?, &row.remarks, formats.text_for(i))?;
        }

        let widths = [
            8.0,
            fitted_width(rows.iter().map(|r| r.key.as_str())),
            fitted_width(rows.iter().map(|r| r.table_ref.as_str())),
            50.0,
            fitted_width(rows.iter().map(|r| r.output_sheet.as_str())),
            30.0,
            fitted_width(rows.iter().map(|r| r.remarks.as_str())),
        ];
        for (offset, width) in widths.into_iter().enumerate() {
            worksheet.set_column_width(col_num(start + offset)?, width)?;
        }
    }

    worksheet.set_column_width(col_num(INDEX_HEADERS.len())?, 3)?;
    worksheet.set_freeze_panes(FIRST_ROW, 0)?;
    Ok(())
}
