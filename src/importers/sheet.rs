use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use super::ReaderOptions;
use crate::period::Period;
use crate::table::{excel_serial_to_datetime, Cell, Column, Table, MONTH_COLUMN};
use crate::taxonomy::SectionSpec;
use crate::utils::column_index;

/// Find the sheet holding a section.
///
/// Exact case-insensitive equality wins; otherwise the first sheet (in workbook
/// order) whose name contains the key, or is contained in it, is taken.
pub fn match_sheet<'a>(sheet_names: &'a [String], key: &str) -> Option<&'a str> {
    let key = key.trim().to_lowercase();
    if key.is_empty() {
        return None;
    }

    sheet_names
        .iter()
        .find(|name| name.trim().to_lowercase() == key)
        .or_else(|| {
            sheet_names.iter().find(|name| {
                let name = name.trim().to_lowercase();
                !name.is_empty() && (name.contains(&key) || key.contains(&name))
            })
        })
        .map(String::as_str)
}

/// Sheet names of a workbook, in workbook order
pub fn sheet_names<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    Ok(workbook.sheet_names())
}

/// Read one section out of a workbook file.
///
/// Returns `Ok(None)` when no sheet matches or the sheet holds no records.
pub fn read_section<P: AsRef<Path>>(
    path: P,
    spec: &SectionSpec,
    source_period: &Period,
    opts: &ReaderOptions,
) -> Result<Option<Table>> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;

    let names = workbook.sheet_names();
    let Some(sheet) = match_sheet(&names, spec.key).map(str::to_string) else {
        debug!("No sheet for section {} in {}", spec.key, path.display());
        return Ok(None);
    };

    let range = workbook
        .worksheet_range(&sheet)
        .with_context(|| format!("Failed to read sheet '{}' of {}", sheet, path.display()))?;

    let table = range_to_table(&range, spec, source_period, opts);
    if let Some(table) = &table {
        debug!(
            "Section {} <- sheet '{}' ({} rows, period {})",
            spec.key,
            sheet,
            table.len(),
            source_period
        );
    }
    Ok(table)
}

/// Turn a worksheet range into a cleaned, period-tagged table.
///
/// Positions are absolute: rows `0..header_rows` are the title block, the next
/// row is the header, everything below is data.
pub(crate) fn range_to_table(
    range: &Range<Data>,
    spec: &SectionSpec,
    source_period: &Period,
    opts: &ReaderOptions,
) -> Option<Table> {
    let (end_row, end_col) = range.end()?;
    let header_row = u32::try_from(opts.header_rows).ok()?;
    if end_row <= header_row {
        return None;
    }

    let cell_at = |row: u32, col: u32| {
        range
            .get_value((row, col))
            .map(to_cell)
            .unwrap_or(Cell::Empty)
    };

    let data_rows: Vec<Vec<Cell>> = (header_row + 1..=end_row)
        .map(|r| (0..=end_col).map(|c| cell_at(r, c)).collect::<Vec<_>>())
        .filter(|cells| !cells.iter().all(Cell::is_blank))
        .collect();
    if data_rows.is_empty() {
        return None;
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut kept = Vec::new();
    let mut columns = Vec::new();
    for col in 0..=end_col {
        let label = cell_at(header_row, col).render().trim().to_string();
        let index = col as usize;
        if label.is_empty() || data_rows.iter().all(|row| row[index].is_blank()) {
            continue;
        }
        // Repeated header labels stay distinct: `Rate`, `Rate.1`
        let label = match seen.get_mut(&label) {
            Some(n) => {
                *n += 1;
                format!("{}.{}", label, n)
            }
            None => {
                seen.insert(label.clone(), 0);
                label
            }
        };
        kept.push(index);
        columns.push(Column::new(label, Some(index)));
    }
    if columns.is_empty() {
        return None;
    }

    let month_pos = columns
        .iter()
        .position(|c| c.label.eq_ignore_ascii_case(MONTH_COLUMN));
    let declared_pos = spec
        .period_column
        .and_then(column_index)
        .and_then(|src| kept.iter().position(|&k| k == src));

    let mut table = Table::new(columns);
    for row in data_rows {
        let cells: Vec<Cell> = kept.iter().map(|&k| row[k].clone()).collect();
        let period = [month_pos, declared_pos]
            .into_iter()
            .flatten()
            .find_map(|pos| cell_period(&cells[pos]))
            .unwrap_or_else(|| source_period.clone());
        table.push_row(cells, period);
    }
    table.drop_blank_rows();
    if table.is_empty() {
        return None;
    }

    table.ensure_period_column();
    Some(table)
}

/// Only text labels count as a filing period; a date here is a document date
fn cell_period(cell: &Cell) -> Option<Period> {
    match cell {
        Cell::Text(text) => Period::parse(text),
        _ => None,
    }
}

pub(crate) fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Int(*i),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#{:?}", e)),
    }
}
