//! In-memory tables for resolved fragments and merged sections

use chrono::{NaiveDate, NaiveDateTime};

use crate::period::Period;

/// Label of the per-row period column appended to every fragment
pub const MONTH_COLUMN: &str = "Month";
/// Label of the date-vs-period outcome column
pub const VALIDATION_COLUMN: &str = "Month Validation";

/// A single spreadsheet value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Int(i64),
    Bool(bool),
    Date(NaiveDateTime),
}

impl Cell {
    pub fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    /// Empty cells and whitespace-only text count as blank
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Number(_) | Cell::Int(_))
    }

    /// Text as it is shown in the output workbook
    pub fn render(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) => n.to_string(),
            Cell::Int(i) => i.to_string(),
            Cell::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Cell::Date(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%d-%m-%Y").to_string()
                } else {
                    dt.format("%d-%m-%Y %H:%M:%S").to_string()
                }
            }
        }
    }

    /// Raw text handed to the date validator; `None` when the cell is blank.
    /// Native dates are rendered year-first so they parse unambiguously.
    pub fn date_text(&self) -> Option<String> {
        match self {
            _ if self.is_blank() => None,
            Cell::Date(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            other => Some(other.render()),
        }
    }
}

/// Convert an Excel serial day number (1900 date system) into a timestamp
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.floor() as i64;
    let seconds = ((serial - serial.floor()) * 86_400.0).round() as i64;
    epoch
        .checked_add_signed(chrono::Duration::days(days))?
        .checked_add_signed(chrono::Duration::seconds(seconds))
}

/// A named column; `source_index` is its position in the original sheet
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub label: String,
    pub source_index: Option<usize>,
}

impl Column {
    pub fn new(label: impl Into<String>, source_index: Option<usize>) -> Self {
        Column {
            label: label.into(),
            source_index,
        }
    }
}

/// One record plus the filing period it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub period: Period,
}

/// Rows x named columns, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.label.as_str())
    }

    /// Position of a column by label (case-insensitive)
    pub fn position(&self, label: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.label.eq_ignore_ascii_case(label))
    }

    /// Position of the column that came from the given sheet column
    pub fn position_of_source(&self, source_index: usize) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.source_index == Some(source_index))
    }

    /// Append a row, padding or truncating it to the table width
    pub fn push_row(&mut self, mut cells: Vec<Cell>, period: Period) {
        cells.resize(self.columns.len(), Cell::Empty);
        self.rows.push(Row { cells, period });
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.cells.get(column))
    }

    /// Drop rows whose every cell is blank
    pub fn drop_blank_rows(&mut self) {
        self.rows.retain(|r| !r.cells.iter().all(Cell::is_blank));
    }

    /// Append a column holding one value per existing row
    pub fn push_column(&mut self, column: Column, values: Vec<Cell>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(column);
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.cells.push(values.next().unwrap_or(Cell::Empty));
        }
    }

    /// Replace the values of a column by label, appending it when absent
    pub fn set_column(&mut self, label: &str, values: Vec<Cell>) {
        match self.position(label) {
            Some(pos) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.cells[pos] = value;
                }
            }
            None => self.push_column(Column::new(label, None), values),
        }
    }

    /// Append the `Month` column from each row's period unless one already exists
    pub fn ensure_period_column(&mut self) {
        if self.position(MONTH_COLUMN).is_some() {
            return;
        }
        let values = self
            .rows
            .iter()
            .map(|r| Cell::Text(r.period.label()))
            .collect();
        self.push_column(Column::new(MONTH_COLUMN, None), values);
    }

    /// Concatenate `other` below this table.
    ///
    /// Columns are matched by label; labels only `other` has are appended in the
    /// order first seen, and cells missing on either side stay empty.
    pub fn append(&mut self, other: Table) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }

        let mut mapping = Vec::with_capacity(other.columns.len());
        for column in &other.columns {
            let pos = match self.columns.iter().position(|c| c.label == column.label) {
                Some(pos) => pos,
                None => {
                    self.columns.push(Column::new(column.label.clone(), None));
                    for row in &mut self.rows {
                        row.cells.push(Cell::Empty);
                    }
                    self.columns.len() - 1
                }
            };
            mapping.push(pos);
        }

        let width = self.columns.len();
        for row in other.rows {
            let mut cells = vec![Cell::Empty; width];
            for (cell, &pos) in row.cells.into_iter().zip(&mapping) {
                cells[pos] = cell;
            }
            self.rows.push(Row {
                cells,
                period: row.period,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(labels: &[&str], rows: &[(&[&str], Period)]) -> Table {
        let mut t = Table::new(
            labels
                .iter()
                .enumerate()
                .map(|(i, l)| Column::new(*l, Some(i)))
                .collect(),
        );
        for (cells, period) in rows {
            t.push_row(cells.iter().map(|c| Cell::text(*c)).collect(), period.clone());
        }
        t
    }

    #[test]
    fn test_append_unions_columns_by_label() {
        let apr = Period::from_month_year(4, 2021);
        let may = Period::from_month_year(5, 2021);
        let mut a = table(&["GSTIN", "Invoice"], &[(&["X", "1"], apr.clone())]);
        let b = table(&["Invoice", "Rate"], &[(&["2", "18"], may.clone())]);
        a.append(b);

        assert_eq!(a.labels().collect::<Vec<_>>(), vec!["GSTIN", "Invoice", "Rate"]);
        assert_eq!(a.len(), 2);
        assert_eq!(a.cell(0, 2), Some(&Cell::Empty));
        assert_eq!(a.cell(1, 0), Some(&Cell::Empty));
        assert_eq!(a.cell(1, 1), Some(&Cell::text("2")));
        assert_eq!(a.rows()[1].period, may);
    }

    #[test]
    fn test_append_into_empty_table_takes_other() {
        let mut empty = Table::default();
        let t = table(&["A"], &[(&["1"], Period::from_month_year(1, 2022))]);
        empty.append(t.clone());
        assert_eq!(empty, t);
    }

    #[test]
    fn test_drop_blank_rows_and_period_column() {
        let apr = Period::from_month_year(4, 2021);
        let mut t = table(
            &["A", "B"],
            &[(&["", "  "], apr.clone()), (&["x", ""], apr.clone())],
        );
        t.drop_blank_rows();
        assert_eq!(t.len(), 1);

        t.ensure_period_column();
        t.ensure_period_column();
        assert_eq!(t.labels().filter(|l| *l == MONTH_COLUMN).count(), 1);
        assert_eq!(t.cell(0, 2), Some(&Cell::text("Apr-21")));
    }

    #[test]
    fn test_excel_serial_conversion() {
        let dt = excel_serial_to_datetime(44291.0).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2021, 4, 5).unwrap());
        let noon = excel_serial_to_datetime(44291.5).unwrap();
        assert_eq!(noon.format("%H:%M").to_string(), "12:00");
        assert!(excel_serial_to_datetime(-1.0).is_none());
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(Cell::Number(1500.0).render(), "1500");
        assert_eq!(Cell::Number(12.5).render(), "12.5");
        let d = NaiveDate::from_ymd_opt(2021, 4, 5)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Cell::Date(d).render(), "05-04-2021");
        assert_eq!(Cell::Date(d).date_text().as_deref(), Some("2021-04-05 00:00:00"));
        assert_eq!(Cell::text("  ").date_text(), None);
    }
}
