//! Date-vs-period check for sections that carry a transaction date

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::period::Period;
use crate::table::{Cell, Table, VALIDATION_COLUMN};

/// Tried in order; the first calendar-valid match wins
static DATE_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"(\d{2})[/-](\d{2})[/-](\d{4})").expect("valid regex"),
        Regex::new(r"(\d{4})[/-](\d{2})[/-](\d{2})").expect("valid regex"),
        Regex::new(r"(\d{1,2})[/-](\d{1,2})[/-](\d{4})").expect("valid regex"),
    ]
});

/// Per-row outcome written to the `Month Validation` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationLabel {
    NoDate,
    InvalidDate,
    CorrectMonth,
    WrongMonth,
    Error,
}

impl ValidationLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLabel::NoDate => "NO DATE",
            ValidationLabel::InvalidDate => "INVALID DATE",
            ValidationLabel::CorrectMonth => "CORRECT MONTH",
            ValidationLabel::WrongMonth => "WRONG MONTH",
            ValidationLabel::Error => "ERROR",
        }
    }
}

impl fmt::Display for ValidationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row counts per label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationTally {
    pub no_date: usize,
    pub invalid_date: usize,
    pub correct_month: usize,
    pub wrong_month: usize,
    pub error: usize,
}

impl ValidationTally {
    pub fn record(&mut self, label: ValidationLabel) {
        match label {
            ValidationLabel::NoDate => self.no_date += 1,
            ValidationLabel::InvalidDate => self.invalid_date += 1,
            ValidationLabel::CorrectMonth => self.correct_month += 1,
            ValidationLabel::WrongMonth => self.wrong_month += 1,
            ValidationLabel::Error => self.error += 1,
        }
    }

    pub fn absorb(&mut self, other: &ValidationTally) {
        self.no_date += other.no_date;
        self.invalid_date += other.invalid_date;
        self.correct_month += other.correct_month;
        self.wrong_month += other.wrong_month;
        self.error += other.error;
    }

    /// Rows with no usable date at all
    pub fn undated(&self) -> usize {
        self.no_date + self.invalid_date
    }

    pub fn total(&self) -> usize {
        self.no_date + self.invalid_date + self.correct_month + self.wrong_month + self.error
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Rows labelled `WRONG MONTH`
    pub mismatch_count: usize,
    pub tally: ValidationTally,
}

/// Pull the first plausible calendar date out of free text.
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use gstbook::engine::validate::parse_date_text;
///
/// let d = NaiveDate::from_ymd_opt(2021, 4, 5).unwrap();
/// assert_eq!(parse_date_text("05-04-2021"), Some(d));
/// assert_eq!(parse_date_text("Inv dt 2021/04/05"), Some(d));
/// assert_eq!(parse_date_text("5/4/2021"), Some(d));
/// assert_eq!(parse_date_text("31-02-2021"), None);
/// ```
pub fn parse_date_text(text: &str) -> Option<NaiveDate> {
    DATE_PATTERNS.iter().find_map(|re| {
        let caps = re.captures(text)?;
        let (first, second, third) = (&caps[1], &caps[2], &caps[3]);
        let (year, month, day) = if first.len() == 4 {
            (first.parse().ok()?, second.parse().ok()?, third.parse().ok()?)
        } else {
            (third.parse().ok()?, second.parse().ok()?, first.parse().ok()?)
        };
        NaiveDate::from_ymd_opt(year, month, day)
    })
}

/// Label one row: its raw date text against its own filing period
pub fn classify(date_text: Option<&str>, period: &Period) -> ValidationLabel {
    let Some(text) = date_text.filter(|t| !t.trim().is_empty()) else {
        return ValidationLabel::NoDate;
    };
    let Some(date) = parse_date_text(text) else {
        return ValidationLabel::InvalidDate;
    };
    if !period.is_valid() {
        return ValidationLabel::Error;
    }
    if Period::from_date(date) == *period {
        ValidationLabel::CorrectMonth
    } else {
        ValidationLabel::WrongMonth
    }
}

/// Label every row and append the `Month Validation` column.
///
/// `date_column` is the table position of the date column; when the column is
/// absent every row is `NO DATE`.
pub fn validate(table: &mut Table, date_column: Option<usize>) -> ValidationReport {
    let mut tally = ValidationTally::default();
    let labels: Vec<Cell> = table
        .rows()
        .iter()
        .map(|row| {
            let text = date_column
                .and_then(|pos| row.cells.get(pos))
                .and_then(Cell::date_text);
            let label = classify(text.as_deref(), &row.period);
            tally.record(label);
            Cell::text(label.as_str())
        })
        .collect();

    table.set_column(VALIDATION_COLUMN, labels);
    ValidationReport {
        mismatch_count: tally.wrong_month,
        tally,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Column;

    fn dated_table(dates: &[Cell], period: Period) -> Table {
        let mut t = Table::new(vec![
            Column::new("Invoice", Some(0)),
            Column::new("Invoice date", Some(3)),
        ]);
        for (i, d) in dates.iter().enumerate() {
            t.push_row(vec![Cell::text(format!("INV-{}", i)), d.clone()], period.clone());
        }
        t
    }

    #[test]
    fn test_parse_chain_order() {
        // day-first wins over the looser single-digit form
        assert_eq!(
            parse_date_text("10/11/2021"),
            NaiveDate::from_ymd_opt(2021, 11, 10)
        );
        // an impossible first match falls through to the next pattern
        assert_eq!(
            parse_date_text("2021-13-01 or 1-2-2021"),
            NaiveDate::from_ymd_opt(2021, 2, 1)
        );
        assert_eq!(parse_date_text("no date here"), None);
    }

    #[test]
    fn test_classify_labels() {
        let apr = Period::from_month_year(4, 2021);
        assert_eq!(classify(None, &apr), ValidationLabel::NoDate);
        assert_eq!(classify(Some("  "), &apr), ValidationLabel::NoDate);
        assert_eq!(classify(Some("soon"), &apr), ValidationLabel::InvalidDate);
        assert_eq!(classify(Some("05-04-2021"), &apr), ValidationLabel::CorrectMonth);
        assert_eq!(classify(Some("05-05-2021"), &apr), ValidationLabel::WrongMonth);
        // same month number, different year
        assert_eq!(classify(Some("05-04-2022"), &apr), ValidationLabel::WrongMonth);
        let bad = Period::from_month_year(13, 2021);
        assert_eq!(classify(Some("05-04-2021"), &bad), ValidationLabel::Error);
    }

    #[test]
    fn test_validate_appends_column_and_counts_mismatches() {
        let dec = Period::from_month_year(12, 2021);
        let nov_date = NaiveDate::from_ymd_opt(2021, 11, 30)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut table = dated_table(
            &[Cell::text("02-12-2021"), Cell::Date(nov_date), Cell::Empty],
            dec,
        );
        let report = validate(&mut table, Some(1));

        assert_eq!(report.mismatch_count, 1);
        assert_eq!(report.tally.correct_month, 1);
        assert_eq!(report.tally.no_date, 1);
        assert_eq!(report.tally.total(), 3);

        let pos = table.position(VALIDATION_COLUMN).unwrap();
        assert_eq!(pos, 2);
        assert_eq!(table.cell(1, pos), Some(&Cell::text("WRONG MONTH")));
        assert_eq!(table.cell(2, pos), Some(&Cell::text("NO DATE")));
    }

    #[test]
    fn test_missing_date_column_marks_every_row() {
        let mut table = dated_table(&[Cell::text("02-12-2021")], Period::from_month_year(12, 2021));
        let report = validate(&mut table, None);
        assert_eq!(report.mismatch_count, 0);
        assert_eq!(report.tally.no_date, 1);
    }
}
