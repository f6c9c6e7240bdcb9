//! Filing-period calendar
//!
//! Converts calendar months into fiscal-year order (April first, March last)
//! and into the canonical `Mmm-YY` period label used across the report.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

static MMYYYY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{2})(\d{4})").expect("valid regex"));
static MM_DASH_YYYY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})-(\d{4})").expect("valid regex"));
static NAMED_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]{3})[A-Za-z]*[-\s](\d{2}|\d{4})$").expect("valid regex"));

/// Position of a calendar month inside the fiscal year (Apr=1 .. Mar=12).
pub fn fiscal_rank(month: u32) -> Option<u32> {
    match month {
        4..=12 => Some(month - 3),
        1..=3 => Some(month + 9),
        _ => None,
    }
}

/// Sort key placing a (month, year) pair in fiscal-year chronological order.
///
/// January to March belong to the fiscal year that started the previous April,
/// so Dec 2021 sorts before Jan 2022 but both sort after Apr 2021. Months outside
/// 1..=12 sort after every valid period.
pub fn fiscal_sort_key(month: u32, year: i32) -> (i32, u32) {
    match fiscal_rank(month) {
        Some(rank) if month >= 4 => (year, rank),
        Some(rank) => (year - 1, rank),
        None => (i32::MAX, month),
    }
}

/// Financial year label (`2021-22`) containing the given calendar month.
pub fn financial_year_label(month: u32, year: i32) -> String {
    let start = if month >= 4 { year } else { year - 1 };
    format!("{}-{:02}", start, (start + 1).rem_euclid(100))
}

/// The twelve (month, year) pairs of a financial year label such as `2021-22`,
/// April first.
pub fn fiscal_months(financial_year: &str) -> Option<Vec<(u32, i32)>> {
    let (start, end) = financial_year.trim().split_once('-')?;
    let start: i32 = start.parse().ok()?;
    let end: i32 = end.parse().ok()?;
    if end != (start + 1).rem_euclid(100) && end != start + 1 {
        return None;
    }
    let months = (4..=12)
        .map(|m| (m, start))
        .chain((1..=3).map(|m| (m, start + 1)))
        .collect();
    Some(months)
}

/// A filing period as it appears on report rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Period {
    /// A real calendar month
    Month { month: u32, year: i32 },
    /// Month number outside 1..=12; kept explicit instead of wrapping
    Invalid { year: i32 },
    /// A file name that carried no recognizable period
    Unrecognized(String),
}

impl Period {
    pub fn from_month_year(month: u32, year: i32) -> Self {
        if (1..=12).contains(&month) {
            Period::Month { month, year }
        } else {
            Period::Invalid { year }
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Period::Month {
            month: date.month(),
            year: date.year(),
        }
    }

    /// Best-effort period extraction from a free-form file name.
    ///
    /// Looks for a contiguous `MMYYYY` run first, then `MM-YYYY`. Falls back to
    /// the name itself with spreadsheet/bundle extensions stripped.
    pub fn from_file_name(name: &str) -> Self {
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        for re in [&*MMYYYY, &*MM_DASH_YYYY] {
            if let Some(caps) = re.captures(base) {
                let month: u32 = caps[1].parse().unwrap_or(0);
                let year: i32 = caps[2].parse().unwrap_or(0);
                return Period::from_month_year(month, year);
            }
        }
        let stripped = base
            .replace(".xlsx", "")
            .replace(".xls", "")
            .replace(".zip", "");
        Period::Unrecognized(stripped)
    }

    /// Parse a declared-period cell such as `Apr-21`, `April-2021`, `042021` or `04-2021`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(caps) = NAMED_LABEL.captures(text) {
            let index = MONTH_NAMES
                .iter()
                .position(|m| m.eq_ignore_ascii_case(&caps[1]))?;
            let month = index as u32 + 1;
            let year: i32 = caps[2].parse().ok()?;
            let year = if year < 100 { 2000 + year } else { year };
            return Some(Period::Month { month, year });
        }
        let digits_only = text.len() == 6 && text.chars().all(|c| c.is_ascii_digit());
        let dashed = text.len() == 7 && MM_DASH_YYYY.is_match(text);
        if digits_only || dashed {
            match Period::from_file_name(text) {
                p @ Period::Month { .. } => return Some(p),
                _ => return None,
            }
        }
        None
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Period::Month { .. })
    }

    /// Canonical display label, e.g. `Apr-21`.
    pub fn label(&self) -> String {
        match self {
            Period::Month { month, year } => match month
                .checked_sub(1)
                .and_then(|i| MONTH_NAMES.get(i as usize))
            {
                Some(name) => format!("{}-{:02}", name, year.rem_euclid(100)),
                None => format!("Invalid-{}", year),
            },
            Period::Invalid { year } => format!("Invalid-{}", year),
            Period::Unrecognized(name) => name.clone(),
        }
    }

    /// Fiscal-year sort key; non-month periods sort last.
    pub fn sort_key(&self) -> (i32, u32) {
        match self {
            Period::Month { month, year } => fiscal_sort_key(*month, *year),
            _ => (i32::MAX, u32::MAX),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
