//! Utility functions for spreadsheet addressing and text measurement
//!
//! Centralizes the small conversions shared by the importers and the report
//! writer: column letters, display widths, and worksheet-safe names.

use unicode_width::UnicodeWidthStr;

use crate::taxonomy::MAX_SHEET_NAME_LEN;

/// Zero-based column index for a spreadsheet column letter.
///
/// # Examples
/// ```
/// use gstbook::utils::column_index;
///
/// assert_eq!(column_index("A"), Some(0));
/// assert_eq!(column_index("d"), Some(3));
/// assert_eq!(column_index("AA"), Some(26));
/// assert_eq!(column_index("4"), None);
/// ```
pub fn column_index(letters: &str) -> Option<usize> {
    let letters = letters.trim();
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut index = 0usize;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        index = index * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    Some(index - 1)
}

/// Spreadsheet column letter for a zero-based index.
///
/// # Examples
/// ```
/// use gstbook::utils::column_letter;
///
/// assert_eq!(column_letter(0), "A");
/// assert_eq!(column_letter(25), "Z");
/// assert_eq!(column_letter(27), "AB");
/// ```
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Rendered width of a value in terminal/spreadsheet columns
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Make a name acceptable as a worksheet name: strip forbidden characters and
/// cut to the 31-character limit.
pub fn sheet_safe_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'');
    let truncated: String = cleaned.chars().take(MAX_SHEET_NAME_LEN).collect();
    if truncated.is_empty() {
        "Sheet".to_string()
    } else {
        truncated
    }
}

/// Pick a worksheet name not already in `taken` (case-insensitive, as Excel compares).
pub fn unique_sheet_name(base: &str, suffix: &str, taken: &[String]) -> String {
    let is_taken = |candidate: &str| taken.iter().any(|t| t.eq_ignore_ascii_case(candidate));

    let first = sheet_safe_name(base);
    if !is_taken(&first) {
        return first;
    }

    let mut n = 1;
    loop {
        let tag = if n == 1 {
            format!(" ({})", suffix)
        } else {
            format!(" ({} {})", suffix, n)
        };
        let room = MAX_SHEET_NAME_LEN.saturating_sub(tag.chars().count());
        let stem: String = first.chars().take(room).collect();
        let candidate = format!("{}{}", stem.trim_end(), tag);
        if !is_taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Pluralize a count with a noun: `1 row`, `3 rows`
pub fn count_noun(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}
