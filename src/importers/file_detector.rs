use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::db::models::FileFamily;
use crate::error::ConsolidationError;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

static GSTR1_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^GSTR1_([A-Z0-9]{15})_(\d{6})_Inv(?:_(\d+))?").expect("valid regex")
});
static GSTR2A_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z0-9]{15})_(\d{6})_R2A").expect("valid regex"));
static GSTIN_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][0-9][A-Z][A-Z0-9]$").expect("valid regex")
});

/// Physical shape of an uploaded export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A single workbook
    Spreadsheet,
    /// A zip archive holding one or more workbooks
    Bundle,
}

/// Decide whether a file is a workbook or a bundle of workbooks.
///
/// The extension decides first. Files with any other extension are sniffed for
/// the zip signature; OOXML workbooks are zips too, so those are told apart by
/// their `[Content_Types].xml` part.
pub fn detect_source_kind<P: AsRef<Path>>(path: P) -> Result<SourceKind> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => return Ok(SourceKind::Spreadsheet),
        "zip" => return Ok(SourceKind::Bundle),
        _ => {}
    }

    let mut magic = [0u8; 4];
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let read = file.read(&mut magic)?;
    if read < magic.len() || magic != ZIP_MAGIC {
        return Err(ConsolidationError::InputFormat(format!(
            "{} is neither a spreadsheet nor a zip bundle",
            path.display()
        ))
        .into());
    }

    let archive = zip::ZipArchive::new(File::open(path)?)
        .with_context(|| format!("Failed to read zip directory of {}", path.display()))?;
    if archive.file_names().any(|n| n == "[Content_Types].xml") {
        // Workbook without a recognizable extension; calamine dispatches on it
        return Err(ConsolidationError::InputFormat(format!(
            "{} looks like a workbook but has no .xlsx extension",
            path.display()
        ))
        .into());
    }

    debug!("Detected zip bundle by signature: {}", path.display());
    Ok(SourceKind::Bundle)
}

/// Fields carried by a standard portal export file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadName {
    pub family: FileFamily,
    pub gstin: String,
    pub month: u32,
    pub year: i32,
    /// Invoice part number for split GSTR-1 exports (`_Inv_2`)
    pub part: Option<u32>,
}

/// Parse a portal export name.
///
/// Recognized shapes:
/// - `GSTR1_<GSTIN>_<MMYYYY>_Inv[_n]` (family A)
/// - `<GSTIN>_<MMYYYY>_R2A` (family B)
pub fn parse_upload_name(file_name: &str) -> Result<UploadName> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let upper = base.to_ascii_uppercase();

    let (family, caps) = if upper.contains("GSTR1") {
        let caps = GSTR1_NAME.captures(base).ok_or_else(|| {
            ConsolidationError::InputFormat(format!(
                "'{}' does not follow GSTR1_<GSTIN>_<MMYYYY>_Inv[_n]",
                base
            ))
        })?;
        (FileFamily::A, caps)
    } else if upper.contains("R2A") || upper.contains("GSTR2A") {
        let caps = GSTR2A_NAME.captures(base).ok_or_else(|| {
            ConsolidationError::InputFormat(format!(
                "'{}' does not follow <GSTIN>_<MMYYYY>_R2A",
                base
            ))
        })?;
        (FileFamily::B, caps)
    } else {
        return Err(ConsolidationError::InputFormat(format!(
            "cannot tell the return type of '{}'; expected a GSTR1 or R2A export name",
            base
        ))
        .into());
    };

    let gstin = caps[1].to_string();
    let period = &caps[2];
    let month: u32 = period[..2].parse().map_err(|_| anyhow!("bad month in '{}'", base))?;
    let year: i32 = period[2..].parse().map_err(|_| anyhow!("bad year in '{}'", base))?;
    if !(1..=12).contains(&month) {
        return Err(ConsolidationError::InputFormat(format!(
            "invalid month {:02} in '{}'",
            month, base
        ))
        .into());
    }
    if !(2017..=2030).contains(&year) {
        return Err(ConsolidationError::InputFormat(format!(
            "year {} in '{}' is outside 2017-2030",
            year, base
        ))
        .into());
    }
    let part = caps.get(3).and_then(|m| m.as_str().parse().ok());

    Ok(UploadName {
        family,
        gstin,
        month,
        year,
        part,
    })
}

/// Structural GSTIN check: 15 characters, `99AAAAA9999A9A?` shape, state code 01-38
pub fn is_valid_gstin(gstin: &str) -> bool {
    let gstin = gstin.trim().to_ascii_uppercase();
    if !GSTIN_FORMAT.is_match(&gstin) {
        return false;
    }
    matches!(gstin[..2].parse::<u32>(), Ok(1..=38))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_parse_gstr1_names() {
        let parsed = parse_upload_name("GSTR1_27ABCDE1234F1Z5_042021_Inv.zip").unwrap();
        assert_eq!(parsed.family, FileFamily::A);
        assert_eq!(parsed.gstin, "27ABCDE1234F1Z5");
        assert_eq!((parsed.month, parsed.year), (4, 2021));
        assert_eq!(parsed.part, None);

        let split = parse_upload_name("uploads/GSTR1_27ABCDE1234F1Z5_112021_Inv_2.xlsx").unwrap();
        assert_eq!(split.part, Some(2));
        assert_eq!(split.month, 11);
    }

    #[test]
    fn test_parse_gstr2a_names() {
        let parsed = parse_upload_name("27ABCDE1234F1Z5_012022_R2A.zip").unwrap();
        assert_eq!(parsed.family, FileFamily::B);
        assert_eq!((parsed.month, parsed.year), (1, 2022));
    }

    #[test]
    fn test_parse_rejects_bad_periods_and_shapes() {
        assert!(parse_upload_name("GSTR1_27ABCDE1234F1Z5_132021_Inv.zip").is_err());
        assert!(parse_upload_name("GSTR1_27ABCDE1234F1Z5_042016_Inv.zip").is_err());
        assert!(parse_upload_name("GSTR1_SHORT_042021_Inv.zip").is_err());
        let err = parse_upload_name("random.xlsx").unwrap_err();
        assert!(err.to_string().contains("cannot tell the return type"));
    }

    #[test]
    fn test_gstin_structure() {
        assert!(is_valid_gstin("27ABCDE1234F1Z5"));
        assert!(is_valid_gstin(" 27abcde1234f1z5 "));
        assert!(!is_valid_gstin("99ABCDE1234F1Z5"));
        assert!(!is_valid_gstin("27ABCDE1234F1Z"));
    }

    #[test]
    fn test_detect_by_extension_and_signature() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            detect_source_kind(dir.path().join("a.XLSX")).unwrap(),
            SourceKind::Spreadsheet
        );
        assert_eq!(
            detect_source_kind(dir.path().join("a.zip")).unwrap(),
            SourceKind::Bundle
        );

        let bundle = dir.path().join("export.bin");
        {
            let mut writer = zip::ZipWriter::new(File::create(&bundle).unwrap());
            writer
                .start_file("b2b.xlsx", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"placeholder").unwrap();
            writer.finish().unwrap();
        }
        assert_eq!(detect_source_kind(&bundle).unwrap(), SourceKind::Bundle);

        let text = dir.path().join("notes.txt");
        std::fs::write(&text, "hello world").unwrap();
        assert!(detect_source_kind(&text).is_err());
    }
}
