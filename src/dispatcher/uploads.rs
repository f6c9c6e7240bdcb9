use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};
use uuid::Uuid;

use super::open_store;
use crate::cli::formatters;
use gstbook::config::Config;
use gstbook::db::models::{FileFamily, Project, UploadedFile};
use gstbook::db::{RunStore, SqliteStore};
use gstbook::importers::{parse_upload_name, SourceFile};

/// Values given on the command line; they win over the file name
#[derive(Debug, Clone, Default)]
pub struct UploadOverrides {
    pub family: Option<String>,
    pub month: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct UploadTarget {
    pub family: FileFamily,
    pub month: u32,
    pub year: i32,
}

/// Work out family and period for an upload from its name and the overrides.
///
/// A standard export name must belong to the project's GSTIN.
pub(super) fn resolve_target(
    file_name: &str,
    project: &Project,
    overrides: &UploadOverrides,
) -> Result<UploadTarget> {
    let complete = overrides.family.is_some() && overrides.month.is_some() && overrides.year.is_some();
    let parsed = match parse_upload_name(file_name) {
        Ok(parsed) => Some(parsed),
        Err(_) if complete => None,
        Err(e) => {
            return Err(e.context("pass --family, --month and --year for non-standard file names"))
        }
    };

    if let Some(parsed) = &parsed {
        if !parsed.gstin.eq_ignore_ascii_case(&project.gstin) {
            bail!(
                "'{}' belongs to GSTIN {}, project {} is {}",
                file_name,
                parsed.gstin,
                project.name,
                project.gstin
            );
        }
    }

    let family = match &overrides.family {
        Some(text) => FileFamily::from_str(text)
            .map_err(|_| anyhow!("unknown return family '{}' (use A or B)", text))?,
        None => parsed.as_ref().map(|p| p.family).ok_or_else(|| anyhow!("missing family"))?,
    };
    let month = overrides
        .month
        .or(parsed.as_ref().map(|p| p.month))
        .ok_or_else(|| anyhow!("missing month"))?;
    let year = overrides
        .year
        .or(parsed.as_ref().map(|p| p.year))
        .ok_or_else(|| anyhow!("missing year"))?;

    if !(1..=12).contains(&month) {
        bail!("month must be between 1 and 12, got {}", month);
    }
    Ok(UploadTarget {
        family,
        month,
        year,
    })
}

/// Copy an accepted file under the uploads directory and register it
pub(super) fn store_upload(
    config: &Config,
    store: &SqliteStore,
    project: &Project,
    source: &Path,
    target: UploadTarget,
) -> Result<(UploadedFile, Option<UploadedFile>)> {
    let original_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} is not a file", source.display()))?;
    // refuse anything that is neither a workbook nor a bundle before copying
    SourceFile::open(source)?;

    let id = Uuid::new_v4().to_string();
    let extension = source
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "zip".to_string());
    std::fs::create_dir_all(&config.uploads_dir)
        .with_context(|| format!("Failed to create {}", config.uploads_dir.display()))?;
    let locator = config.uploads_dir.join(format!("{}.{}", id, extension));
    let size = std::fs::copy(source, &locator)
        .with_context(|| format!("Failed to copy {} into the data directory", source.display()))?;

    let upload = UploadedFile {
        id,
        project_id: project.id.clone(),
        family: target.family,
        month: target.month,
        year: target.year,
        original_name,
        locator,
        size,
    };
    let replaced = match store.record_upload(&upload) {
        Ok(replaced) => replaced,
        Err(e) => {
            // the copy is unreachable without its row
            if let Err(rm) = std::fs::remove_file(&upload.locator) {
                warn!("Could not remove unregistered copy {}: {}", upload.locator.display(), rm);
            }
            return Err(e.into());
        }
    };

    if let Some(old) = &replaced {
        if old.locator.starts_with(&config.uploads_dir) {
            if let Err(e) = std::fs::remove_file(&old.locator) {
                warn!("Could not remove replaced upload {}: {}", old.locator.display(), e);
            }
        }
    }
    info!(
        "Stored {} upload {:02}/{} for {}",
        upload.family, upload.month, upload.year, project.name
    );
    Ok((upload, replaced))
}

pub async fn dispatch_upload(
    project_ref: &str,
    file: &str,
    overrides: UploadOverrides,
    json_output: bool,
) -> Result<()> {
    let source = Path::new(file);
    if !source.is_file() {
        bail!("File not found: {}", file);
    }

    let (config, store) = open_store()?;
    let project = store.require_project(project_ref)?;
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());
    let target = resolve_target(&file_name, &project, &overrides)?;
    let (upload, replaced) = store_upload(&config, &store, &project, source, target)?;

    if json_output {
        let payload = serde_json::json!({
            "upload": upload,
            "replaced": replaced,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!(
            "{}",
            formatters::format_upload_accepted(&project, &upload, replaced.as_ref())
        );
    }
    Ok(())
}

pub async fn dispatch_status(project_ref: &str, json_output: bool) -> Result<()> {
    let (_, store) = open_store()?;
    let project = store.require_project(project_ref)?;
    let uploads = store.uploads(&project.id)?;
    let coverage = formatters::month_coverage(&project, &uploads);

    if json_output {
        let payload = serde_json::json!({
            "project": project,
            "uploads": uploads.len(),
            "coverage": coverage,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("{}", formatters::format_coverage_grid(&project, &coverage));
    }
    Ok(())
}
