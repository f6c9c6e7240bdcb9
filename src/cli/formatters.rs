//! Output formatting module for CLI display
//!
//! Turns projects, uploads, runs and sheet listings into terminal tables.
//! Callers choose between these and `serde_json` output.

use colored::Colorize;
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

use gstbook::db::models::{FileFamily, Project, RunRecord, UploadedFile};
use gstbook::engine::{RunSummary, SectionStatus};
use gstbook::importers::SheetListing;
use gstbook::period::{fiscal_months, Period};

/// Which months of the project's financial year have an upload, per family
#[derive(Debug, Clone, Serialize)]
pub struct FamilyCoverage {
    pub family: FileFamily,
    pub months: Vec<MonthCoverage>,
    /// Uploads whose month falls outside the project's financial year
    pub outside_year: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthCoverage {
    pub period: String,
    pub uploaded: bool,
}

impl FamilyCoverage {
    pub fn uploaded_count(&self) -> usize {
        self.months.iter().filter(|m| m.uploaded).count()
    }

    pub fn completion_pct(&self) -> f64 {
        if self.months.is_empty() {
            return 0.0;
        }
        self.uploaded_count() as f64 * 100.0 / self.months.len() as f64
    }
}

pub fn month_coverage(project: &Project, uploads: &[UploadedFile]) -> Vec<FamilyCoverage> {
    let months = fiscal_months(&project.financial_year).unwrap_or_default();
    FileFamily::all()
        .into_iter()
        .map(|family| {
            let mine: Vec<_> = uploads.iter().filter(|u| u.family == family).collect();
            let covered = months
                .iter()
                .map(|&(month, year)| MonthCoverage {
                    period: Period::from_month_year(month, year).label(),
                    uploaded: mine.iter().any(|u| u.month == month && u.year == year),
                })
                .collect();
            let outside_year = mine
                .iter()
                .filter(|u| !months.contains(&(u.month, u.year)))
                .count();
            FamilyCoverage {
                family,
                months: covered,
                outside_year,
            }
        })
        .collect()
}

pub fn format_projects_table(projects: &[Project]) -> String {
    if projects.is_empty() {
        return format!(
            "{} No projects yet. Create one with `gstbook project create`.",
            "ℹ".blue().bold()
        );
    }

    #[derive(Tabled)]
    struct ProjectRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "GSTIN")]
        gstin: String,
        #[tabled(rename = "FY")]
        fy: String,
        #[tabled(rename = "Id")]
        id: String,
        #[tabled(rename = "Created")]
        created: String,
    }

    let rows: Vec<ProjectRow> = projects
        .iter()
        .map(|p| ProjectRow {
            name: p.name.clone(),
            gstin: p.gstin.clone(),
            fy: p.financial_year.clone(),
            id: p.id.clone(),
            created: p.created_at.format("%Y-%m-%d %H:%M").to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn format_coverage_grid(project: &Project, coverage: &[FamilyCoverage]) -> String {
    let mut output = format!(
        "\n{} {} ({}) - FY {}\n\n",
        "📊".cyan().bold(),
        project.name.bold(),
        project.gstin,
        project.financial_year
    );

    let mut builder = Builder::default();
    let mut header = vec!["Return".to_string()];
    if let Some(first) = coverage.first() {
        header.extend(first.months.iter().map(|m| m.period.clone()));
    }
    header.push("Done".to_string());
    builder.push_record(header);

    for family in coverage {
        let mut record = vec![family.family.form_name().to_string()];
        record.extend(family.months.iter().map(|m| {
            if m.uploaded {
                "✓".green().to_string()
            } else {
                "·".bright_black().to_string()
            }
        }));
        record.push(format!("{:.0}%", family.completion_pct()));
        builder.push_record(record);
    }

    let table = builder
        .build()
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..)).with(Alignment::center()))
        .to_string();
    output.push_str(&table);

    for family in coverage.iter().filter(|f| f.outside_year > 0) {
        output.push_str(&format!(
            "\n{} {} upload(s) outside FY {}: {}",
            "⚠".yellow().bold(),
            family.family.form_name(),
            project.financial_year,
            family.outside_year
        ));
    }
    output
}

pub fn format_upload_accepted(
    project: &Project,
    upload: &UploadedFile,
    replaced: Option<&UploadedFile>,
) -> String {
    let period = Period::from_month_year(upload.month, upload.year);
    let mut output = format!(
        "{} {} {} for {} stored in {}",
        "✓".green().bold(),
        upload.family.form_name(),
        period.label().bold(),
        project.name,
        upload.locator.display()
    );
    if let Some(old) = replaced {
        output.push_str(&format!(
            "\n{} Replaced earlier upload {}",
            "ℹ".blue().bold(),
            old.original_name
        ));
    }
    output
}

fn status_text(status: SectionStatus) -> String {
    match status {
        SectionStatus::Generated => "generated".green().to_string(),
        SectionStatus::NoRecords => "no records".bright_black().to_string(),
        SectionStatus::Error => "error".red().to_string(),
    }
}

pub fn format_run_summary(summary: &RunSummary) -> String {
    #[derive(Tabled)]
    struct SectionRow {
        #[tabled(rename = "Return")]
        form: String,
        #[tabled(rename = "Section")]
        key: String,
        #[tabled(rename = "Sheet")]
        sheet: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Files")]
        files: usize,
        #[tabled(rename = "Records")]
        records: usize,
        #[tabled(rename = "Wrong Month")]
        anomalies: usize,
    }

    let rows: Vec<SectionRow> = summary
        .families
        .iter()
        .flat_map(|family| {
            family
                .outcomes
                .iter()
                .filter(|o| o.status != SectionStatus::NoRecords)
                .map(move |o| SectionRow {
                    form: family.family.form_name().to_string(),
                    key: o.key.clone(),
                    sheet: summary
                        .sheets
                        .iter()
                        .find(|s| s.family == family.family && s.group == o.output_group)
                        .map(|s| s.name.clone())
                        .unwrap_or_else(|| "-".to_string()),
                    status: status_text(o.status),
                    files: o.files_with_data,
                    records: o.records,
                    anomalies: o.anomalies,
                })
        })
        .collect();

    let mut output = format!(
        "\n{} Analysis run {} {}\n\n",
        "📊".cyan().bold(),
        summary.run_id,
        summary.status.to_string().green()
    );

    if rows.is_empty() {
        output.push_str("No section of any upload had records.\n");
    } else {
        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
            .to_string();
        output.push_str(&table);
        output.push('\n');
    }

    for family in &summary.families {
        let anomalies = if family.total_anomalies > 0 {
            family.total_anomalies.to_string().yellow().bold()
        } else {
            family.total_anomalies.to_string().normal()
        };
        output.push_str(&format!(
            "\n{:<10} {} file(s), {} sheet(s), {} record(s), {} wrong month",
            family.family.form_name().bold(),
            family.files_processed,
            family.sheets_created,
            family.total_records,
            anomalies
        ));
    }
    output.push_str(&format!(
        "\n\n{} Workbook: {}\n",
        "✓".green().bold(),
        summary.output_path.display()
    ));
    output
}

pub fn format_runs_table(runs: &[RunRecord]) -> String {
    if runs.is_empty() {
        return format!("{} No analysis runs yet.", "ℹ".blue().bold());
    }

    #[derive(Tabled)]
    struct RunRow {
        #[tabled(rename = "Run")]
        id: String,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Started")]
        started: String,
        #[tabled(rename = "Output / Error")]
        detail: String,
    }

    let rows: Vec<RunRow> = runs
        .iter()
        .map(|r| RunRow {
            id: r.id.chars().take(8).collect(),
            status: r.status.to_string(),
            started: r.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            detail: r
                .output_file_name
                .clone()
                .or_else(|| r.error_message.clone())
                .unwrap_or_default(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn format_sheet_listing(file: &str, listings: &[SheetListing]) -> String {
    let mut output = format!("{} Inspecting file: {}\n", "📊".cyan().bold(), file.green());
    for listing in listings {
        output.push_str(&format!(
            "\n{} {} ({} sheet(s))\n",
            "📄".cyan().bold(),
            listing.source.yellow().bold(),
            listing.sheets.len()
        ));
        for name in &listing.sheets {
            output.push_str(&format!("  • {}\n", name));
        }
    }
    output
}

pub fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn project() -> Project {
        Project {
            id: "p1".to_string(),
            name: "Acme".to_string(),
            gstin: "27ABCDE1234F1Z5".to_string(),
            financial_year: "2021-22".to_string(),
            created_at: Utc::now(),
        }
    }

    fn upload(family: FileFamily, month: u32, year: i32) -> UploadedFile {
        UploadedFile {
            id: format!("{}-{}-{}", family.as_str(), month, year),
            project_id: "p1".to_string(),
            family,
            month,
            year,
            original_name: "x.xlsx".to_string(),
            locator: PathBuf::from("x.xlsx"),
            size: 0,
        }
    }

    #[test]
    fn test_month_coverage_counts_per_family() {
        let uploads = vec![
            upload(FileFamily::A, 4, 2021),
            upload(FileFamily::A, 3, 2022),
            upload(FileFamily::A, 4, 2022),
            upload(FileFamily::B, 12, 2021),
        ];
        let coverage = month_coverage(&project(), &uploads);
        assert_eq!(coverage.len(), 2);

        let a = &coverage[0];
        assert_eq!(a.family, FileFamily::A);
        assert_eq!(a.uploaded_count(), 2);
        assert_eq!(a.outside_year, 1);
        assert_eq!(a.months[0].period, "Apr-21");
        assert!(a.months[0].uploaded && a.months[11].uploaded);

        let b = &coverage[1];
        assert_eq!(b.uploaded_count(), 1);
        assert!((b.completion_pct() - 100.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_listings_render_hints() {
        colored::control::set_override(false);
        assert!(format_projects_table(&[]).contains("No projects yet"));
        assert!(format_runs_table(&[]).contains("No analysis runs"));
    }
}
