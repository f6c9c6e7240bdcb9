use anyhow::{bail, Result};
use colored::Colorize;

use super::open_store;
use crate::cli::formatters;
use gstbook::importers::is_valid_gstin;
use gstbook::period::fiscal_months;

pub async fn dispatch_create(name: &str, gstin: &str, fy: &str, json_output: bool) -> Result<()> {
    let gstin = gstin.trim().to_ascii_uppercase();
    if !is_valid_gstin(&gstin) {
        bail!("'{}' is not a valid GSTIN", gstin);
    }
    if fiscal_months(fy).is_none() {
        bail!("'{}' is not a financial year label like 2021-22", fy);
    }
    if name.trim().is_empty() {
        bail!("Project name cannot be empty");
    }

    let (_, store) = open_store()?;
    if store.find_project(name.trim())?.is_some() {
        bail!("A project named '{}' already exists", name.trim());
    }
    let project = store.create_project(name, &gstin, fy)?;

    if json_output {
        println!("{}", formatters::to_json(&project));
    } else {
        println!(
            "{} Created project {} ({}, FY {})",
            "✓".green().bold(),
            project.name.bold(),
            project.gstin,
            project.financial_year
        );
        println!("  id: {}", project.id);
    }
    Ok(())
}

pub async fn dispatch_list(json_output: bool) -> Result<()> {
    let (_, store) = open_store()?;
    let projects = store.list_projects()?;
    if json_output {
        println!("{}", formatters::to_json(&projects));
    } else {
        println!("{}", formatters::format_projects_table(&projects));
    }
    Ok(())
}
