use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::open_store;
use crate::cli::formatters;
use gstbook::db::SqliteStore;
use gstbook::engine::{self, RunOptions};

fn spinner(json_output: bool, message: String) -> ProgressBar {
    if json_output {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub async fn dispatch_analyse(project_ref: &str, json_output: bool) -> Result<()> {
    let (config, store) = open_store()?;
    let project = store.require_project(project_ref)?;
    drop(store);

    let bar = spinner(
        json_output,
        format!("Consolidating {} (FY {})", project.name, project.financial_year),
    );

    // The run is CPU and file bound; keep it off the async workers
    let db_path = config.db_path.clone();
    let opts = RunOptions::from_config(&config);
    let project_id = project.id.clone();
    let result = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::open(&db_path)?;
        engine::start_analysis(&store, &project_id, &opts)
    })
    .await
    .context("Analysis task panicked")?;
    bar.finish_and_clear();

    let summary = result?;
    if json_output {
        println!("{}", formatters::to_json(&summary));
    } else {
        println!("{}", formatters::format_run_summary(&summary));
    }
    Ok(())
}

pub async fn dispatch_runs(project_ref: &str, json_output: bool) -> Result<()> {
    let (_, store) = open_store()?;
    let project = store.require_project(project_ref)?;
    let runs = store.list_runs(&project.id)?;

    if json_output {
        println!("{}", formatters::to_json(&runs));
    } else {
        println!(
            "\n{} Runs for {} ({})\n",
            "📊".cyan().bold(),
            project.name.bold(),
            runs.len()
        );
        println!("{}", formatters::format_runs_table(&runs));
    }
    Ok(())
}
