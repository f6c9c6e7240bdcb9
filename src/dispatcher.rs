//! Command dispatcher that routes parsed clap commands to their handlers.
//!
//! Handlers load the configuration and open the store themselves, so each
//! command stands alone.

mod analysis;
mod inspect;
mod projects;
mod uploads;

use anyhow::Result;
use tracing::debug;

use crate::cli::{Commands, ProjectCommands};
use gstbook::config::Config;
use gstbook::db::SqliteStore;

/// Route a parsed command to its handler
pub async fn dispatch_command(command: Commands, json_output: bool) -> Result<()> {
    match command {
        Commands::Project { action } => match action {
            ProjectCommands::Create { name, gstin, fy } => {
                projects::dispatch_create(&name, &gstin, &fy, json_output).await
            }
            ProjectCommands::List => projects::dispatch_list(json_output).await,
        },
        Commands::Upload {
            project,
            file,
            family,
            month,
            year,
        } => {
            let overrides = uploads::UploadOverrides {
                family,
                month,
                year,
            };
            uploads::dispatch_upload(&project, &file, overrides, json_output).await
        }
        Commands::Status { project } => uploads::dispatch_status(&project, json_output).await,
        Commands::Analyse { project } => analysis::dispatch_analyse(&project, json_output).await,
        Commands::Runs { project } => analysis::dispatch_runs(&project, json_output).await,
        Commands::Inspect { file } => inspect::dispatch_inspect(&file, json_output).await,
    }
}

/// Configuration plus an open store, as every stateful command needs
fn open_store() -> Result<(Config, SqliteStore)> {
    let config = Config::load()?;
    debug!("Using data directory {}", config.data_dir.display());
    let store = SqliteStore::open(&config.db_path)?;
    Ok((config, store))
}
