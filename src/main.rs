mod cli;
mod dispatcher;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::Cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gstbook=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Some(command) => dispatcher::dispatch_command(command, cli.json).await,
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
