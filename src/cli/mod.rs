use clap::{Parser, Subcommand};

pub mod formatters;

#[derive(Parser)]
#[command(name = "gstbook")]
#[command(
    version,
    about = "Consolidate monthly GSTR-1 and GSTR-2A exports into a yearly analysis workbook"
)]
#[command(
    long_about = "Collect the monthly GSTR-1 and GSTR-2A spreadsheet exports of a taxpayer, merge them section by section in financial-year order, flag rows whose document date falls outside the filing month, and write a single analysis workbook with an index sheet."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Project management
    Project {
        #[command(subcommand)]
        action: ProjectCommands,
    },

    /// Add a monthly export to a project (family and period read from the file name)
    Upload {
        /// Project id or name
        project: String,

        /// Path to the .xlsx/.xls export or a .zip bundle of exports
        file: String,

        /// Return family: A (GSTR-1) or B (GSTR-2A)
        #[arg(long)]
        family: Option<String>,

        /// Filing month (1-12)
        #[arg(long)]
        month: Option<u32>,

        /// Calendar year of the filing month
        #[arg(long)]
        year: Option<i32>,
    },

    /// Show which months have been uploaded
    Status {
        /// Project id or name
        project: String,
    },

    /// Build the analysis workbook from every upload of a project
    #[command(alias = "analyze")]
    Analyse {
        /// Project id or name
        project: String,
    },

    /// List previous analysis runs
    Runs {
        /// Project id or name
        project: String,
    },

    /// List the sheets of a spreadsheet or zip bundle
    Inspect {
        /// Path to the file
        file: String,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project for one taxpayer and financial year
    Create {
        #[arg(long)]
        name: String,

        /// Taxpayer GSTIN (15 characters)
        #[arg(long)]
        gstin: String,

        /// Financial year, e.g. 2021-22
        #[arg(long = "fy")]
        fy: String,
    },

    /// List all projects
    List,
}
