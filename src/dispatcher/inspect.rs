use anyhow::{bail, Result};

use crate::cli::formatters;
use gstbook::importers::list_sheets;

pub async fn dispatch_inspect(file_path: &str, json_output: bool) -> Result<()> {
    if !std::path::Path::new(file_path).is_file() {
        bail!("File not found: {}", file_path);
    }

    let listings = list_sheets(file_path)?;
    if json_output {
        println!("{}", formatters::to_json(&listings));
    } else {
        println!("{}", formatters::format_sheet_listing(file_path, &listings));
    }
    Ok(())
}
