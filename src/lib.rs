//! gstbook - yearly consolidation of monthly GST return exports
//!
//! Reads the monthly GSTR-1 and GSTR-2A spreadsheet exports of a taxpayer,
//! merges each return section across the financial year, checks document
//! dates against filing months, and writes one analysis workbook per run.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod importers;
pub mod period;
pub mod reports;
pub mod table;
pub mod taxonomy;
pub mod utils;
