//! Report rendering: Markdown, JSON and CSV.

pub mod csv;
pub mod generator;

pub use self::csv::generate_csv_report;
pub use generator::{
    export_file_name, generate_json_report, generate_markdown_report, write_report,
};
