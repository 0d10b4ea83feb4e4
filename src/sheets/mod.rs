pub mod api;
pub mod report_writer;

#[cfg(test)]
pub mod fake;

pub use api::{SheetsApi, SheetsClient};
