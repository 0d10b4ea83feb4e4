//! In-memory `SheetsApi` for tests: canned reads keyed by range, recorded writes.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::api::{AppendResult, GridProperties, Row, SheetProperties, SheetsApi, UpdateResult};

#[derive(Default)]
pub struct FakeSheets {
    values: Mutex<HashMap<String, Vec<Vec<String>>>>,
    tabs: Mutex<Vec<SheetProperties>>,
    updates: Mutex<Vec<(String, Vec<Row>)>>,
    appends: Mutex<Vec<(String, Vec<Row>, bool)>>,
    inserted: Mutex<Vec<(i64, u32, u32)>>,
}

impl FakeSheets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_values(&self, range: &str, rows: Vec<Vec<&str>>) {
        let rows = rows
            .into_iter()
            .map(|r| r.into_iter().map(str::to_string).collect())
            .collect();
        self.values.lock().unwrap().insert(range.to_string(), rows);
    }

    pub fn add_tab(&self, sheet_id: i64, title: &str, row_count: u64) {
        self.tabs.lock().unwrap().push(SheetProperties {
            sheet_id,
            title: title.to_string(),
            grid_properties: GridProperties {
                row_count,
                column_count: 26,
            },
        });
    }

    pub fn updates(&self) -> Vec<(String, Vec<Row>)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn appends(&self) -> Vec<(String, Vec<Row>)> {
        self.appends
            .lock()
            .unwrap()
            .iter()
            .map(|(range, rows, _)| (range.clone(), rows.clone()))
            .collect()
    }

    pub fn appended_with_insert(&self) -> Vec<bool> {
        self.appends.lock().unwrap().iter().map(|(_, _, i)| *i).collect()
    }

    pub fn inserted_columns(&self) -> Vec<(i64, u32, u32)> {
        self.inserted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetsApi for FakeSheets {
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        Ok(self.values.lock().unwrap().get(range).cloned().unwrap_or_default())
    }

    async fn update_values(&self, range: &str, rows: Vec<Row>) -> Result<UpdateResult> {
        let updated_rows = rows.len() as u64;
        self.updates.lock().unwrap().push((range.to_string(), rows));
        Ok(UpdateResult {
            updated_rows,
            updated_range: range.to_string(),
        })
    }

    async fn append_values(&self, range: &str, rows: Vec<Row>, insert_rows: bool) -> Result<AppendResult> {
        let updated_rows = rows.len() as u64;
        self.appends
            .lock()
            .unwrap()
            .push((range.to_string(), rows, insert_rows));
        Ok(AppendResult {
            updated_rows,
            updated_range: range.to_string(),
        })
    }

    async fn sheet_properties(&self) -> Result<Vec<SheetProperties>> {
        Ok(self.tabs.lock().unwrap().clone())
    }

    async fn insert_columns(&self, sheet_id: i64, start: u32, end: u32) -> Result<()> {
        self.inserted.lock().unwrap().push((sheet_id, start, end));
        Ok(())
    }
}
