use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::google::auth::TokenProvider;
use crate::google::check;

// ── Types ──

/// A cell written to the sheet. Numbers stay numbers so USER_ENTERED keeps
/// them numeric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(u64),
    Text(String),
}

impl From<u64> for CellValue {
    fn from(n: u64) -> Self {
        CellValue::Number(n)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

pub type Row = Vec<CellValue>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub column_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub grid_properties: GridProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    #[serde(default)]
    pub updated_rows: u64,
    #[serde(default)]
    pub updated_range: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResult {
    #[serde(default)]
    pub updated_rows: u64,
    #[serde(default)]
    pub updated_range: String,
}

/// The handful of spreadsheet operations the pipelines need.
#[async_trait]
pub trait SheetsApi: Send + Sync {
    /// Formatted values in `range`. Trailing empty cells and rows are omitted.
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>>;

    async fn update_values(&self, range: &str, rows: Vec<Row>) -> Result<UpdateResult>;

    async fn append_values(&self, range: &str, rows: Vec<Row>, insert_rows: bool) -> Result<AppendResult>;

    async fn sheet_properties(&self) -> Result<Vec<SheetProperties>>;

    /// Insert columns `[start, end)` into a tab, inheriting formatting from the left.
    async fn insert_columns(&self, sheet_id: i64, start: u32, end: u32) -> Result<()>;
}

pub async fn find_tab(api: &dyn SheetsApi, title: &str) -> Result<Option<SheetProperties>> {
    Ok(api
        .sheet_properties()
        .await?
        .into_iter()
        .find(|p| p.title == title))
}

// ── REST client ──

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Deserialize)]
struct AppendResponse {
    #[serde(default)]
    updates: AppendResult,
}

#[derive(Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

/// Sheets v4 over REST, authorised with a service-account token.
pub struct SheetsClient {
    client: Client,
    base_url: String,
    spreadsheet_id: String,
    tokens: Arc<TokenProvider>,
}

impl SheetsClient {
    pub fn new(client: Client, base_url: &str, spreadsheet_id: &str, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            tokens,
        }
    }

    fn spreadsheet_url(&self, suffix: &str) -> Result<Url> {
        Url::parse(&format!(
            "{}/spreadsheets/{}{}",
            self.base_url, self.spreadsheet_id, suffix
        ))
        .context("Invalid Sheets URL")
    }

    fn values_url(&self, range: &str, action: &str) -> Result<Url> {
        let mut url = self.spreadsheet_url("")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Sheets base URL cannot hold a path"))?
            .push("values")
            .push(&format!("{}{}", range, action));
        Ok(url)
    }
}

#[async_trait]
impl SheetsApi for SheetsClient {
    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>> {
        debug!(range, "values.get");
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .get(self.values_url(range, "")?)
            .bearer_auth(token)
            .send()
            .await
            .context("values.get failed")?;
        let body: ValueRange = check(resp).await?.json().await?;
        Ok(body.values)
    }

    async fn update_values(&self, range: &str, rows: Vec<Row>) -> Result<UpdateResult> {
        debug!(range, rows = rows.len(), "values.update");
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .put(self.values_url(range, "")?)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .bearer_auth(token)
            .json(&json!({ "range": range, "majorDimension": "ROWS", "values": rows }))
            .send()
            .await
            .context("values.update failed")?;
        Ok(check(resp).await?.json().await?)
    }

    async fn append_values(&self, range: &str, rows: Vec<Row>, insert_rows: bool) -> Result<AppendResult> {
        debug!(range, rows = rows.len(), insert_rows, "values.append");
        let token = self.tokens.access_token().await?;
        let mut query = vec![("valueInputOption", "USER_ENTERED")];
        if insert_rows {
            query.extend([
                ("insertDataOption", "INSERT_ROWS"),
                ("includeValuesInResponse", "true"),
                ("responseValueRenderOption", "FORMATTED_VALUE"),
            ]);
        }
        let resp = self
            .client
            .post(self.values_url(range, ":append")?)
            .query(&query)
            .bearer_auth(token)
            .json(&json!({ "majorDimension": "ROWS", "values": rows }))
            .send()
            .await
            .context("values.append failed")?;
        let body: AppendResponse = check(resp).await?.json().await?;
        Ok(body.updates)
    }

    async fn sheet_properties(&self) -> Result<Vec<SheetProperties>> {
        let token = self.tokens.access_token().await?;
        let resp = self
            .client
            .get(self.spreadsheet_url("")?)
            .query(&[("fields", "sheets.properties")])
            .bearer_auth(token)
            .send()
            .await
            .context("spreadsheets.get failed")?;
        let meta: SpreadsheetMeta = check(resp).await?.json().await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties).collect())
    }

    async fn insert_columns(&self, sheet_id: i64, start: u32, end: u32) -> Result<()> {
        debug!(sheet_id, start, end, "batchUpdate insertDimension");
        let token = self.tokens.access_token().await?;
        let body = json!({
            "requests": [{
                "insertDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "COLUMNS",
                        "startIndex": start,
                        "endIndex": end
                    },
                    "inheritFromBefore": true
                }
            }]
        });
        let resp = self
            .client
            .post(self.spreadsheet_url(":batchUpdate")?)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("batchUpdate failed")?;
        check(resp).await?;
        Ok(())
    }
}
