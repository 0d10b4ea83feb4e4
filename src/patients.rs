use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::prefecture;
use crate::sheets::api::{find_tab, AppendResult, CellValue, Row, SheetProperties, SheetsApi, UpdateResult};

const RECENT_ROWS: u64 = 100;
const PATIENT_DATA_TAB: &str = "Patient Data";
const PREFECTURE_TABS: &[&str] = &[
    "Aichi", "Chiba", "Fukuoka", "Hokkaido", "Kanagawa", "Osaka", "Saitama", "Tokyo",
];
const EXISTING_ID: &str = "Existing";
const DECEASED: &str = "Deceased";

// Column positions in the patient tabs.
const ID_COL: usize = 0;
const DATE_COL: usize = 3;
const PREFECTURE_COL: usize = 9;
const STATUS_COL: usize = 10;
const COUNT_COL: usize = 11;
const COUNT_COL_A1: &str = "L";
const ROW_WIDTH: usize = 14;

static PATIENT_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([^\d]+)([0-9]+)").unwrap());

/// One prefecture's count for one day, as submitted by a caller.
#[derive(Debug, Clone, Default)]
pub struct PatientUpdate {
    pub prefecture: String,
    pub date: String,
    pub cases: Option<u64>,
    pub deceased: Option<u64>,
    pub source: String,
}

impl PatientUpdate {
    fn is_deceased(&self) -> bool {
        self.deceased.is_some_and(|d| d > 0)
    }

    /// The number that goes in the Count column.
    fn count(&self) -> Option<u64> {
        if self.is_deceased() {
            self.deceased
        } else {
            self.cases.filter(|c| *c > 0)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WriteMode {
    /// Reconcile against recent rows before appending.
    pub update: bool,
    /// One row carrying a Count, instead of one row per patient.
    pub use_count_column: bool,
}

impl Default for WriteMode {
    fn default() -> Self {
        Self {
            update: true,
            use_count_column: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum Reconcile {
    Unchanged,
    Updated(UpdateResult),
    Appended(AppendResult),
}

impl Reconcile {
    pub fn updated_rows(&self) -> u64 {
        match self {
            Reconcile::Unchanged => 0,
            Reconcile::Updated(r) => r.updated_rows,
            Reconcile::Appended(r) => r.updated_rows,
        }
    }
}

pub fn tab_for_prefecture(prefecture: &str) -> &str {
    PREFECTURE_TABS
        .iter()
        .find(|t| **t == prefecture)
        .copied()
        .unwrap_or(PATIENT_DATA_TAB)
}

/// Id used for count rows: prefecture prefix + date digits, e.g. `TOK20200501`.
pub fn patient_id(prefecture: &str, date: &str) -> Result<String> {
    let prefix =
        prefecture::id_prefix(prefecture).ok_or_else(|| SyncError::UnknownPrefecture(prefecture.into()))?;
    Ok(format!("{}{}", prefix, date.replace('-', "")))
}

struct RecentRows {
    start_row: u64,
    rows: Vec<Vec<String>>,
}

async fn recent_rows(api: &dyn SheetsApi, tab: &SheetProperties) -> Result<RecentRows> {
    let start_row = tab
        .grid_properties
        .row_count
        .saturating_sub(RECENT_ROWS)
        .max(1);
    let rows = api
        .get_values(&format!("'{}'!A{}:L", tab.title, start_row))
        .await?;
    Ok(RecentRows { start_row, rows })
}

fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(String::as_str).unwrap_or("")
}

/// Update the Count of an existing row for this prefecture and date, or append
/// a count row when there is none.
pub async fn update_patient_count(
    api: &dyn SheetsApi,
    tab: &SheetProperties,
    update: &PatientUpdate,
) -> Result<Reconcile> {
    let count = update
        .count()
        .ok_or_else(|| SyncError::IncompleteValues("cases= or deceased= is required".into()))?;
    let recent = recent_rows(api, tab).await?;

    let existing = recent.rows.iter().enumerate().find(|(_, row)| {
        if cell(row, DATE_COL) != update.date || cell(row, PREFECTURE_COL) != update.prefecture {
            return false;
        }
        let status = cell(row, STATUS_COL);
        if update.is_deceased() {
            status == DECEASED
        } else {
            status.is_empty()
        }
    });

    if let Some((i, row)) = existing {
        let row_number = recent.start_row + i as u64;
        if cell(row, COUNT_COL).trim().parse::<u64>().ok() == Some(count) {
            info!(
                "Found row but the count was identical: {} {}",
                update.prefecture, count
            );
            return Ok(Reconcile::Unchanged);
        }

        let range = format!(
            "'{}'!{}{}:{}{}",
            tab.title, COUNT_COL_A1, row_number, COUNT_COL_A1, row_number
        );
        info!(range = %range, count, "Updating patient count");
        let result = api.update_values(&range, vec![vec![count.into()]]).await?;
        return Ok(Reconcile::Updated(result));
    }

    let id = patient_id(&update.prefecture, &update.date)?;
    let rows = build_rows(update, &id, None);
    let result = append(api, tab, rows).await?;
    Ok(Reconcile::Appended(result))
}

/// Alpha prefix and number of the last real patient id in column A.
pub async fn last_patient_number(api: &dyn SheetsApi, tab: &SheetProperties) -> Result<(String, u64)> {
    let column = api.get_values(&format!("'{}'!A:A", tab.title)).await?;
    let last = column
        .iter()
        .map(|row| cell(row, ID_COL))
        .filter(|id| !id.is_empty() && *id != EXISTING_ID)
        .last()
        .ok_or_else(|| SyncError::IncompleteValues(format!("no patient numbers in {}", tab.title)))?;

    if let Some(caps) = PATIENT_NUMBER_RE.captures(last) {
        let number = caps[2].parse().context("Patient number out of range")?;
        return Ok((caps[1].to_string(), number));
    }
    let number = last
        .parse()
        .with_context(|| format!("Unrecognised patient number {:?}", last))?;
    Ok((String::new(), number))
}

/// Rows for an append. With `numbering` set, one row per patient numbered
/// after the given (prefix, last number); otherwise a single Count row.
fn build_rows(update: &PatientUpdate, count_row_id: &str, numbering: Option<(&str, u64)>) -> Vec<Row> {
    let deceased = update.is_deceased();
    let row = |id: String, count: CellValue| -> Row {
        let mut row: Row = vec!["".into(); ROW_WIDTH];
        row[ID_COL] = if deceased { EXISTING_ID.into() } else { id.into() };
        row[DATE_COL] = update.date.as_str().into();
        row[DATE_COL + 1] = update.date.as_str().into();
        row[PREFECTURE_COL] = update.prefecture.as_str().into();
        row[STATUS_COL] = if deceased { DECEASED.into() } else { "".into() };
        row[COUNT_COL] = count;
        row[ROW_WIDTH - 1] = update.source.as_str().into();
        row
    };

    match numbering {
        None => {
            let count = update.count().map(CellValue::from).unwrap_or_else(|| "".into());
            vec![row(count_row_id.to_string(), count)]
        }
        Some((prefix, last)) => {
            let n = update.count().unwrap_or(0);
            (1..=n)
                .map(|i| row(format!("{}{}", prefix, last + i), "".into()))
                .collect()
        }
    }
}

async fn append(api: &dyn SheetsApi, tab: &SheetProperties, rows: Vec<Row>) -> Result<AppendResult> {
    info!(tab = %tab.title, rows = rows.len(), "Appending patient rows");
    api.append_values(&format!("'{}'!A:E", tab.title), rows, true)
        .await
}

/// Write one prefecture/date count into its tab. Returns the number of rows touched.
pub async fn write_patients(api: &dyn SheetsApi, update: &PatientUpdate, mode: WriteMode) -> Result<u64> {
    if update.prefecture.is_empty() || update.date.is_empty() {
        return Err(SyncError::IncompleteValues("prefecture and date are required".into()).into());
    }
    if update.count().is_none() {
        return Err(SyncError::IncompleteValues("cases= or deceased= is required".into()).into());
    }
    let id = patient_id(&update.prefecture, &update.date)?;

    let tab_name = tab_for_prefecture(&update.prefecture);
    let Some(tab) = find_tab(api, tab_name).await? else {
        warn!("Unable to find tab: {}", tab_name);
        return Ok(0);
    };

    if mode.update {
        let outcome = update_patient_count(api, &tab, update).await?;
        return Ok(outcome.updated_rows());
    }

    let rows = if mode.use_count_column {
        build_rows(update, &id, None)
    } else {
        let (prefix, last) = last_patient_number(api, &tab).await?;
        build_rows(update, &id, Some((prefix.as_str(), last)))
    };
    Ok(append(api, &tab, rows).await?.updated_rows)
}
