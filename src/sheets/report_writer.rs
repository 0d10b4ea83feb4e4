use anyhow::Result;
use serde::Serialize;
use tracing::info;

use super::api::{find_tab, CellValue, Row, SheetsApi};
use crate::error::SyncError;
use crate::extract::pdf_table::PrefectureCount;
use crate::extract::ReportValues;

const SUM_BY_DAY_READ: &str = "'Sum By Day'!A2:G";
const SUM_BY_DAY_APPEND: &str = "'Sum By Day'";
const PREFECTURE_RECOVERIES: &str = "'Prefecture Data'!E3:E50";
const PREFECTURE_CASES: &str = "'Prefecture Data'!I3:I50";
const RECOVERIES_TAB: &str = "Recoveries";
const RECOVERIES_HEAD: &str = "'Recoveries'!C1:C1";
const RECOVERIES_COLUMN: &str = "'Recoveries'!C1:C50";
/// Column C, zero-based.
const RECOVERIES_INSERT_AT: u32 = 2;
/// The last Recoveries row is "Unspecified" and never changes.
const UNSPECIFIED_RECOVERIES: u64 = 8;
const PREFECTURE_COUNT: usize = 47;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum WriteStatus {
    Written { updated_rows: u64 },
    AlreadyWritten,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWriteSummary {
    pub sum_by_day: Option<WriteStatus>,
    pub prefecture_data: Option<WriteStatus>,
    pub recoveries: Option<WriteStatus>,
}

/// Append today's national totals to 'Sum By Day' unless that date is already the last row.
pub async fn write_sum_by_day(api: &dyn SheetsApi, date: &str, values: &ReportValues) -> Result<WriteStatus> {
    let current = api.get_values(SUM_BY_DAY_READ).await?;
    if current.last().and_then(|row| row.first()).map(String::as_str) == Some(date) {
        info!("Value for today {} already exists.", date);
        return Ok(WriteStatus::AlreadyWritten);
    }

    let s = &values.summary;
    let required = [s.recoveries, s.deaths, s.critical, s.pcr];
    let [recoveries, deaths, critical, pcr] = match required {
        [Some(a), Some(b), Some(c), Some(d)] if a > 0 && b > 0 && c > 0 && d > 0 => [a, b, c, d],
        _ => {
            return Err(SyncError::IncompleteValues("Not all values for Sum By Day exist".into()).into())
        }
    };

    let row: Row = vec![
        date.into(),
        "".into(),
        recoveries.into(),
        deaths.into(),
        critical.into(),
        pcr.into(),
    ];
    let result = api.append_values(SUM_BY_DAY_APPEND, vec![row], false).await?;
    Ok(WriteStatus::Written {
        updated_rows: result.updated_rows,
    })
}

/// Overwrite the per-prefecture recoveries and cases columns in 'Prefecture Data'.
pub async fn write_prefecture_data(api: &dyn SheetsApi, values: &ReportValues) -> Result<WriteStatus> {
    let (counts, port) = validated_prefecture_values(values)?;

    let mut recoveries: Vec<Row> = counts.iter().map(|c| vec![optional_cell(c.recoveries)]).collect();
    recoveries.push(vec![port.into()]);
    let first = api.update_values(PREFECTURE_RECOVERIES, recoveries).await?;

    let mut cases: Vec<Row> = counts.iter().map(|c| vec![optional_cell(c.cases)]).collect();
    cases.push(vec![port.into()]);
    let second = api.update_values(PREFECTURE_CASES, cases).await?;

    Ok(WriteStatus::Written {
        updated_rows: first.updated_rows + second.updated_rows,
    })
}

/// Insert a new dated column at C in 'Recoveries' holding today's recoveries.
pub async fn write_recoveries(api: &dyn SheetsApi, date: &str, values: &ReportValues) -> Result<WriteStatus> {
    let (counts, port) = validated_prefecture_values(values)?;

    let head = api.get_values(RECOVERIES_HEAD).await?;
    if head.first().and_then(|row| row.first()).map(String::as_str) == Some(date) {
        info!("Todays values already written in to Recoveries");
        return Ok(WriteStatus::AlreadyWritten);
    }

    let mut column: Vec<Row> = vec![vec![date.into()]];
    column.extend(counts.iter().map(|c| vec![optional_cell(c.recoveries)]));
    column.push(vec![port.into()]);
    column.push(vec![UNSPECIFIED_RECOVERIES.into()]);

    let tab = find_tab(api, RECOVERIES_TAB)
        .await?
        .ok_or_else(|| SyncError::TabNotFound(RECOVERIES_TAB.into()))?;
    api.insert_columns(tab.sheet_id, RECOVERIES_INSERT_AT, RECOVERIES_INSERT_AT + 1)
        .await?;

    let result = api.update_values(RECOVERIES_COLUMN, column).await?;
    Ok(WriteStatus::Written {
        updated_rows: result.updated_rows,
    })
}

/// Sum By Day always; the prefecture tabs only when the PDF was extracted.
pub async fn write_report(api: &dyn SheetsApi, date: &str, values: &ReportValues) -> Result<ReportWriteSummary> {
    let mut summary = ReportWriteSummary::default();

    info!("Writing to Sum By Day Sheet");
    summary.sum_by_day = Some(write_sum_by_day(api, date, values).await?);

    if values.prefecture_cases_recoveries.is_some() {
        info!("Writing to Prefecture Data Sheet");
        summary.prefecture_data = Some(write_prefecture_data(api, values).await?);

        info!("Writing to Recoveries Sheet");
        summary.recoveries = Some(write_recoveries(api, date, values).await?);
    }

    Ok(summary)
}

fn validated_prefecture_values(values: &ReportValues) -> Result<(&[PrefectureCount], u64)> {
    let counts = values
        .prefecture_cases_recoveries
        .as_deref()
        .ok_or(SyncError::MissingValues("prefectureCasesRecoveries"))?;
    if counts.len() < PREFECTURE_COUNT {
        return Err(SyncError::IncompleteValues("prefectureCasesRecoveries are incomplete".into()).into());
    }
    let port = values
        .summary
        .port_recoveries
        .filter(|n| *n >= 1)
        .ok_or(SyncError::MissingValues("portRecoveries"))?;
    Ok((&counts[..PREFECTURE_COUNT], port))
}

fn optional_cell(value: Option<u64>) -> CellValue {
    value.map(CellValue::from).unwrap_or_else(|| "".into())
}
