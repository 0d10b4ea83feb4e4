use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::SyncError;
use crate::extract::pdf_table::extract_cases_recoveries;
use crate::extract::summary_image::{decode_data_uri, extract_daily_summary, load_image};
use crate::extract::ReportValues;
use crate::fetch::{absolute_url, Fetcher};
use crate::google::auth::{ServiceAccountKey, TokenProvider, SHEETS_SCOPE, VISION_SCOPE};
use crate::mhlw;
use crate::ocr::{TextRecognizer, VisionRecognizer};
use crate::patients::{self, PatientUpdate, WriteMode};
use crate::prefecture::PORT_QUARANTINE;
use crate::sheets::report_writer::{write_report, ReportWriteSummary};
use crate::sheets::{SheetsApi, SheetsClient};

/// Long-lived clients shared by the CLI and the HTTP handlers.
#[derive(Clone)]
pub struct Services {
    pub settings: Settings,
    pub fetcher: Fetcher,
    sheets: Option<Arc<dyn SheetsApi>>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl Services {
    /// Google clients are only built when the credentials file is readable;
    /// scraping works without them.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let fetcher = Fetcher::new(&settings)?;
        let mut services = Services {
            settings,
            fetcher,
            sheets: None,
            recognizer: None,
        };

        match ServiceAccountKey::from_file(&services.settings.credentials_path) {
            Ok(key) => {
                let client = services.fetcher.client().clone();
                let tokens = Arc::new(TokenProvider::new(
                    key,
                    &[SHEETS_SCOPE, VISION_SCOPE],
                    client.clone(),
                ));
                services.sheets = Some(Arc::new(SheetsClient::new(
                    client.clone(),
                    &services.settings.sheets_base_url,
                    &services.settings.spreadsheet_id,
                    tokens.clone(),
                )));
                services.recognizer = Some(Arc::new(VisionRecognizer::new(
                    client,
                    &services.settings.vision_base_url,
                    tokens,
                )));
            }
            Err(e) => warn!("Google credentials unavailable, sheet writes and OCR disabled: {:#}", e),
        }
        Ok(services)
    }

    #[cfg(test)]
    pub fn with_clients(
        settings: Settings,
        sheets: Option<Arc<dyn SheetsApi>>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
    ) -> Result<Self> {
        Ok(Services {
            fetcher: Fetcher::new(&settings)?,
            settings,
            sheets,
            recognizer,
        })
    }

    pub fn sheets(&self) -> Result<&dyn SheetsApi> {
        self.sheets
            .as_deref()
            .context("Spreadsheet access needs a service-account credentials file")
    }

    pub fn recognizer(&self) -> Result<&dyn TextRecognizer> {
        self.recognizer
            .as_deref()
            .context("OCR needs a service-account credentials file")
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub report_url: Option<String>,
    pub index_url: String,
    pub extract_recoveries: bool,
    pub extract_summary: bool,
    pub write: bool,
    pub verbose: bool,
    pub dump_dir: Option<PathBuf>,
}

impl ExtractOptions {
    /// Everything on, as run by the daily trigger.
    pub fn today(settings: &Settings, write: bool) -> Self {
        Self {
            report_url: None,
            index_url: settings.index_url.clone(),
            extract_recoveries: true,
            extract_summary: true,
            write,
            verbose: false,
            dump_dir: settings.image_dump_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportOutcome {
    pub date: Option<String>,
    pub url: String,
    pub write_status: Option<ReportWriteSummary>,
    pub values: ReportValues,
}

impl fmt::Display for ReportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_status = match &self.write_status {
            Some(s) => serde_json::to_string(s).unwrap_or_default(),
            None => "Not written".to_string(),
        };
        writeln!(f, "Date: {}", self.date.as_deref().unwrap_or("-"))?;
        writeln!(f, "URL: {}", self.url)?;
        writeln!(f, "WriteStatus: {}", write_status)?;
        write!(f, "{}", serde_json::to_string(&self.values).unwrap_or_default())
    }
}

/// Scrape the latest (or given) report, extract its numbers and optionally
/// write them to the spreadsheet.
pub async fn report_today(services: &Services, opts: &ExtractOptions) -> Result<ReportOutcome> {
    let report_url = match &opts.report_url {
        Some(url) => url.clone(),
        None => mhlw::latest_report_url(&services.fetcher, &opts.index_url)
            .await?
            .ok_or_else(|| SyncError::ReportNotFound(opts.index_url.clone()))?,
    };
    info!("Report: {}", report_url);

    let page = mhlw::fetch_report(&services.fetcher, &report_url).await?;
    info!("Report date: {:?}", page.date);

    let mut values = ReportValues::default();

    if opts.extract_recoveries {
        match &page.recovery_pdf_link {
            Some(pdf_url) => {
                info!("Prefecture PDF: {}", pdf_url);
                let pdf = services.fetcher.get_bytes(pdf_url).await?;
                values.prefecture_cases_recoveries = Some(extract_cases_recoveries(&pdf, opts.verbose)?);
            }
            None => warn!("No prefecture PDF linked from {}", report_url),
        }
    }

    if opts.extract_summary {
        match &page.summary_image_src {
            Some(src) => {
                let src = absolute_url(&report_url, src);
                let bytes = if src.starts_with("data:") {
                    decode_data_uri(&src)?
                } else {
                    services.fetcher.get_bytes(&src).await?
                };
                let image = load_image(&bytes)?;
                values.summary =
                    extract_daily_summary(&image, services.recognizer()?, opts.dump_dir.as_deref()).await?;
            }
            None => warn!("No summary image on {}", report_url),
        }
    }

    let write_status = if opts.write {
        let date = page
            .date
            .as_deref()
            .ok_or_else(|| SyncError::IncompleteValues("report has no date".into()))?;
        Some(write_report(services.sheets()?, date, &values).await?)
    } else {
        None
    };

    Ok(ReportOutcome {
        date: page.date,
        url: report_url,
        write_status,
        values,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortOutcome {
    pub url: String,
    pub date: Option<String>,
    pub count: u64,
    pub updated_rows: Option<u64>,
}

/// Airport quarantine cases from the latest port report, optionally
/// reconciled into the patient sheet.
pub async fn port_cases(services: &Services, index_url: &str, write: bool) -> Result<PortOutcome> {
    let url = mhlw::latest_port_report_url(&services.fetcher, index_url)
        .await?
        .ok_or_else(|| SyncError::ReportNotFound(index_url.to_string()))?;
    let page = mhlw::fetch_report(&services.fetcher, &url).await?;
    info!(url = %url, count = page.port_case_count, date = ?page.date, "Port quarantine report");

    let mut outcome = PortOutcome {
        url,
        date: page.date,
        count: page.port_case_count,
        updated_rows: None,
    };

    if write && outcome.count > 0 {
        let date = outcome
            .date
            .clone()
            .ok_or_else(|| SyncError::IncompleteValues("port report has no date".into()))?;
        let update = PatientUpdate {
            prefecture: PORT_QUARANTINE.to_string(),
            date,
            cases: Some(outcome.count),
            deceased: None,
            source: outcome.url.clone(),
        };
        outcome.updated_rows =
            Some(patients::write_patients(services.sheets()?, &update, WriteMode::default()).await?);
    }

    Ok(outcome)
}

/// Plain-text dump for pasting into the sheet by hand.
pub fn format_output_text(values: &ReportValues) -> String {
    let mut out = String::new();
    if let Some(counts) = &values.prefecture_cases_recoveries {
        for c in counts {
            out.push_str(&display_opt(c.recoveries));
            out.push('\n');
        }
    }
    let s = &values.summary;
    out.push_str(&display_opt(s.port_recoveries));
    out.push_str("\n---\nrecoveries,deaths,critical,tested\n");
    out.push_str(&format!(
        "{}\t{}\t{}\t{}\n",
        display_opt(s.recoveries),
        display_opt(s.deaths),
        display_opt(s.critical),
        display_opt(s.pcr)
    ));
    out
}

fn display_opt(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Today's date in Japan, `YYYY-MM-DD`.
pub fn today_jst() -> String {
    jst_date(0)
}

pub fn yesterday_jst() -> String {
    jst_date(1)
}

/// JST is a fixed UTC+9 with no daylight saving.
fn jst_date(days_back: i64) -> String {
    (Utc::now() + Duration::hours(9) - Duration::days(days_back))
        .format("%Y-%m-%d")
        .to_string()
}
