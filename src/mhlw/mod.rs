pub mod report;

use anyhow::Result;
use tracing::info;

use crate::fetch::{absolute_url, Fetcher};
pub use report::ReportPage;

/// Absolute URL of the latest daily report linked from the index page.
pub async fn latest_report_url(fetcher: &Fetcher, index_url: &str) -> Result<Option<String>> {
    info!("Fetching report index: {}", index_url);
    let html = fetcher.get_text(index_url).await?;
    Ok(report::latest_report_link(&html).map(|href| absolute_url(index_url, &href)))
}

/// Absolute URL of the latest airport quarantine report.
pub async fn latest_port_report_url(fetcher: &Fetcher, index_url: &str) -> Result<Option<String>> {
    info!("Fetching report index for port reports: {}", index_url);
    let html = fetcher.get_text(index_url).await?;
    Ok(report::latest_port_report_link(&html).map(|href| absolute_url(index_url, &href)))
}

/// Fetch and parse a report page. The PDF link comes back absolute, resolved
/// against the report's host.
pub async fn fetch_report(fetcher: &Fetcher, report_url: &str) -> Result<ReportPage> {
    let html = fetcher.get_text(report_url).await?;
    let mut page = ReportPage::parse(&html);
    page.recovery_pdf_link = page
        .recovery_pdf_link
        .map(|href| absolute_url(report_url, &href));
    Ok(page)
}
