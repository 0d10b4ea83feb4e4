pub mod pdf_table;
pub mod summary_image;

use serde::Serialize;

use pdf_table::PrefectureCount;
use summary_image::DailySummary;

/// Everything pulled out of one daily report.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportValues {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefecture_cases_recoveries: Option<Vec<PrefectureCount>>,
    #[serde(flatten)]
    pub summary: DailySummary,
}
