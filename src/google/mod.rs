pub mod auth;

use anyhow::Result;
use reqwest::Response;

use crate::error::SyncError;

/// Turn a non-success Google API response into `SyncError::GoogleApi`.
pub async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(SyncError::GoogleApi {
        status: status.as_u16(),
        message,
    }
    .into())
}
