use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::SyncError;

/// Body and headers of a fetched upstream resource.
pub struct Fetched {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Shared HTTP client for upstream pages, PDFs and images.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_retries: u32,
    base_backoff: Duration,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
            base_backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let fetched = self.get(url).await?;
        if !fetched.status.is_success() {
            return Err(SyncError::UpstreamStatus {
                url: url.to_string(),
                status: fetched.status.as_u16(),
            }
            .into());
        }
        Ok(fetched.body)
    }

    /// GET with retry on 429, 5xx and transport errors. Any other status is
    /// returned to the caller as-is.
    pub async fn get(&self, url: &str) -> Result<Fetched> {
        let mut attempt = 0;
        loop {
            debug!(url, attempt, "GET");
            let outcome = self.client.get(url).send().await;

            let retryable = match &outcome {
                Ok(resp) => should_retry(resp.status()),
                Err(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            };

            if !retryable || attempt >= self.max_retries {
                let resp = outcome.with_context(|| format!("Failed to fetch {}", url))?;
                let status = resp.status();
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = resp
                    .bytes()
                    .await
                    .with_context(|| format!("Failed to read body of {}", url))?
                    .to_vec();
                return Ok(Fetched {
                    status,
                    content_type,
                    body,
                });
            }

            let backoff = backoff_delay(self.base_backoff, attempt);
            warn!(
                "Fetch of {} failed (attempt {}/{}), backing off {:.1}s",
                url,
                attempt + 1,
                self.max_retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// `base * 2^attempt`, saturating instead of overflowing.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Resolve `path` against the host of `referer`. The referer's own path and
/// query are not kept.
pub fn absolute_url(referer: &str, path: &str) -> String {
    if path.starts_with("data:") || path.starts_with("http") {
        return path.to_string();
    }
    match Url::parse(referer) {
        Ok(base) => {
            let host = base.host_str().unwrap_or_default();
            let port = base.port().map(|p| format!(":{}", p)).unwrap_or_default();
            let sep = if path.starts_with('/') { "" } else { "/" };
            format!("{}://{}{}{}{}", base.scheme(), host, port, sep, path)
        }
        Err(_) => path.to_string(),
    }
}

/// Drop query string and fragment from a source URL.
pub fn strip_query(source: &str) -> String {
    match Url::parse(source) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => source.to_string(),
    }
}
