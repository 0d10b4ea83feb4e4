use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::google::auth::TokenProvider;
use crate::google::check;

/// Turns an image (PNG bytes) into the text it shows.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, png: &[u8]) -> Result<String>;
}

/// Google Cloud Vision document text detection.
pub struct VisionRecognizer {
    client: Client,
    base_url: String,
    tokens: Arc<TokenProvider>,
}

impl VisionRecognizer {
    pub fn new(client: Client, base_url: &str, tokens: Arc<TokenProvider>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    async fn recognize(&self, png: &[u8]) -> Result<String> {
        let token = self.tokens.access_token().await?;
        let body = annotate_request(png);
        let resp = self
            .client
            .post(format!("{}/images:annotate", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("Vision request failed")?;
        let value: Value = check(resp)
            .await?
            .json()
            .await
            .context("Malformed Vision response")?;
        annotation_text(&value)
    }
}

fn annotate_request(png: &[u8]) -> Value {
    json!({
        "requests": [{
            "image": { "content": STANDARD.encode(png) },
            "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
            "imageContext": { "languageHints": ["en"] }
        }]
    })
}

/// Detected text of the first image. Per-image failures arrive with a 200
/// status and an `error` object in place of the annotation.
fn annotation_text(response: &Value) -> Result<String> {
    let first = &response["responses"][0];
    if let Some(message) = first["error"]["message"].as_str() {
        return Err(SyncError::GoogleApi {
            status: first["error"]["code"].as_u64().unwrap_or(200) as u16,
            message: message.to_string(),
        }
        .into());
    }
    Ok(first["fullTextAnnotation"]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string())
}

/// Replies with canned text, one reply per call, then empty strings.
#[cfg(test)]
pub mod fake {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    pub struct ScriptedRecognizer(Mutex<VecDeque<&'static str>>);

    impl ScriptedRecognizer {
        pub fn new(replies: &[&'static str]) -> Self {
            ScriptedRecognizer(Mutex::new(replies.iter().copied().collect()))
        }
    }

    #[async_trait]
    impl TextRecognizer for ScriptedRecognizer {
        async fn recognize(&self, png: &[u8]) -> Result<String> {
            assert!(image::load_from_memory(png).is_ok());
            Ok(self.0.lock().unwrap().pop_front().unwrap_or("").to_string())
        }
    }
}
