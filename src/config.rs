use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

pub const DEFAULT_MHLW_INDEX_URL: &str =
    "https://www.mhlw.go.jp/stf/seisakunitsuite/bunya/topics_shingata_09444.html";
pub const DEFAULT_SPREADSHEET_ID: &str = "1vkw_Lku7F_F3F_iNmFFrDq9j7-tQ6EmZPOLpLt-s3TY";

const CONFIG_FILE: &str = "mhlw-sync.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub index_url: String,
    pub spreadsheet_id: String,
    pub credentials_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub sheets_base_url: String,
    pub vision_base_url: String,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// When set, each cropped OCR region is saved here as a PNG.
    #[serde(default)]
    pub image_dump_dir: Option<PathBuf>,
}

impl Settings {
    /// Defaults, then `mhlw-sync.toml` (or `$MHLW_CONFIG`), then `MHLW_*` env vars.
    pub fn load() -> Result<Self> {
        let file = std::env::var("MHLW_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(8080);

        let settings = Self::builder(port)?
            .add_source(File::with_name(&file).required(false))
            .add_source(Environment::with_prefix("MHLW"))
            .build()
            .context("Failed to assemble settings")?;

        settings
            .try_deserialize()
            .context("Failed to parse settings")
    }

    fn builder(port: u16) -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("index_url", DEFAULT_MHLW_INDEX_URL)?
            .set_default("spreadsheet_id", DEFAULT_SPREADSHEET_ID)?
            .set_default("credentials_path", "./credentials.json")?
            .set_default("host", "0.0.0.0")?
            .set_default("port", port as i64)?
            .set_default("sheets_base_url", "https://sheets.googleapis.com/v4")?
            .set_default("vision_base_url", "https://vision.googleapis.com/v1")?
            .set_default("user_agent", concat!("mhlw_sync/", env!("CARGO_PKG_VERSION")))?
            .set_default("max_retries", 3_i64)?
            .set_default("retry_backoff_ms", 2000_i64)?)
    }
}

#[cfg(test)]
impl Settings {
    pub fn for_tests() -> Self {
        Self::builder(8080)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::for_tests();
        assert_eq!(s.index_url, DEFAULT_MHLW_INDEX_URL);
        assert_eq!(s.spreadsheet_id, DEFAULT_SPREADSHEET_ID);
        assert_eq!(s.port, 8080);
        assert_eq!(s.max_retries, 3);
        assert!(s.image_dump_dir.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "spreadsheet_id = \"abc\"\nport = 9000\n").unwrap();

        let s: Settings = Settings::builder(8080)
            .unwrap()
            .add_source(File::from(path))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(s.spreadsheet_id, "abc");
        assert_eq!(s.port, 9000);
        assert_eq!(s.host, "0.0.0.0");
    }
}
