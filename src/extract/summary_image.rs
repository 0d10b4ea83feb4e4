use std::io::Cursor;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Rgba, RgbaImage};
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::SyncError;
use crate::ocr::TextRecognizer;

/// Every region below is expressed against this size.
pub const NORMALIZED_SIZE: (u32, u32) = (661, 181);

const ROW_H: u32 = 18;
const DOUBLE_ROW_H: u32 = 36;
const SECOND_ROW_Y: u32 = 86;
const LAST_ROW_Y: u32 = 145;

const PCR_COL: (u32, u32) = (70, 88);
const CRITICAL_COL: (u32, u32) = (320, 76);
const RECOVERY_COL: (u32, u32) = (400, 100);
const DEATHS_COL: (u32, u32) = (510, 68);

static OCR_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([0-9,$]+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    const fn cell(col: (u32, u32), y: u32, height: u32) -> Self {
        Region {
            x: col.0,
            y,
            width: col.1,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryField {
    Pcr,
    Critical,
    Recoveries,
    PortRecoveries,
    Deaths,
}

impl SummaryField {
    pub const ALL: [SummaryField; 5] = [
        SummaryField::Pcr,
        SummaryField::Critical,
        SummaryField::Recoveries,
        SummaryField::PortRecoveries,
        SummaryField::Deaths,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SummaryField::Pcr => "pcr",
            SummaryField::Critical => "critical",
            SummaryField::Recoveries => "recoveries",
            SummaryField::PortRecoveries => "portRecoveries",
            SummaryField::Deaths => "deaths",
        }
    }

    /// Candidate crops, tried in order. Taller variants catch numbers that
    /// wrap onto a second line.
    pub fn regions(self) -> Vec<Region> {
        match self {
            SummaryField::Pcr => vec![Region::cell(PCR_COL, LAST_ROW_Y, ROW_H)],
            SummaryField::Critical => vec![
                Region::cell(CRITICAL_COL, LAST_ROW_Y, ROW_H),
                Region::cell(CRITICAL_COL, LAST_ROW_Y, DOUBLE_ROW_H),
            ],
            SummaryField::Recoveries => vec![Region::cell(RECOVERY_COL, LAST_ROW_Y, ROW_H)],
            SummaryField::PortRecoveries => vec![
                Region::cell(RECOVERY_COL, SECOND_ROW_Y, ROW_H),
                Region::cell(RECOVERY_COL, SECOND_ROW_Y, DOUBLE_ROW_H),
            ],
            SummaryField::Deaths => vec![Region::cell(DEATHS_COL, LAST_ROW_Y, ROW_H)],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub pcr: Option<u64>,
    pub critical: Option<u64>,
    pub recoveries: Option<u64>,
    pub port_recoveries: Option<u64>,
    pub deaths: Option<u64>,
}

impl DailySummary {
    fn set(&mut self, field: SummaryField, value: u64) {
        let slot = match field {
            SummaryField::Pcr => &mut self.pcr,
            SummaryField::Critical => &mut self.critical,
            SummaryField::Recoveries => &mut self.recoveries,
            SummaryField::PortRecoveries => &mut self.port_recoveries,
            SummaryField::Deaths => &mut self.deaths,
        };
        *slot = Some(value);
    }
}

/// Bytes behind an `<img src>`: inline `data:` URIs are decoded here.
pub fn decode_data_uri(src: &str) -> Result<Vec<u8>> {
    let (meta, payload) = src
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| SyncError::InvalidImage("not a data URI".into()))?;
    if !meta.ends_with(";base64") {
        return Err(SyncError::InvalidImage(format!("unsupported data URI encoding: {}", meta)).into());
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| SyncError::InvalidImage(e.to_string()).into())
}

pub fn load_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| SyncError::InvalidImage(e.to_string()).into())
}

/// Flatten onto white, scale to `NORMALIZED_SIZE` and drop to grayscale.
pub fn normalize(image: &DynamicImage) -> GrayImage {
    let rgba = image.to_rgba8();
    let mut flat = RgbaImage::from_pixel(rgba.width(), rgba.height(), Rgba([255, 255, 255, 255]));
    imageops::overlay(&mut flat, &rgba, 0, 0);
    let resized = imageops::resize(&flat, NORMALIZED_SIZE.0, NORMALIZED_SIZE.1, FilterType::Triangle);
    DynamicImage::ImageRgba8(resized).to_luma8()
}

pub fn crop_png(image: &GrayImage, region: Region) -> Result<Vec<u8>> {
    let sub = imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image();
    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(sub)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .context("Failed to encode cropped region")?;
    Ok(buf)
}

/// First number in OCR output. OCR confuses `5` with `$`, so `$` counts as 5.
pub fn parse_ocr_number(text: &str) -> Option<u64> {
    let caps = OCR_NUMBER_RE.captures(text)?;
    caps[1].replace(',', "").replace('$', "5").parse().ok()
}

/// OCR each field's candidate regions in order, keeping the first that reads
/// as a number.
pub async fn extract_daily_summary(
    image: &DynamicImage,
    recognizer: &dyn TextRecognizer,
    dump_dir: Option<&Path>,
) -> Result<DailySummary> {
    let normalized = normalize(image);
    let mut summary = DailySummary::default();

    for field in SummaryField::ALL {
        for (i, region) in field.regions().into_iter().enumerate() {
            let png = crop_png(&normalized, region)?;
            if let Some(dir) = dump_dir {
                let path = dir.join(format!("{}{}.png", field.key(), i));
                std::fs::write(&path, &png).with_context(|| format!("Failed to write {:?}", path))?;
            }

            let text = recognizer.recognize(&png).await?;
            info!("Text for {} {}: {}", field.key(), i, text.trim());
            match parse_ocr_number(&text) {
                Some(n) => {
                    summary.set(field, n);
                    break;
                }
                None => warn!("Could not find number in {} {}: {:?}", field.key(), i, text),
            }
        }
    }

    Ok(summary)
}
