use std::sync::LazyLock;

use anyhow::{Context, Result};
use lopdf::Document;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::prefecture::is_japanese_name;

const DEFAULT_RECOVERY_COL: usize = 7;
const CASES_COL: usize = 2;
const FIRST_PREFECTURE: &str = "北海道";
const PREFECTURE_COUNT: usize = 47;

static CELL_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\t|\s{2,}").unwrap());
static NAME_NOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"※[0-9]|\s").unwrap());
static NUMBER_NOTE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"※[0-9] ").unwrap());
static NON_DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^0-9]+").unwrap());
static RECOVERY_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^退院").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefectureCount {
    pub prefecture: String,
    pub cases: Option<u64>,
    pub recoveries: Option<u64>,
}

/// Cases and recoveries per prefecture from the first page of the PDF.
pub fn extract_cases_recoveries(pdf: &[u8], verbose: bool) -> Result<Vec<PrefectureCount>> {
    let text = page_text(pdf)?;
    if verbose {
        info!("PDF page 1 text:\n{}", text);
    }
    Ok(parse_prefecture_table(&text))
}

/// Text of page 1, one line per text row.
pub fn page_text(pdf: &[u8]) -> Result<String> {
    let doc = Document::load_mem(pdf).context("Failed to load recovery PDF")?;
    doc.extract_text(&[1])
        .context("Failed to extract text from recovery PDF page 1")
}

pub fn parse_prefecture_table(text: &str) -> Vec<PrefectureCount> {
    let rows: Vec<Vec<String>> = text
        .lines()
        .map(split_cells)
        .filter(|cells| !cells.is_empty())
        .collect();

    let Some(first_row) = rows
        .iter()
        .position(|cells| clean_name(&cells[0]) == FIRST_PREFECTURE)
    else {
        warn!("Unable to find first row ({}) in PDF table", FIRST_PREFECTURE);
        debug!("{:#?}", rows);
        return Vec::new();
    };

    let recovery_col = rows[..first_row]
        .iter()
        .find_map(|cells| cells.iter().position(|c| RECOVERY_HEADER_RE.is_match(c)))
        .unwrap_or(DEFAULT_RECOVERY_COL);
    info!("Recovery column at {}", recovery_col);

    rows[first_row..]
        .iter()
        .take_while(|cells| is_japanese_name(&clean_name(&cells[0])))
        .take(PREFECTURE_COUNT)
        .map(|cells| PrefectureCount {
            prefecture: clean_name(&cells[0]),
            cases: cells.get(CASES_COL).and_then(|c| clean_number(c)),
            recoveries: cells.get(recovery_col).and_then(|c| clean_number(c)),
        })
        .collect()
}

fn split_cells(line: &str) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }
    let mut cells: Vec<String> = CELL_SPLIT_RE
        .split(line)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if cells.len() == 1 {
        cells = line.split_whitespace().map(str::to_string).collect();
    }
    cells
}

fn clean_name(cell: &str) -> String {
    NAME_NOTE_RE.replace_all(cell, "").into_owned()
}

fn clean_number(cell: &str) -> Option<u64> {
    let without_note = NUMBER_NOTE_RE.replace_all(cell, "");
    NON_DIGIT_RE.replace_all(&without_note, "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefecture::PREFECTURES;

    fn table_text(rows: usize) -> String {
        let mut text = String::from(
            "各都道府県の検査陽性者の状況\n\
             都道府県名  PCR検査実施人数  陽性者数  入院治療等を要する者  うち重症  退院又は療養解除となった者の数  死亡（累積）\n\
             \n",
        );
        for (i, (ja, _, _)) in PREFECTURES.iter().take(rows).enumerate() {
            let name = if i == 12 { format!("{}※1", ja) } else { ja.to_string() };
            text.push_str(&format!(
                "{}  {}  {}  {}  {}  {}  {}\n",
                name,
                "1,200",
                i + 10,
                i + 5,
                1,
                i + 3,
                0
            ));
        }
        text.push_str("その他  20  10  3  0  7  0\n合計  2,000  1,000  300  10  700  20\n");
        text
    }

    #[test]
    fn header_locates_recovery_column() {
        let rows = parse_prefecture_table(&table_text(47));
        assert_eq!(rows.len(), 47);
        assert_eq!(rows[0].prefecture, "北海道");
        assert_eq!(rows[0].recoveries, Some(3));
        assert_eq!(rows[46].prefecture, "沖縄県");
        assert_eq!(rows[46].recoveries, Some(49));
    }

    #[test]
    fn short_prefecture_names() {
        let mut text = String::from("都道府県名  陽性者数  入院治療等を要する者  退院者\n");
        for (i, (ja, _, _)) in PREFECTURES.iter().enumerate() {
            let short: &str = if i == 0 { ja } else { &ja[..ja.len() - '県'.len_utf8()] };
            text.push_str(&format!("{}  {}  {}  {}\n", short, i, i + 100, i + 1));
        }
        text.push_str("合計  1  2  3\n");

        let rows = parse_prefecture_table(&text);
        assert_eq!(rows.len(), 47);
        assert_eq!(rows[25].prefecture, "京都");
        assert_eq!(rows[25].recoveries, Some(26));
        assert_eq!(rows[46].prefecture, "沖縄");
    }

    #[test]
    fn cases_use_third_column() {
        let rows = parse_prefecture_table(&table_text(47));
        assert_eq!(rows[0].cases, Some(10));
        assert_eq!(rows[46].cases, Some(56));
    }

    #[test]
    fn notes_are_stripped_from_names() {
        let rows = parse_prefecture_table(&table_text(47));
        assert_eq!(rows[12].prefecture, "東京都");
    }

    #[test]
    fn totals_are_not_prefectures() {
        let rows = parse_prefecture_table(&table_text(47));
        assert!(rows.iter().all(|r| r.prefecture != "合計" && r.prefecture != "その他"));
    }

    #[test]
    fn missing_first_row() {
        assert!(parse_prefecture_table("都道府県名  陽性者数\n東京都  1  2\n").is_empty());
    }

    #[test]
    fn default_recovery_column_without_header() {
        let text = "北海道  1  2  3  4  5  6  77  8\n青森県  1  2  3  4  5  6  88  8\n";
        let rows = parse_prefecture_table(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].recoveries, Some(88));
    }

    #[test]
    fn number_cleaning() {
        assert_eq!(clean_number("1,234"), Some(1234));
        assert_eq!(clean_number("※2 56"), Some(56));
        assert_eq!(clean_number("-"), None);
    }

    #[test]
    fn single_space_rows_fall_back_to_whitespace() {
        assert_eq!(split_cells("北海道 1 2 3"), vec!["北海道", "1", "2", "3"]);
    }
}
