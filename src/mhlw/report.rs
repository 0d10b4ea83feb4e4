use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

const COVID_REPORT_NAME: &str = "新型コロナウイルス感染症の現在の状況";
const PORT_REPORT_NAME: &str = "新型コロナウイルス感染症の患者等の発生について（空港";
const PREFECTURE_PDF_NAMES: &[&str] = &["別紙１", "各都道府県の検査陽性者の状況"];

static A: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());
static IMG: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static TIME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("time").unwrap());
static CONTENT_BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.l-contentBody").unwrap());
static PORT_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".m-grid__col1 table").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());

static SYMPTOMATIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"検疫により新型コロナウイルスの患者(\d+)名").unwrap());
static ASYMPTOMATIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"無症状病原体保有者(\d+)名").unwrap());

/// Fields pulled from a report page. The parsed document is dropped once
/// these are extracted so the page can be held across awaits.
#[derive(Debug, Clone, Default)]
pub struct ReportPage {
    pub date: Option<String>,
    pub summary_image_src: Option<String>,
    pub recovery_pdf_link: Option<String>,
    pub port_case_count: u64,
}

impl ReportPage {
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        Self {
            date: report_date(&doc),
            summary_image_src: summary_image_src(&doc),
            recovery_pdf_link: recovery_pdf_link(&doc),
            port_case_count: port_case_count(&doc),
        }
    }
}

/// `datetime` of the first `<time>` element.
fn report_date(doc: &Html) -> Option<String> {
    doc.select(&TIME)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(str::to_string)
}

/// Source of the summary table screenshot.
fn summary_image_src(doc: &Html) -> Option<String> {
    let in_body = doc
        .select(&CONTENT_BODY)
        .next()
        .and_then(|body| body.select(&IMG).find_map(|img| non_empty_attr(img, "src")));

    in_body.or_else(|| {
        doc.select(&IMG)
            .filter_map(|img| non_empty_attr(img, "src"))
            .find(|src| src.starts_with("data:"))
    })
}

/// Href of the per-prefecture PDF, as written in the page. The last matching
/// link wins.
fn recovery_pdf_link(doc: &Html) -> Option<String> {
    doc.select(&A)
        .filter(|a| {
            let text = element_text(*a);
            PREFECTURE_PDF_NAMES.iter().any(|n| text.starts_with(n))
        })
        .filter_map(|a| non_empty_attr(a, "href"))
        .last()
}

/// Port quarantine cases: the sentence above the table, or the table's
/// data rows when that sentence is absent.
fn port_case_count(doc: &Html) -> u64 {
    let Some(table) = doc.select(&PORT_TABLE).next() else {
        return 0;
    };

    // First non-blank child of the table's container; the table itself
    // being first means there is no summary sentence.
    let header = table.parent().and_then(|parent| {
        parent
            .children()
            .map(|node| {
                let text = match node.value() {
                    Node::Text(t) => t.text.to_string(),
                    Node::Element(_) => ElementRef::wrap(node).map(element_text).unwrap_or_default(),
                    _ => String::new(),
                };
                (node.id(), text)
            })
            .find(|(_, text)| !text.trim().is_empty())
    });

    let header = match header {
        Some((id, text)) if id != table.id() => text,
        _ => return table.select(&TR).count().saturating_sub(1) as u64,
    };

    [&*SYMPTOMATIC_RE, &*ASYMPTOMATIC_RE]
        .iter()
        .filter_map(|re| re.captures(&header))
        .filter_map(|c| c[1].parse::<u64>().ok())
        .sum()
}

/// Href of the first link whose text contains the daily report title.
pub fn latest_report_link(html: &str) -> Option<String> {
    first_link_containing(html, COVID_REPORT_NAME)
}

/// Href of the first link to an airport quarantine report.
pub fn latest_port_report_link(html: &str) -> Option<String> {
    first_link_containing(html, PORT_REPORT_NAME)
}

fn first_link_containing(html: &str, needle: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let link = doc
        .select(&A)
        .filter(|a| element_text(*a).contains(needle))
        .find_map(|a| non_empty_attr(a, "href"));
    link
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>()
}

fn non_empty_attr(el: ElementRef, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
