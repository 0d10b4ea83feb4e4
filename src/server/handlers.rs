use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::fetch::strip_query;
use crate::mhlw;
use crate::patients::{self, PatientUpdate, WriteMode};
use crate::pipeline::{self, ExtractOptions};

/// Any failure inside a handler, rendered as `{"error": msg}` with a 500.
pub struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("{:#}", self.0) })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// GET /
pub async fn root(State(state): State<Arc<AppState>>) -> String {
    format!("Hello {}!", state.name)
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    pub prefecture: Option<String>,
    pub date: Option<String>,
    pub cases: Option<String>,
    pub deceased: Option<String>,
    pub source: Option<String>,
}

/// GET /patients/update
pub async fn patients_update(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatientQuery>,
) -> ApiResult<Response> {
    let (Some(prefecture), Some(date)) = (non_empty(&query.prefecture), non_empty(&query.date)) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Required parameters prefecture= and date= not found." })),
        )
            .into_response());
    };

    let cases = parse_count("cases", &query.cases)?;
    let deceased = parse_count("deceased", &query.deceased)?;
    let source = non_empty(&query.source).map(strip_query).unwrap_or_default();

    if cases.is_none() && deceased.is_none() {
        return Ok(Html(count_form(prefecture, date, &source)).into_response());
    }

    let update = PatientUpdate {
        prefecture: prefecture.to_string(),
        date: date.to_string(),
        cases,
        deceased,
        source,
    };
    info!(?update, "Patient update requested");
    let rows = patients::write_patients(state.services.sheets()?, &update, WriteMode::default()).await?;
    Ok(Json(json!({ "updateRows": rows })).into_response())
}

/// GET /mhlw/reporturl
pub async fn report_url(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let services = &state.services;
    let url = mhlw::latest_report_url(&services.fetcher, &services.settings.index_url).await?;
    Ok(Json(json!({ "result": { "url": url } })))
}

/// GET /mhlw/today - extract and write today's report
pub async fn report_today(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let services = &state.services;
    let opts = ExtractOptions::today(&services.settings, true);
    let outcome = pipeline::report_today(services, &opts).await?;
    Ok(Json(json!({ "result": outcome.to_string() })))
}

#[derive(Debug, Default, Deserialize)]
pub struct PortQuery {
    pub write: Option<String>,
}

/// GET /mhlw/port
pub async fn port_cases(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PortQuery>,
) -> ApiResult<impl IntoResponse> {
    let services = &state.services;
    let outcome = pipeline::port_cases(services, &services.settings.index_url, query.write.is_some()).await?;
    Ok(Json(json!({ "result": outcome })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// GET /proxy - relay an upstream resource with a permissive CORS header
pub async fn proxy(State(state): State<Arc<AppState>>, Query(query): Query<ProxyQuery>) -> Response {
    let Some(url) = non_empty(&query.url) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let fetched = match state.services.fetcher.get(url).await {
        Ok(f) => f,
        Err(e) => {
            error!("Proxy fetch of {} failed: {:#}", url, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let status = StatusCode::from_u16(fetched.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, fetched.body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    match fetched.content_type.as_deref().map(HeaderValue::from_str) {
        Some(Ok(value)) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        _ => {
            headers.remove(header::CONTENT_TYPE);
        }
    }
    response
}

// ── Helpers ──

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_count(name: &str, value: &Option<String>) -> anyhow::Result<Option<u64>> {
    non_empty(value)
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| anyhow::anyhow!("{}= must be a whole number, got {:?}", name, v))
        })
        .transpose()
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Form asking for the missing numbers; submits back to this route.
fn count_form(prefecture: &str, date: &str, source: &str) -> String {
    let prefecture = escape_html(prefecture);
    let date = escape_html(date);
    let source = escape_html(source);
    format!(
        r#"<html>
<head><title>Update {prefecture} {date}</title></head>
<body style="font-family: sans-serif;">
<h1>{prefecture} {date}</h1>
<p><a href="{source}">{source}</a></p>
<form method="get" action="/patients/update">
<input type="hidden" name="prefecture" value="{prefecture}">
<input type="hidden" name="date" value="{date}">
<input type="hidden" name="source" value="{source}">
<label>Cases <input type="number" name="cases" min="0"></label>
<label>Deceased <input type="number" name="deceased" min="0"></label>
<input type="submit" value="Update">
</form>
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::ocr::fake::ScriptedRecognizer;
    use crate::ocr::TextRecognizer;
    use crate::pipeline::Services;
    use crate::server::router;
    use crate::sheets::fake::FakeSheets;
    use crate::sheets::SheetsApi;
    use crate::stub_site::{self, settings_for, Site};
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get as get_route;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app_with(
        settings: Settings,
        sheets: Option<Arc<FakeSheets>>,
        ocr: Option<ScriptedRecognizer>,
    ) -> axum::Router {
        let sheets = sheets.map(|s| s as Arc<dyn SheetsApi>);
        let ocr = ocr.map(|o| Arc::new(o) as Arc<dyn TextRecognizer>);
        let services = Services::with_clients(settings, sheets, ocr).unwrap();
        router(Arc::new(AppState {
            services,
            name: "Tester".into(),
        }))
    }

    fn app(sheets: Option<Arc<FakeSheets>>) -> axum::Router {
        app_with(Settings::for_tests(), sheets, None)
    }

    async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get(app, uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn hello() {
        let (status, body) = get(app(None), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hello Tester!");
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = get(app(None), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn patients_requires_prefecture_and_date() {
        let (status, body) = get(app(None), "/patients/update?prefecture=Tokyo").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Required parameters prefecture= and date= not found."));
    }

    #[tokio::test]
    async fn patients_without_counts_shows_form() {
        let (status, body) = get(
            app(None),
            "/patients/update?prefecture=Tokyo&date=2020-05-01&source=https%3A%2F%2Fexample.com%2Fa%3Fx%3D1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<form"));
        assert!(body.contains(r#"name="prefecture" value="Tokyo""#));
        assert!(body.contains(r#"value="https://example.com/a""#));
    }

    #[tokio::test]
    async fn patients_appends_count_row() {
        let fake = Arc::new(FakeSheets::new());
        fake.add_tab(3, "Tokyo", 40);
        let (status, body) = get(
            app(Some(fake.clone())),
            "/patients/update?prefecture=Tokyo&date=2020-05-01&cases=12",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"updateRows":1}"#);
        assert_eq!(fake.appends()[0].0, "'Tokyo'!A:E");
    }

    #[tokio::test]
    async fn patients_bad_count_is_error() {
        let (status, body) = get(
            app(None),
            "/patients/update?prefecture=Tokyo&date=2020-05-01&cases=lots",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("cases= must be a whole number"));
    }

    #[tokio::test]
    async fn patients_without_credentials_is_error() {
        let (status, body) = get(
            app(None),
            "/patients/update?prefecture=Tokyo&date=2020-05-01&cases=3",
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.starts_with(r#"{"error":"#));
    }

    #[tokio::test]
    async fn proxy_requires_url() {
        let (status, _) = get(app(None), "/proxy").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn report_url_route() {
        let base = Site::default().serve().await;
        let (status, body) = get_json(app_with(settings_for(&base), None, None), "/mhlw/reporturl").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["result"]["url"],
            format!("{}{}", base, stub_site::REPORT_PATH)
        );
    }

    #[tokio::test]
    async fn today_route_writes_summary() {
        let site = Site {
            report: stub_site::fixture("mhlw_report").replace("別紙１", "参考"),
            ..Site::default()
        };
        let base = site.serve().await;
        let sheets = Arc::new(FakeSheets::new());
        let ocr = ScriptedRecognizer::new(&["180,000", "250", "6,000", "120", "480"]);

        let (status, body) = get_json(
            app_with(settings_for(&base), Some(sheets.clone()), Some(ocr)),
            "/mhlw/today",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let text = body["result"].as_str().unwrap();
        assert!(text.starts_with("Date: 2020-05-01\n"));
        assert!(text.contains(r#""pcr":180000"#));
        assert_eq!(sheets.appends().len(), 1);
    }

    #[tokio::test]
    async fn today_route_reports_missing_pdf() {
        let base = Site::default().serve().await;
        let (status, body) = get_json(app_with(settings_for(&base), None, None), "/mhlw/today").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn port_route_writes_when_asked() {
        let base = Site::default().serve().await;
        let sheets = Arc::new(FakeSheets::new());
        sheets.add_tab(4, "Patient Data", 40);

        let (status, body) = get_json(
            app_with(settings_for(&base), Some(sheets.clone()), None),
            "/mhlw/port?write=1",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["count"], 5);
        assert_eq!(body["result"]["date"], "2020-05-02");
        assert_eq!(body["result"]["updatedRows"], 1);

        let (_, body) = get_json(app_with(settings_for(&base), Some(sheets.clone()), None), "/mhlw/port").await;
        assert!(body["result"]["updatedRows"].is_null());
        assert_eq!(sheets.appends().len(), 1);
    }

    #[tokio::test]
    async fn proxy_relays_upstream() {
        let upstream = axum::Router::new().route(
            "/data.json",
            get_route(|| async {
                (
                    StatusCode::NOT_FOUND,
                    [(header::CONTENT_TYPE, "application/json")],
                    r#"{"missing":true}"#,
                )
            }),
        );
        let base = stub_site::serve(upstream).await;

        let resp = app_with(settings_for(&base), None, None)
            .oneshot(
                Request::builder()
                    .uri(format!("/proxy?url={}/data.json", base))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"missing":true}"#);
    }

    #[test]
    fn escapes_form_values() {
        assert_eq!(escape_html(r#"<a href="x">&</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }
}
