//! Local stand-in for mhlw.go.jp, serving the HTML fixtures over real HTTP.

use std::io::Cursor;

use axum::{
    http::header,
    response::Html,
    routing::{get, MethodRouter},
    Router,
};
use image::{ImageFormat, Rgba, RgbaImage};

pub const INDEX_PATH: &str = "/index.html";
pub const REPORT_PATH: &str = "/stf/newpage_10989.html";
pub const PORT_PATH: &str = "/stf/newpage_10990.html";
pub const PDF_PATH: &str = "/content/10906000/000626110.pdf";
const IMAGE_PATH: &str = "/content/10906000/000626109.png";

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
}

/// Bind `router` on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn page(body: String) -> MethodRouter {
    get(move || {
        let body = body.clone();
        async move { Html(body) }
    })
}

/// Blank 661x181 PNG standing in for the summary table screenshot.
pub fn summary_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(661, 181, Rgba([255, 255, 255, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Index, daily report, port report and summary image. The prefecture PDF is
/// not served, so fetching it gets a 404.
pub struct Site {
    pub report: String,
    pub port: String,
}

impl Default for Site {
    fn default() -> Self {
        Self {
            report: fixture("mhlw_report"),
            port: fixture("mhlw_port"),
        }
    }
}

impl Site {
    pub fn router(self) -> Router {
        Router::new()
            .route(INDEX_PATH, page(fixture("mhlw_index")))
            .route(REPORT_PATH, page(self.report))
            .route(PORT_PATH, page(self.port))
            .route(
                IMAGE_PATH,
                get(|| async { ([(header::CONTENT_TYPE, "image/png")], summary_png()) }),
            )
    }

    /// Serve the site; returns the base URL.
    pub async fn serve(self) -> String {
        serve(self.router()).await
    }
}

/// Settings pointing at a stub base URL, with near-zero retry backoff.
pub fn settings_for(base: &str) -> crate::config::Settings {
    let mut settings = crate::config::Settings::for_tests();
    settings.index_url = format!("{}{}", base, INDEX_PATH);
    settings.retry_backoff_ms = 1;
    settings
}
