//! Upstream element fetchers.
//!
//! Each fetcher talks to exactly one upstream and either returns a validated
//! [`ElementSet`] or a [`FetchError`]; none of them retries; the chain is
//! the fallback mechanism.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use skywatch_common::tle::{catalog_number, is_element_line};
use skywatch_common::{ElementSet, MalformedElementData, NoradId};
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::FetchError;

/// One upstream able to produce element sets by catalog number.
#[async_trait]
pub trait ElementSource: Send + Sync {
    /// Short name used in logs, error reports and `ElementSet::source`
    fn name(&self) -> &str;

    async fn fetch(&self, norad_id: NoradId) -> Result<ElementSet, FetchError>;
}

/// Build the HTTP client shared by all fetchers.
///
/// Both the connect phase and the whole request are bounded so a stalled
/// upstream surfaces as an ordinary fetch failure.
pub fn build_http_client(config: &HttpConfig) -> anyhow::Result<Client> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .timeout(Duration::from_secs(config.request_timeout_seconds))
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(client)
}

async fn get_text(request: reqwest::RequestBuilder, norad_id: NoradId) -> Result<String, FetchError> {
    let response = request.send().await?;

    match response.status() {
        status if status.is_success() => Ok(response.text().await?),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound(norad_id)),
        status => Err(FetchError::Status(status)),
    }
}

fn fallback_name(norad_id: NoradId) -> String {
    format!("CATNR {}", norad_id)
}

/// CelesTrak GP query (`?CATNR=<id>&FORMAT=TLE`).
pub struct CelestrakSource {
    client: Client,
    url: String,
}

impl CelestrakSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ElementSource for CelestrakSource {
    fn name(&self) -> &str {
        "celestrak"
    }

    async fn fetch(&self, norad_id: NoradId) -> Result<ElementSet, FetchError> {
        let catnr = norad_id.to_string();
        let request = self
            .client
            .get(&self.url)
            .query(&[("CATNR", catnr.as_str()), ("FORMAT", "TLE")]);

        let body = get_text(request, norad_id).await?;
        parse_celestrak_response(norad_id, &body, self.name(), Utc::now())
    }
}

/// Parse a CelesTrak TLE response: an optional name line followed by the
/// two element lines.
pub fn parse_celestrak_response(
    norad_id: NoradId,
    body: &str,
    source: &str,
    fetched_at: DateTime<Utc>,
) -> Result<ElementSet, FetchError> {
    let lines: Vec<&str> = body.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

    if !lines.iter().any(|line| is_element_line(line)) {
        // CelesTrak answers unknown ids with a plain-text notice and HTTP 200
        return Err(FetchError::NotFound(norad_id));
    }

    let (name, line1, line2) = match lines.as_slice() {
        [first, second, ..] if first.starts_with("1 ") => (fallback_name(norad_id), *first, *second),
        [name, line1, line2, ..] => (name.to_string(), *line1, *line2),
        _ => return Err(MalformedElementData::Missing("second element line").into()),
    };

    Ok(ElementSet::new(norad_id, name, line1, line2, source, fetched_at)?)
}

/// JSON TLE API addressed as `{url}/{norad_id}`.
pub struct TleApiSource {
    client: Client,
    url: String,
}

impl TleApiSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TleApiRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    line1: Option<String>,
    #[serde(default)]
    line2: Option<String>,
}

#[async_trait]
impl ElementSource for TleApiSource {
    fn name(&self) -> &str {
        "tle_api"
    }

    async fn fetch(&self, norad_id: NoradId) -> Result<ElementSet, FetchError> {
        let url = format!("{}/{}", self.url.trim_end_matches('/'), norad_id);
        let body = get_text(self.client.get(&url), norad_id).await?;
        parse_tle_api_response(norad_id, &body, self.name(), Utc::now())
    }
}

pub fn parse_tle_api_response(
    norad_id: NoradId,
    body: &str,
    source: &str,
    fetched_at: DateTime<Utc>,
) -> Result<ElementSet, FetchError> {
    let record: TleApiRecord = serde_json::from_str(body)
        .map_err(|_| MalformedElementData::Missing("a JSON element record"))?;

    let line1 = record.line1.ok_or(MalformedElementData::Missing("line1"))?;
    let line2 = record.line2.ok_or(MalformedElementData::Missing("line2"))?;
    let name = record
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| fallback_name(norad_id));

    Ok(ElementSet::new(norad_id, name, &line1, &line2, source, fetched_at)?)
}

/// Bulk element bulletin (plain text or an HTML page with `<pre>` blocks).
pub struct BulletinSource {
    client: Client,
    url: String,
}

impl BulletinSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ElementSource for BulletinSource {
    fn name(&self) -> &str {
        "bulletin"
    }

    async fn fetch(&self, norad_id: NoradId) -> Result<ElementSet, FetchError> {
        let body = get_text(self.client.get(&self.url), norad_id).await?;
        let text = bulletin_text(&body);
        scan_bulletin(norad_id, &text, self.name(), Utc::now())
    }
}

/// Plain text of a bulletin; HTML pages contribute the content of their
/// `<pre>` elements only.
pub fn bulletin_text(body: &str) -> String {
    let lowered = body.trim_start().to_ascii_lowercase();
    if !(lowered.starts_with("<!doctype") || lowered.starts_with("<html") || lowered.contains("<pre")) {
        return body.to_string();
    }

    let document = Html::parse_document(body);
    let Ok(selector) = Selector::parse("pre") else {
        return body.to_string();
    };

    document
        .select(&selector)
        .map(|pre| pre.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Find the block whose first element line carries `norad_id`.
///
/// The name is taken from the line preceding the block when that line is
/// not itself an element line.
pub fn scan_bulletin(
    norad_id: NoradId,
    text: &str,
    source: &str,
    fetched_at: DateTime<Utc>,
) -> Result<ElementSet, FetchError> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let wanted = norad_id.to_string();

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with("1 ") || catalog_number(line) != Some(wanted.as_str()) {
            continue;
        }

        let Some(line2) = lines.get(i + 1) else {
            return Err(MalformedElementData::Missing("second element line").into());
        };
        let name = match i.checked_sub(1).map(|j| lines[j]) {
            Some(prev) if !is_element_line(prev) => prev.to_string(),
            _ => fallback_name(norad_id),
        };

        return Ok(ElementSet::new(norad_id, name, line, line2, source, fetched_at)?);
    }

    Err(FetchError::NotFound(norad_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_L1: &str = "1 25544U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  9992";
    const ISS_L2: &str = "2 25544  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";
    const CSS_L1: &str = "1 48274U 21035A   24079.54172905  .00031212  00000+0  35522-3 0  9999";
    const CSS_L2: &str = "2 48274  41.4675 318.4113 0006101 302.8806  57.1358 15.62058462167956";

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_celestrak_three_line_response() {
        let body = format!("ISS (ZARYA)             \r\n{}\r\n{}\r\n", ISS_L1, ISS_L2);
        let set = parse_celestrak_response(25544, &body, "celestrak", now()).unwrap();

        assert_eq!(set.name, "ISS (ZARYA)");
        assert_eq!(set.line1, ISS_L1);
        assert_eq!(set.line2, ISS_L2);
        assert_eq!(set.source, "celestrak");
    }

    #[test]
    fn test_celestrak_two_line_response_gets_fallback_name() {
        let body = format!("{}\n{}\n", ISS_L1, ISS_L2);
        let set = parse_celestrak_response(25544, &body, "celestrak", now()).unwrap();
        assert_eq!(set.name, "CATNR 25544");
    }

    #[test]
    fn test_celestrak_unknown_id_is_not_found() {
        let result = parse_celestrak_response(99999, "No GP data found", "celestrak", now());
        assert!(matches!(result, Err(FetchError::NotFound(99999))));
    }

    #[test]
    fn test_celestrak_truncated_response_is_malformed() {
        let body = format!("ISS (ZARYA)\n{}\n{}\n", ISS_L1, &ISS_L2[..30]);
        let result = parse_celestrak_response(25544, &body, "celestrak", now());
        assert!(matches!(result, Err(FetchError::Malformed(MalformedElementData::TooShort { line: 2, .. }))));
    }

    #[test]
    fn test_celestrak_wrong_object_is_malformed() {
        let body = format!("CSS (TIANHE)\n{}\n{}\n", CSS_L1, CSS_L2);
        let result = parse_celestrak_response(25544, &body, "celestrak", now());
        assert!(matches!(
            result,
            Err(FetchError::Malformed(MalformedElementData::CatalogMismatch { .. }))
        ));
    }

    #[test]
    fn test_tle_api_record() {
        let body = format!(
            r#"{{"@id":"x","satelliteId":25544,"name":"ISS (ZARYA)","date":"2020-07-12T21:16:01+00:00","line1":"{}","line2":"{}"}}"#,
            ISS_L1, ISS_L2
        );
        let set = parse_tle_api_response(25544, &body, "tle_api", now()).unwrap();
        assert_eq!(set.name, "ISS (ZARYA)");
        assert_eq!(set.source, "tle_api");
    }

    #[test]
    fn test_tle_api_missing_line_is_malformed() {
        let body = format!(r#"{{"name":"ISS (ZARYA)","line1":"{}"}}"#, ISS_L1);
        let result = parse_tle_api_response(25544, &body, "tle_api", now());
        assert!(matches!(result, Err(FetchError::Malformed(MalformedElementData::Missing("line2")))));

        let result = parse_tle_api_response(25544, "<html>oops</html>", "tle_api", now());
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_bulletin_scan_finds_matching_block() {
        let text = format!(
            "ISS (ZARYA)\n{}\n{}\nCSS (TIANHE)\n{}\n{}\n",
            ISS_L1, ISS_L2, CSS_L1, CSS_L2
        );
        let set = scan_bulletin(48274, &text, "bulletin", now()).unwrap();
        assert_eq!(set.name, "CSS (TIANHE)");
        assert_eq!(set.line1, CSS_L1);

        let missing = scan_bulletin(20580, &text, "bulletin", now());
        assert!(matches!(missing, Err(FetchError::NotFound(20580))));
    }

    #[test]
    fn test_bulletin_block_without_name_line() {
        let text = format!("{}\n{}\n{}\n{}\n", ISS_L1, ISS_L2, CSS_L1, CSS_L2);
        let set = scan_bulletin(48274, &text, "bulletin", now()).unwrap();
        assert_eq!(set.name, "CATNR 48274");
    }

    #[test]
    fn test_bulletin_html_pre_extraction() {
        let html = format!(
            "<!DOCTYPE html><html><body><h1>Station elements</h1><pre>ISS (ZARYA)\n{}\n{}\n</pre></body></html>",
            ISS_L1, ISS_L2
        );
        let text = bulletin_text(&html);
        assert!(!text.contains("Station elements"));

        let set = scan_bulletin(25544, &text, "bulletin", now()).unwrap();
        assert_eq!(set.name, "ISS (ZARYA)");
    }

    #[test]
    fn test_plain_bulletin_passes_through() {
        let body = format!("ISS (ZARYA)\n{}\n{}\n", ISS_L1, ISS_L2);
        assert_eq!(bulletin_text(&body), body);
    }

    /// Local upstream serving the shapes each fetcher expects.
    async fn spawn_upstream() -> String {
        use axum::extract::{Path, Query};
        use axum::http::StatusCode as HttpStatus;
        use axum::routing::get;
        use std::collections::HashMap;

        async fn gp(Query(params): Query<HashMap<String, String>>) -> Result<String, HttpStatus> {
            if params.get("FORMAT").map(String::as_str) != Some("TLE") {
                return Err(HttpStatus::BAD_REQUEST);
            }
            match params.get("CATNR").map(String::as_str) {
                Some("25544") => Ok(format!("ISS (ZARYA)\r\n{}\r\n{}\r\n", ISS_L1, ISS_L2)),
                Some(_) => Ok("No GP data found".to_string()),
                None => Err(HttpStatus::BAD_REQUEST),
            }
        }

        async fn tle_api(Path(id): Path<u32>) -> Result<String, HttpStatus> {
            if id != 25544 {
                return Err(HttpStatus::NOT_FOUND);
            }
            Ok(format!(r#"{{"name":"ISS (ZARYA)","line1":"{}","line2":"{}"}}"#, ISS_L1, ISS_L2))
        }

        async fn slow() -> String {
            tokio::time::sleep(Duration::from_secs(5)).await;
            format!("ISS (ZARYA)\n{}\n{}\n", ISS_L1, ISS_L2)
        }

        let app = axum::Router::new()
            .route("/gp", get(gp))
            .route("/api/{id}", get(tle_api))
            .route(
                "/bulletin",
                get(|| async { format!("CSS (TIANHE)\n{}\n{}\nISS (ZARYA)\n{}\n{}\n", CSS_L1, CSS_L2, ISS_L1, ISS_L2) }),
            )
            .route("/missing", get(|| async { HttpStatus::NOT_FOUND }))
            .route("/down", get(|| async { HttpStatus::SERVICE_UNAVAILABLE }))
            .route("/slow", get(slow));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn test_client() -> Client {
        build_http_client(&HttpConfig {
            request_timeout_seconds: 1,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_celestrak_sends_catalog_query() {
        let base = spawn_upstream().await;
        let source = CelestrakSource::new(test_client(), format!("{}/gp", base));

        let set = source.fetch(25544).await.unwrap();
        assert_eq!(set.name, "ISS (ZARYA)");
        assert_eq!(set.source, "celestrak");

        // Unknown ids come back as a 200 notice
        assert!(matches!(source.fetch(48274).await, Err(FetchError::NotFound(48274))));
    }

    #[tokio::test]
    async fn test_tle_api_appends_id_to_url() {
        let base = spawn_upstream().await;
        let source = TleApiSource::new(test_client(), format!("{}/api/", base));

        let set = source.fetch(25544).await.unwrap();
        assert_eq!(set.line2, ISS_L2);
        assert_eq!(set.source, "tle_api");

        assert!(matches!(source.fetch(48274).await, Err(FetchError::NotFound(48274))));
    }

    #[tokio::test]
    async fn test_bulletin_fetch_scans_page() {
        let base = spawn_upstream().await;
        let source = BulletinSource::new(test_client(), format!("{}/bulletin", base));

        let set = source.fetch(25544).await.unwrap();
        assert_eq!(set.name, "ISS (ZARYA)");
    }

    #[tokio::test]
    async fn test_http_status_mapping() {
        let base = spawn_upstream().await;

        let missing = BulletinSource::new(test_client(), format!("{}/missing", base));
        assert!(matches!(missing.fetch(25544).await, Err(FetchError::NotFound(25544))));

        let down = BulletinSource::new(test_client(), format!("{}/down", base));
        assert!(matches!(
            down.fetch(25544).await,
            Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE))
        ));
    }

    #[tokio::test]
    async fn test_timeout_is_an_ordinary_failure() {
        use crate::model::elements::SourceChain;

        let base = spawn_upstream().await;
        let client = test_client();

        match CelestrakSource::new(client.clone(), format!("{}/slow", base)).fetch(25544).await {
            Err(FetchError::Http(e)) => assert!(e.is_timeout()),
            other => panic!("expected a timeout, got {:?}", other.map(|s| s.source)),
        }

        let chain = SourceChain::new(vec![
            Box::new(CelestrakSource::new(client.clone(), format!("{}/slow", base))),
            Box::new(BulletinSource::new(client.clone(), format!("{}/bulletin", base))),
        ]);
        let set = chain.resolve(25544).await.unwrap();
        assert_eq!(set.source, "bulletin");

        let chain = SourceChain::new(vec![
            Box::new(CelestrakSource::new(client.clone(), format!("{}/slow", base))),
            Box::new(BulletinSource::new(client, format!("{}/down", base))),
        ]);
        let err = chain.resolve(25544).await.unwrap_err();
        assert!(matches!(err.failures[0].reason, FetchError::Http(_)));
        assert!(matches!(err.failures[1].reason, FetchError::Status(_)));
    }

    #[tokio::test]
    #[ignore] // Requires network connection
    async fn test_celestrak_live_fetch() {
        let client = build_http_client(&HttpConfig::default()).unwrap();
        let source = CelestrakSource::new(client, "https://celestrak.org/NORAD/elements/gp.php");
        let set = source.fetch(25544).await.unwrap();
        assert_eq!(set.norad_id, 25544);
    }
}
