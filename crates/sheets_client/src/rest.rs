//! REST client for the Sheets API (v4 surface).
//!
//! One authenticated session per process: the bearer token is obtained at
//! `connect` time and the client is cloned everywhere it is needed. Every
//! remote call goes through the shared rate limiter first.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use common::Error;

use crate::auth::SheetsAuth;
use crate::rate_limit::RateLimiter;
use crate::source::{TabularSource, WorkbookHandle};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com";

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn resolve_base_url() -> String {
    if let Ok(override_url) = std::env::var("SHEETS_API_BASE_URL") {
        let normalized = normalize_base_url(&override_url);
        if !normalized.is_empty() {
            info!("Using SHEETS_API_BASE_URL override: {}", normalized);
            return normalized;
        }
        warn!("Ignoring empty SHEETS_API_BASE_URL override");
    }

    DEFAULT_BASE_URL.to_string()
}

fn format_reqwest_error(err: &reqwest::Error) -> String {
    // Keep chained causes so network failures (DNS/TLS/socket) are visible.
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    message
}

fn summarize_response_body(raw: &str) -> String {
    const MAX_CHARS: usize = 500;
    let compact: String = raw.replace(['\n', '\r'], " ");
    if compact.chars().count() > MAX_CHARS {
        let truncated: String = compact.chars().take(MAX_CHARS).collect();
        format!("{}…", truncated)
    } else {
        compact
    }
}

/// A1 range selecting a whole tab, with the name quoted.
fn a1_range(tab: &str) -> String {
    format!("'{}'", tab.replace('\'', "''"))
}

fn map_status(status: u16, body: &str, context: &str) -> Error {
    let msg = format!(
        "{} (status={}): {}",
        context,
        status,
        summarize_response_body(body)
    );
    match status {
        429 => Error::QuotaExceeded(msg),
        401 | 403 => Error::Unauthorized(msg),
        404 => Error::NotFound(msg),
        s if s >= 500 => Error::Transient(msg),
        _ => Error::Malformed(msg),
    }
}

fn cell_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(true) => "TRUE".to_string(),
        serde_json::Value::Bool(false) => "FALSE".to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ── Response types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    properties: Option<DocumentProperties>,
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct DocumentProperties {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: TabProperties,
}

#[derive(Debug, Deserialize)]
struct TabProperties {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

async fn fetch_access_token(client: &reqwest::Client, auth: &SheetsAuth) -> Result<String, Error> {
    let assertion = auth.signed_assertion();

    let resp = client
        .post(auth.token_uri())
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Transient(format_reqwest_error(&e)))?;

    let status = resp.status().as_u16();
    if status != 200 {
        let body = resp.text().await.unwrap_or_default();
        // A rejected assertion is a credential problem regardless of the
        // exact 4xx the endpoint picks.
        if (400..500).contains(&status) {
            return Err(Error::Unauthorized(format!(
                "token exchange rejected (status={}): {}",
                status,
                summarize_response_body(&body)
            )));
        }
        return Err(map_status(status, &body, "token exchange"));
    }

    let token: TokenResponse = resp
        .json()
        .await
        .map_err(|e| Error::Malformed(format!("token response: {}", format_reqwest_error(&e))))?;

    Ok(token.access_token)
}

/// Async REST client for the spreadsheet backend.
#[derive(Debug, Clone)]
pub struct SheetsRestClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: String,
    limiter: RateLimiter,
}

impl SheetsRestClient {
    /// Build the pooled HTTP client and establish the session.
    ///
    /// Construction is expensive (token exchange) and happens once; the
    /// client is then cloned by callers.
    pub async fn connect(auth: SheetsAuth, limiter: RateLimiter) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let bearer_token = fetch_access_token(&client, &auth).await?;
        info!("Sheets session established for {}", auth.client_email());

        Ok(Self {
            client,
            base_url: resolve_base_url(),
            bearer_token,
            limiter,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<T, Error> {
        self.limiter.acquire().await;

        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::Transient(format_reqwest_error(&e)))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_status(status, &body, context));
        }

        resp.json()
            .await
            .map_err(|e| Error::Malformed(format!("{}: {}", context, format_reqwest_error(&e))))
    }

    async fn post_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: serde_json::Value,
        context: &str,
    ) -> Result<(), Error> {
        self.limiter.acquire().await;

        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.bearer_token)
            .query(query)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transient(format_reqwest_error(&e)))?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            return Err(map_status(status, &body, context));
        }

        Ok(())
    }
}

#[async_trait]
impl TabularSource for SheetsRestClient {
    async fn open(&self, spreadsheet_id: &str) -> Result<WorkbookHandle, Error> {
        let doc: SpreadsheetResponse = self
            .get_json(
                &format!("/v4/spreadsheets/{}", spreadsheet_id),
                &[("fields", "properties.title")],
                "open spreadsheet",
            )
            .await?;

        let title = doc.properties.map(|p| p.title).unwrap_or_default();
        debug!("Opened spreadsheet {} ({})", spreadsheet_id, title);

        Ok(WorkbookHandle {
            spreadsheet_id: spreadsheet_id.to_string(),
            title,
        })
    }

    async fn list_tabs(&self, wb: &WorkbookHandle) -> Result<Vec<String>, Error> {
        let doc: SpreadsheetResponse = self
            .get_json(
                &format!("/v4/spreadsheets/{}", wb.spreadsheet_id),
                &[("fields", "sheets.properties.title")],
                "list tabs",
            )
            .await?;

        Ok(doc.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn read_all_cells(
        &self,
        wb: &WorkbookHandle,
        tab: &str,
    ) -> Result<Vec<Vec<String>>, Error> {
        let range: ValueRange = self
            .get_json(
                &format!(
                    "/v4/spreadsheets/{}/values/{}",
                    wb.spreadsheet_id,
                    a1_range(tab)
                ),
                &[("majorDimension", "ROWS")],
                &format!("read tab '{}'", tab),
            )
            .await?;

        let grid: Vec<Vec<String>> = range
            .values
            .iter()
            .map(|row| row.iter().map(cell_to_string).collect())
            .collect();

        debug!("Read {} rows from tab '{}'", grid.len(), tab);
        Ok(grid)
    }

    async fn read_records(
        &self,
        wb: &WorkbookHandle,
        tab: &str,
    ) -> Result<Vec<HashMap<String, String>>, Error> {
        let grid = self.read_all_cells(wb, tab).await?;

        let mut rows = grid.into_iter();
        let header = match rows.next() {
            Some(h) => h,
            None => return Ok(Vec::new()),
        };

        let records = rows
            .map(|row| {
                header
                    .iter()
                    .enumerate()
                    .filter(|(_, field)| !field.trim().is_empty())
                    .map(|(i, field)| {
                        (
                            field.trim().to_string(),
                            row.get(i).cloned().unwrap_or_default(),
                        )
                    })
                    .collect()
            })
            .collect();

        Ok(records)
    }

    async fn append_rows(
        &self,
        wb: &WorkbookHandle,
        tab: &str,
        rows: Vec<Vec<String>>,
    ) -> Result<(), Error> {
        let count = rows.len();
        self.post_json(
            &format!(
                "/v4/spreadsheets/{}/values/{}:append",
                wb.spreadsheet_id,
                a1_range(tab)
            ),
            &[
                ("valueInputOption", "USER_ENTERED"),
                ("insertDataOption", "INSERT_ROWS"),
            ],
            json!({ "values": rows }),
            &format!("append to tab '{}'", tab),
        )
        .await?;

        debug!("Appended {} rows to tab '{}'", count, tab);
        Ok(())
    }

    async fn add_tab(&self, wb: &WorkbookHandle, tab: &str) -> Result<(), Error> {
        self.post_json(
            &format!("/v4/spreadsheets/{}:batchUpdate", wb.spreadsheet_id),
            &[],
            json!({
                "requests": [
                    { "addSheet": { "properties": { "title": tab } } }
                ]
            }),
            &format!("create tab '{}'", tab),
        )
        .await?;

        info!("Created tab '{}' in {}", tab, wb.spreadsheet_id);
        Ok(())
    }
}
