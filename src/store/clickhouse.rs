//! ClickHouse store over the HTTP interface

use super::{Connector, Dialect, Row, Store};
use crate::config::StoreConfig;
use crate::error::{ConfigError, Error, StoreError};
use reqwest::header::HeaderMap;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";
const SUMMARY_HEADER: &str = "X-ClickHouse-Summary";

/// Opens [`ClickHouseStore`] handles
#[derive(Clone)]
pub struct ClickHouseConnector {
    client: reqwest::Client,
    url: Url,
    user: String,
    password: String,
}

impl ClickHouseConnector {
    /// Build the HTTP client. Fails on an unparsable URL or client setup,
    /// never on the network. Query parameters such as `?database=` are kept.
    pub fn new(config: &StoreConfig) -> crate::Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| ConfigError::invalid("STORE_URL", config.redacted_url(), e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Setup(e.into()))?;

        Ok(Self {
            client,
            url,
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }
}

impl Connector for ClickHouseConnector {
    type Store = ClickHouseStore;

    async fn connect(&self) -> Result<ClickHouseStore, StoreError> {
        let store = ClickHouseStore {
            client: self.client.clone(),
            url: self.url.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        };

        let rows = store.query("SELECT 1").await?;
        if rows != [Row(vec![1])] {
            return Err(StoreError::malformed("health check did not return 1"));
        }
        Ok(store)
    }
}

/// A health-checked ClickHouse endpoint
pub struct ClickHouseStore {
    client: reqwest::Client,
    url: Url,
    user: String,
    password: String,
}

impl ClickHouseStore {
    async fn post(&self, body: String) -> Result<reqwest::Response, StoreError> {
        debug!(statement = %body, "Sending statement to ClickHouse");

        let response = self
            .client
            .post(self.url.clone())
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(body)
            .send()
            .await?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let header_code = response
            .headers()
            .get(EXCEPTION_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Err(parse_exception(header_code, status.as_u16(), &body))
    }
}

impl Store for ClickHouseStore {
    fn dialect(&self) -> Dialect {
        Dialect::ClickHouse
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let response = self.post(format!("{} FORMAT TabSeparated", sql)).await?;
        let body = response.text().await?;
        parse_tab_separated(&body)
    }

    async fn exec(&self, sql: &str) -> Result<u64, StoreError> {
        let response = self.post(sql.to_string()).await?;
        let written = written_rows(response.headers());
        // Drain the body so the connection can be reused
        response.bytes().await?;
        Ok(written)
    }
}

/// Turn a ClickHouse error response into the structured store error.
///
/// Bodies look like `Code: 60. DB::Exception: ... (UNKNOWN_TABLE) (version ...)`,
/// optionally followed by `Stack trace:` and the frames.
fn parse_exception(header_code: Option<String>, status: u16, body: &str) -> StoreError {
    let (message, trace) = match body.split_once("Stack trace:") {
        Some((message, trace)) => (message, Some(trace.trim().to_string())),
        None => (body, None),
    };
    let message = message.trim();

    let body_code = message.strip_prefix("Code: ").and_then(|rest| {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        (!digits.is_empty()).then_some(digits)
    });

    let code = header_code
        .or(body_code)
        .unwrap_or_else(|| format!("HTTP {}", status));

    let message = message
        .strip_prefix("Code: ")
        .and_then(|rest| rest.split_once(". "))
        .map(|(_, msg)| msg)
        .unwrap_or(message)
        .to_string();

    StoreError::Server {
        code,
        message,
        trace: trace.filter(|t| !t.is_empty()),
    }
}

fn parse_tab_separated(body: &str) -> Result<Vec<Row>, StoreError> {
    body.lines()
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split('\t')
                .map(|cell| {
                    cell.parse::<u64>().map_err(|_| {
                        StoreError::malformed(format!("non-numeric column value {:?}", cell))
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Row)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Summary {
    written_rows: Option<String>,
}

fn written_rows(headers: &HeaderMap) -> u64 {
    headers
        .get(SUMMARY_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|raw| serde_json::from_str::<Summary>(raw).ok())
        .and_then(|summary| summary.written_rows)
        .and_then(|rows| rows.parse().ok())
        .unwrap_or(0)
}
